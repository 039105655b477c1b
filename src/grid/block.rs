use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Flat index of a block in the grid's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockIndex(pub usize);

/// Scheduling state for one BLOCK_SIZE x BLOCK_SIZE tile.
///
/// All fields are relaxed atomics. The dispatch barrier publishes them:
/// workers write only the report fields of blocks they claimed, and the
/// coordinator reads reports and rewrites `active`/`change` strictly
/// between dispatch cycles, so the atomics only need to provide tear-free
/// access, not ordering.
#[derive(Debug)]
pub struct BlockState {
    active: AtomicBool,
    /// Exponentially tracked change metric carried across frames (f32 bits)
    change: AtomicU32,
    /// Change metric reported by this frame's update (f32 bits)
    frame_change: AtomicU32,
    /// Set by an update that saw a disturbance the block must stay awake for
    wake: AtomicBool,
}

impl BlockState {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            change: AtomicU32::new(0f32.to_bits()),
            frame_change: AtomicU32::new(0f32.to_bits()),
            wake: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn change(&self) -> f32 {
        f32::from_bits(self.change.load(Ordering::Relaxed))
    }

    pub fn set_change(&self, value: f32) {
        self.change.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn frame_change(&self) -> f32 {
        f32::from_bits(self.frame_change.load(Ordering::Relaxed))
    }

    pub fn set_frame_change(&self, value: f32) {
        self.frame_change.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn request_wake(&self) {
        self.wake.store(true, Ordering::Relaxed);
    }

    /// Reads and clears the wake flag. Called by the coordinator once per
    /// block per frame, so stale wakes never leak into the next cycle.
    pub fn take_wake(&self) -> bool {
        self.wake.swap(false, Ordering::Relaxed)
    }
}

impl Default for BlockState {
    fn default() -> Self {
        Self::new()
    }
}
