use image::RgbaImage;

use crate::canvas::Surface;

/// Default number of undo steps kept after the base entry.
pub const DEFAULT_MAX_STEPS: usize = 50;
/// Default memory cap across both stacks.
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 100 * 1024 * 1024;

// ============================================================================
// SNAPSHOT: immutable full-buffer copy
// ============================================================================

/// A full copy of the surface's pixel buffer, taken after a completed
/// mutation. Restoring it reproduces the buffer byte-for-byte.
#[derive(Clone)]
pub struct Snapshot {
    pixels: RgbaImage,
}

impl Snapshot {
    pub fn capture(surface: &Surface) -> Self {
        Self { pixels: surface.pixels().clone() }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    fn restore_into(&self, surface: &mut Surface) {
        surface.restore(&self.pixels);
    }
}

// ============================================================================
// HISTORY MANAGER: linear undo/redo over full snapshots
// ============================================================================

/// Linear undo/redo history.
///
/// `entries[0]` is always the untouched base image once seeded; the top of
/// `entries` mirrors the current buffer. Any new checkpoint invalidates the
/// redo stack.
pub struct HistoryManager {
    entries: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    /// Maximum entries kept above the base.
    max_steps: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl HistoryManager {
    pub fn new(max_steps: usize) -> Self {
        Self {
            entries: Vec::new(),
            redo_stack: Vec::new(),
            max_steps: max_steps.max(1),
            max_memory_bytes: Some(DEFAULT_MAX_MEMORY_BYTES),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_memory_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    /// Reset to a single base entry taken from `surface`.
    pub fn seed(&mut self, surface: &Surface) {
        self.clear();
        let base = Snapshot::capture(surface);
        self.total_memory = base.memory_size();
        self.entries.push(base);
    }

    /// Record the current buffer as a new entry and drop forward history.
    /// Ignored until the history has been seeded.
    pub fn checkpoint(&mut self, surface: &Surface) {
        if self.entries.is_empty() {
            return;
        }
        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }
        let snap = Snapshot::capture(surface);
        self.total_memory += snap.memory_size();
        self.entries.push(snap);
        self.prune();
    }

    /// Step back one entry. No-op when only the base remains.
    pub fn undo(&mut self, surface: &mut Surface) -> bool {
        if !self.can_undo() {
            return false;
        }
        let Some(top) = self.entries.pop() else { return false };
        self.redo_stack.push(top);
        if let Some(previous) = self.entries.last() {
            previous.restore_into(surface);
        }
        true
    }

    /// Re-apply the most recently undone entry. No-op when nothing was undone.
    pub fn redo(&mut self, surface: &mut Surface) -> bool {
        let Some(next) = self.redo_stack.pop() else { return false };
        next.restore_into(surface);
        self.entries.push(next);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.entries.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// The untouched base snapshot, if seeded.
    pub fn base(&self) -> Option<&Snapshot> {
        self.entries.first()
    }

    /// Snapshot matching the current buffer, if seeded.
    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.last()
    }

    /// Get the current memory usage of the history (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Number of entries including the base.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Drop the oldest non-base entries until both limits hold. The base
    /// entry and the current top are never dropped.
    fn prune(&mut self) {
        while self.entries.len() > self.max_steps + 1 {
            self.drop_oldest_step();
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.entries.len() > 2 {
                self.drop_oldest_step();
            }
        }
    }

    fn drop_oldest_step(&mut self) {
        let removed = self.entries.remove(1);
        self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
        crate::log_info!("History: pruned oldest step ({} entries left)", self.entries.len());
    }
}
