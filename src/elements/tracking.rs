//! Tracking of pending changes to buffers awaiting upload.

/// How a buffer has changed since it was last uploaded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferChange {
    /// The buffer matches what was last uploaded.
    None,
    /// Some values changed, but the size and layout did not.
    Contents,
    /// The buffer was recreated with a different size, so it must be
    /// reallocated rather than updated in place.
    Layout,
}

/// Tracker for whether a buffer is dirty and in what way.
#[derive(Copy, Clone, Debug)]
pub struct BufferChangeTracker {
    change: BufferChange,
}

impl BufferChangeTracker {
    /// Creates a tracker with no registered change.
    pub fn new() -> Self {
        Self {
            change: BufferChange::None,
        }
    }

    pub fn change(&self) -> BufferChange {
        self.change
    }

    /// Whether any change is pending upload.
    pub fn is_dirty(&self) -> bool {
        self.change != BufferChange::None
    }

    /// Registers that values in the buffer changed. Repeated notifications
    /// are equivalent to one, and a pending layout change is kept since it
    /// already implies new contents.
    pub fn notify_content_change(&mut self) {
        if self.change != BufferChange::Layout {
            self.change = BufferChange::Contents;
        }
    }

    /// Registers that the buffer was recreated with a new layout.
    pub fn notify_layout_change(&mut self) {
        self.change = BufferChange::Layout;
    }

    /// Returns the pending change and resets the tracker.
    pub fn take_change(&mut self) -> BufferChange {
        std::mem::replace(&mut self.change, BufferChange::None)
    }

    /// Forgets any pending change.
    pub fn reset(&mut self) {
        self.change = BufferChange::None;
    }
}

impl Default for BufferChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
