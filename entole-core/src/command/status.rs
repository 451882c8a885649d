//! Command status bitset

use bitflags::bitflags;

bitflags! {
    /// Lifecycle status flags of a command
    ///
    /// RUNNING/CANCELLED/INITIALIZED are execution state and are cleared
    /// on finalization. LOCKED is set the moment a command is handed to
    /// the scheduler or added to a group, and never cleared - it freezes
    /// the command's configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Admitted and being ticked (or owned-and-active inside a group)
        const RUNNING = 0b0000_0001;
        /// Marked for the interrupted finalization path
        const CANCELLED = 0b0000_0010;
        /// Configuration frozen
        const LOCKED = 0b0000_0100;
        /// Initialize callback has run; start time is valid
        const INITIALIZED = 0b0000_1000;
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::empty()
    }
}

impl Status {
    /// Check the RUNNING flag
    pub fn is_running(&self) -> bool {
        self.contains(Status::RUNNING)
    }

    /// Check the CANCELLED flag
    pub fn is_cancelled(&self) -> bool {
        self.contains(Status::CANCELLED)
    }

    /// Check the LOCKED flag
    pub fn is_locked(&self) -> bool {
        self.contains(Status::LOCKED)
    }

    /// Check the INITIALIZED flag
    pub fn is_initialized(&self) -> bool {
        self.contains(Status::INITIALIZED)
    }

    /// Clear the execution-state flags, keeping LOCKED
    pub(crate) fn clear_execution(&mut self) {
        self.remove(Status::RUNNING | Status::CANCELLED | Status::INITIALIZED);
    }
}
