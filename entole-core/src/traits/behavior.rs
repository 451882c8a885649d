//! Command behavior contract
//!
//! Every command kind supplies one implementation of [`Behavior`]. The
//! scheduler drives it through the lifecycle
//! `initialize -> execute* -> (end | interrupted)` and polls
//! [`is_finished`](Behavior::is_finished) after each execute.
//!
//! Callbacks must return promptly - the core is cooperative and provides
//! no blocking primitive. "Waiting" is a behavior whose `is_finished`
//! checks [`TickCtx`] elapsed time or an external condition while
//! `execute` does nothing.

/// Timing context passed to every behavior callback
///
/// Replaces any implicit "current command" state: a behavior learns when
/// it started and what its timeout is from here, never from a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickCtx {
    /// Current tick timestamp (ms, caller-supplied monotonic clock)
    pub now_ms: u64,
    /// Timestamp of the command's first initialize tick (ms)
    pub started_at_ms: u64,
    /// Configured timeout, if any (ms)
    pub timeout_ms: Option<u32>,
}

impl TickCtx {
    /// Time since the command was first initialized (ms)
    pub fn elapsed_ms(&self) -> u64 {
        self.now_ms.saturating_sub(self.started_at_ms)
    }

    /// Check whether the configured timeout has elapsed
    ///
    /// Always false while no timeout is set; true exactly at
    /// `elapsed == timeout` and beyond.
    pub fn timed_out(&self) -> bool {
        match self.timeout_ms {
            Some(t) => self.elapsed_ms() >= t as u64,
            None => false,
        }
    }
}

/// Per-kind command lifecycle callbacks
///
/// Implemented by the embedding application, typically as one enum over
/// all of the robot's command kinds. Command groups are provided by the
/// core itself and never pass through this trait.
pub trait Behavior {
    /// Kind tag, used for diagnostics and derived command names
    fn kind(&self) -> &'static str;

    /// Called once when the command first runs after admission
    fn initialize(&mut self, _ctx: &TickCtx) {}

    /// Called every tick while the command runs
    fn execute(&mut self, _ctx: &TickCtx) {}

    /// Polled after every execute; returning true ends the command
    /// through the `end` path
    fn is_finished(&mut self, ctx: &TickCtx) -> bool;

    /// Called once when the command finishes normally
    fn end(&mut self, _ctx: &TickCtx) {}

    /// Called once when the command is cancelled or times out
    ///
    /// Defaults to the `end` handling, which is what most kinds want.
    fn interrupted(&mut self, ctx: &TickCtx) {
        self.end(ctx);
    }
}
