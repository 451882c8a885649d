//! External interface seams
//!
//! The scheduler core never touches hardware or reads a clock. Everything
//! it consumes from the outside world crosses one of these seams:
//!
//! - [`Behavior`]: the per-kind command lifecycle callbacks
//! - [`Input`]: a boolean signal source backing a button
//!
//! Time and the robot enable flag are pushed in as arguments to
//! [`Scheduler::run`](crate::scheduler::Scheduler::run) each tick.

pub mod behavior;
pub mod input;

pub use behavior::{Behavior, TickCtx};
pub use input::Input;
