//! Read-only snapshots for dashboards and telemetry
//!
//! Observers (status display, diagnostics console) read scheduler state
//! through these flattened reports; they carry no references back into
//! the scheduler and cannot mutate it. With the `serde` feature on they
//! serialize for off-board telemetry.

use heapless::String;

use crate::command::{CommandId, MAX_NAME_LEN};
use crate::error::{Error, ErrorKind, Result};
use crate::scheduler::Scheduler;
use crate::subsystem::SubsystemId;
use crate::traits::{Behavior, Input};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Snapshot of one command slot
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CommandReport {
    pub id: CommandId,
    pub name: String<MAX_NAME_LEN>,
    pub kind: &'static str,
    pub parent: Option<CommandId>,
    pub running: bool,
    pub cancelled: bool,
    pub locked: bool,
    pub initialized: bool,
    pub interruptible: bool,
    pub run_when_disabled: bool,
    pub started_at_ms: Option<u64>,
    pub timeout_ms: Option<u32>,
}

/// Snapshot of one subsystem slot
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SubsystemReport {
    pub id: SubsystemId,
    pub name: &'static str,
    pub initialized: bool,
    pub current: Option<CommandId>,
    pub default: Option<CommandId>,
}

impl<B: Behavior, I: Input> Scheduler<B, I> {
    /// Snapshot a command for display
    pub fn command_report(&self, id: CommandId) -> Result<CommandReport> {
        let cmd = self
            .command(id)
            .ok_or(Error::new(ErrorKind::InvalidArgument, "command_report"))?;
        let status = cmd.status();
        Ok(CommandReport {
            id,
            name: cmd.name(),
            kind: cmd.kind_tag(),
            parent: cmd.parent(),
            running: status.is_running(),
            cancelled: status.is_cancelled(),
            locked: status.is_locked(),
            initialized: status.is_initialized(),
            interruptible: cmd.interruptible(),
            run_when_disabled: cmd.run_when_disabled(),
            started_at_ms: cmd.started_at_ms(),
            timeout_ms: cmd.timeout_ms(),
        })
    }

    /// Snapshot a subsystem for display
    pub fn subsystem_report(&self, id: SubsystemId) -> Result<SubsystemReport> {
        let sys = self
            .subsystem(id)
            .ok_or(Error::new(ErrorKind::InvalidArgument, "subsystem_report"))?;
        Ok(SubsystemReport {
            id,
            name: sys.name(),
            initialized: sys.is_initialized(),
            current: sys.current_command(),
            default: sys.default_command(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TickCtx;

    struct Noop;

    impl Behavior for Noop {
        fn kind(&self) -> &'static str {
            "Noop"
        }

        fn is_finished(&mut self, _ctx: &TickCtx) -> bool {
            true
        }
    }

    #[test]
    fn test_command_report() {
        let mut sched: Scheduler<Noop> = Scheduler::new();
        let drive = sched.add_subsystem("drive").unwrap();
        let cmd = sched.create(Noop).unwrap();
        sched.require(cmd, drive).unwrap();
        sched.set_timeout(cmd, Some(250)).unwrap();

        let report = sched.command_report(cmd).unwrap();
        assert_eq!(report.kind, "Noop");
        assert_eq!(report.name.as_str(), "Noop-0");
        assert!(!report.running);
        assert!(!report.locked);
        assert_eq!(report.timeout_ms, Some(250));
    }

    #[test]
    fn test_subsystem_report() {
        let mut sched: Scheduler<Noop> = Scheduler::new();
        let drive = sched.add_subsystem("drive").unwrap();

        let report = sched.subsystem_report(drive).unwrap();
        assert_eq!(report.name, "drive");
        assert!(report.initialized);
        assert_eq!(report.current, None);
        assert_eq!(report.default, None);
    }

    #[test]
    fn test_report_unknown_handle() {
        let sched: Scheduler<Noop> = Scheduler::new();
        let err = sched.command_report(CommandId::new(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
