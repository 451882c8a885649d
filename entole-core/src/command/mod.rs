//! Command records and identity
//!
//! Commands live in a slot arena owned by the scheduler and are addressed
//! by stable [`CommandId`] handles. A handle stays valid as a diagnostic
//! identifier for the life of the scheduler; all parent/ownership links
//! between commands and subsystems are ids resolved through the owning
//! registries, never back-pointers.

pub mod status;

pub use status::Status;

use core::fmt::Write;

use heapless::{String, Vec};

use crate::group::GroupState;
use crate::subsystem::SubsystemId;
use crate::traits::Behavior;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum commands per scheduler
pub const MAX_COMMANDS: usize = 32;

/// Maximum required subsystems per command (groups union their members')
pub const MAX_REQUIREMENTS: usize = 8;

/// Maximum command display name length
pub const MAX_NAME_LEN: usize = 32;

/// Kind tag reported by command groups
pub const GROUP_KIND: &str = "CommandGroup";

/// Stable handle into the scheduler's command arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CommandId(u8);

impl CommandId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Arena slot index, for diagnostics
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Behavior payload of a command slot
pub(crate) enum CommandKind<B> {
    /// User-supplied lifecycle callbacks
    Leaf(B),
    /// Built-in sequential/parallel composition
    Group(GroupState),
}

/// One command slot
///
/// Execution state (status bits, start time) is reset on finalization so
/// a non-parented instance can be re-admitted from scratch.
pub struct Command<B> {
    pub(crate) kind: CommandKind<B>,
    pub(crate) name: Option<String<MAX_NAME_LEN>>,
    /// Per-scheduler creation sequence number, used for derived names
    pub(crate) seq: u16,
    pub(crate) parent: Option<CommandId>,
    pub(crate) status: Status,
    pub(crate) requires: Vec<SubsystemId, MAX_REQUIREMENTS>,
    pub(crate) started_at_ms: Option<u64>,
    pub(crate) timeout_ms: Option<u32>,
    pub(crate) interruptible: bool,
    pub(crate) run_when_disabled: bool,
}

impl<B: Behavior> Command<B> {
    pub(crate) fn new_leaf(behavior: B, seq: u16) -> Self {
        Self {
            kind: CommandKind::Leaf(behavior),
            name: None,
            seq,
            parent: None,
            status: Status::default(),
            requires: Vec::new(),
            started_at_ms: None,
            timeout_ms: None,
            interruptible: true,
            run_when_disabled: false,
        }
    }

    pub(crate) fn new_group(seq: u16) -> Self {
        Self {
            kind: CommandKind::Group(GroupState::new()),
            name: None,
            seq,
            parent: None,
            status: Status::default(),
            requires: Vec::new(),
            started_at_ms: None,
            timeout_ms: None,
            interruptible: true,
            run_when_disabled: false,
        }
    }

    /// Kind tag of this command's behavior
    pub fn kind_tag(&self) -> &'static str {
        match &self.kind {
            CommandKind::Leaf(b) => b.kind(),
            CommandKind::Group(_) => GROUP_KIND,
        }
    }

    /// Display name: the explicit name if set, else derived lazily from
    /// the kind tag and creation sequence number
    pub fn name(&self) -> String<MAX_NAME_LEN> {
        match &self.name {
            Some(name) => name.clone(),
            None => {
                let mut derived = String::new();
                let _ = write!(derived, "{}-{}", self.kind_tag(), self.seq);
                derived
            }
        }
    }

    /// Owning group, if any
    pub fn parent(&self) -> Option<CommandId> {
        self.parent
    }

    /// Current status flags
    pub fn status(&self) -> Status {
        self.status
    }

    /// Required subsystems, in insertion order
    pub fn requires(&self) -> &[SubsystemId] {
        &self.requires
    }

    /// Whether the scheduler may cancel this command to satisfy a
    /// conflicting resource claim (groups compose this over members)
    pub fn interruptible(&self) -> bool {
        self.interruptible
    }

    /// Whether this command keeps running while the robot is disabled
    pub fn run_when_disabled(&self) -> bool {
        self.run_when_disabled
    }

    /// First-initialize timestamp, `None` until first ticked
    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    /// Configured timeout (ms)
    pub fn timeout_ms(&self) -> Option<u32> {
        self.timeout_ms
    }

    /// Time since first initialize, `None` until first ticked
    pub fn elapsed_ms(&self, now_ms: u64) -> Option<u64> {
        self.started_at_ms
            .map(|started| now_ms.saturating_sub(started))
    }

    /// Check the timeout against the supplied clock
    ///
    /// False while no timeout is set or the command has not started.
    pub fn timed_out(&self, now_ms: u64) -> bool {
        match (self.timeout_ms, self.elapsed_ms(now_ms)) {
            (Some(timeout), Some(elapsed)) => elapsed >= timeout as u64,
            _ => false,
        }
    }

    /// Time left before the timeout elapses; `None` while no timeout is
    /// set or the command has not started
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        match (self.timeout_ms, self.elapsed_ms(now_ms)) {
            (Some(timeout), Some(elapsed)) => Some((timeout as u64).saturating_sub(elapsed)),
            _ => None,
        }
    }

    pub(crate) fn group(&self) -> Option<&GroupState> {
        match &self.kind {
            CommandKind::Group(g) => Some(g),
            CommandKind::Leaf(_) => None,
        }
    }

    pub(crate) fn group_mut(&mut self) -> Option<&mut GroupState> {
        match &mut self.kind {
            CommandKind::Group(g) => Some(g),
            CommandKind::Leaf(_) => None,
        }
    }
}
