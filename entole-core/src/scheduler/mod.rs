//! Tick-driven command arbitration
//!
//! The scheduler owns the command arena, the subsystem registry, and the
//! button board, and drives everything from [`Scheduler::run`], called
//! once per control-loop iteration. Admission control, conflict
//! preemption, and group execution live in [`tick`]; this module holds
//! the state and the registration/configuration surface.
//!
//! # Per-tick ordering
//!
//! Button bindings fire first, then running commands are re-evaluated,
//! then pending requests are admitted, then idle subsystems fall back to
//! their default command. A command requested this tick therefore does
//! not execute until the next tick; a default command can be admitted the
//! same tick its subsystem becomes idle.

pub mod tick;

use heapless::{String, Vec};

use crate::button::{Activation, ButtonBoard, ButtonId};
use crate::command::{
    Command, CommandId, CommandKind, Status, MAX_COMMANDS, MAX_NAME_LEN, MAX_REQUIREMENTS,
};
use crate::error::{Error, ErrorKind, Result};
use crate::group::{EntryKind, GroupEntry, MAX_GROUP_ENTRIES};
use crate::subsystem::{Subsystem, SubsystemId, SubsystemRegistry};
use crate::traits::{Behavior, Input};

/// The tick-driven arbitrator
///
/// Generic over the application's command behavior type `B` (typically
/// one enum covering every command kind) and its button input type `I`.
pub struct Scheduler<B: Behavior, I: Input = ()> {
    pub(crate) commands: Vec<Command<B>, MAX_COMMANDS>,
    pub(crate) subsystems: SubsystemRegistry,
    pub(crate) board: ButtonBoard<I>,
    /// Admitted commands, in admission order
    pub(crate) running: Vec<CommandId, MAX_COMMANDS>,
    /// Start requests awaiting admission
    pub(crate) pending: Vec<CommandId, MAX_COMMANDS>,
    next_seq: u16,
}

impl<B: Behavior, I: Input> Scheduler<B, I> {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            subsystems: SubsystemRegistry::new(),
            board: ButtonBoard::new(),
            running: Vec::new(),
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    // --- bring-up registration ---

    /// Register a subsystem; bring-up happens before any command runs
    pub fn add_subsystem(&mut self, name: &'static str) -> Result<SubsystemId> {
        self.subsystems.add(name)
    }

    /// Allocate a command from a behavior
    pub fn create(&mut self, behavior: B) -> Result<CommandId> {
        let seq = self.next_seq;
        let id = CommandId::new(self.commands.len());
        self.commands
            .push(Command::new_leaf(behavior, seq))
            .map_err(|_| Error::new(ErrorKind::Capacity, "create"))?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(id)
    }

    /// Allocate an empty command group
    pub fn create_group(&mut self) -> Result<CommandId> {
        let seq = self.next_seq;
        let id = CommandId::new(self.commands.len());
        self.commands
            .push(Command::new_group(seq))
            .map_err(|_| Error::new(ErrorKind::Capacity, "create_group"))?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(id)
    }

    /// Register a button input
    pub fn add_button(&mut self, input: I) -> Result<ButtonId> {
        self.board.add_button(input)
    }

    // --- command configuration (forbidden once locked) ---

    /// Declare exclusive use of a subsystem; idempotent
    pub fn require(&mut self, id: CommandId, sys: SubsystemId) -> Result<()> {
        let slot = self
            .subsystems
            .get(sys)
            .ok_or(Error::new(ErrorKind::InvalidArgument, "require"))?;
        if !slot.is_initialized() {
            return Err(Error::with_msg(
                ErrorKind::InvalidOperation,
                "require",
                "subsystem is not initialized",
            ));
        }
        let cmd = self.configurable(id, "require")?;
        if cmd.requires.contains(&sys) {
            return Ok(());
        }
        cmd.requires
            .push(sys)
            .map_err(|_| Error::new(ErrorKind::Capacity, "require"))
    }

    /// Set or clear the command timeout (ms)
    pub fn set_timeout(&mut self, id: CommandId, timeout_ms: Option<u32>) -> Result<()> {
        self.configurable(id, "set_timeout")?.timeout_ms = timeout_ms;
        Ok(())
    }

    /// Allow or forbid preemption by a conflicting resource claim
    pub fn set_interruptible(&mut self, id: CommandId, interruptible: bool) -> Result<()> {
        self.configurable(id, "set_interruptible")?.interruptible = interruptible;
        Ok(())
    }

    /// Keep the command running while the robot is disabled
    pub fn set_run_when_disabled(&mut self, id: CommandId, run: bool) -> Result<()> {
        self.configurable(id, "set_run_when_disabled")?.run_when_disabled = run;
        Ok(())
    }

    /// Set an explicit display name (truncated to fit)
    pub fn set_name(&mut self, id: CommandId, name: &str) -> Result<()> {
        let cmd = self
            .commands
            .get_mut(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "set_name"))?;
        let mut stored: String<MAX_NAME_LEN> = String::new();
        for ch in name.chars() {
            if stored.push(ch).is_err() {
                break;
            }
        }
        cmd.name = Some(stored);
        Ok(())
    }

    // --- group composition (forbidden once the group is locked) ---

    /// Append a sequential entry to a group
    pub fn add_sequential(
        &mut self,
        group: CommandId,
        child: CommandId,
        timeout_ms: Option<u32>,
    ) -> Result<()> {
        self.add_entry(group, child, EntryKind::InSequence, timeout_ms, "add_sequential")
    }

    /// Append a branch entry: it starts when the cursor reaches it but
    /// runs concurrently and never blocks the sequence
    pub fn add_parallel(
        &mut self,
        group: CommandId,
        child: CommandId,
        timeout_ms: Option<u32>,
    ) -> Result<()> {
        self.add_entry(group, child, EntryKind::BranchChild, timeout_ms, "add_parallel")
    }

    fn add_entry(
        &mut self,
        group_id: CommandId,
        child_id: CommandId,
        kind: EntryKind,
        timeout_ms: Option<u32>,
        op: &'static str,
    ) -> Result<()> {
        if group_id == child_id {
            return Err(Error::with_msg(
                ErrorKind::InvalidArgument,
                op,
                "a group cannot contain itself",
            ));
        }
        {
            let group_cmd = self
                .commands
                .get(group_id.index())
                .ok_or(Error::new(ErrorKind::InvalidArgument, op))?;
            if group_cmd.group().is_none() {
                return Err(Error::with_msg(
                    ErrorKind::TypeMismatch,
                    op,
                    "not a command group",
                ));
            }
            if group_cmd.status.is_locked() {
                return Err(Error::with_msg(
                    ErrorKind::InvalidOperation,
                    op,
                    "group is locked",
                ));
            }
        }
        let child_requires: Vec<SubsystemId, MAX_REQUIREMENTS> = {
            let child = self
                .commands
                .get(child_id.index())
                .ok_or(Error::new(ErrorKind::InvalidArgument, op))?;
            if child.parent.is_some() {
                return Err(Error::with_msg(
                    ErrorKind::InvalidOperation,
                    op,
                    "command already has a parent",
                ));
            }
            if child.status.is_running() {
                return Err(Error::with_msg(
                    ErrorKind::InvalidOperation,
                    op,
                    "command is running",
                ));
            }
            child.requires.clone()
        };

        // A group's resource footprint is the union of its members'.
        // Check capacity up front so a failed add leaves no partial state.
        {
            let group_cmd = self
                .commands
                .get_mut(group_id.index())
                .ok_or(Error::new(ErrorKind::InvalidArgument, op))?;
            let missing = child_requires
                .iter()
                .filter(|&sys| !group_cmd.requires.contains(sys))
                .count();
            if group_cmd.requires.len() + missing > MAX_REQUIREMENTS {
                return Err(Error::new(ErrorKind::Capacity, op));
            }
            let entries_full = match group_cmd.group() {
                Some(g) => g.entries.len() >= MAX_GROUP_ENTRIES,
                None => true,
            };
            if entries_full {
                return Err(Error::new(ErrorKind::Capacity, op));
            }
            for sys in &child_requires {
                if !group_cmd.requires.contains(sys) {
                    let _ = group_cmd.requires.push(*sys);
                }
            }
            if let Some(group) = group_cmd.group_mut() {
                let _ = group.entries.push(GroupEntry {
                    command: child_id,
                    kind,
                    timeout_ms,
                    started: false,
                });
            }
        }

        if let Some(child) = self.commands.get_mut(child_id.index()) {
            child.parent = Some(group_id);
            child.status.insert(Status::LOCKED);
        }
        Ok(())
    }

    // --- subsystem configuration ---

    /// Set or clear a subsystem's fallback command
    ///
    /// The candidate must already declare the subsystem in its
    /// requirement set and must not be owned by a group.
    pub fn set_default_command(
        &mut self,
        sys: SubsystemId,
        command: Option<CommandId>,
    ) -> Result<()> {
        self.subsystems
            .get(sys)
            .ok_or(Error::new(ErrorKind::InvalidArgument, "set_default_command"))?;
        if let Some(id) = command {
            let cmd = self
                .commands
                .get(id.index())
                .ok_or(Error::new(ErrorKind::InvalidArgument, "set_default_command"))?;
            if cmd.parent.is_some() {
                return Err(Error::with_msg(
                    ErrorKind::InvalidOperation,
                    "set_default_command",
                    "command is owned by a group",
                ));
            }
            if !cmd.requires.contains(&sys) {
                return Err(Error::with_msg(
                    ErrorKind::InvalidArgument,
                    "set_default_command",
                    "command does not require this subsystem",
                ));
            }
        }
        if let Some(slot) = self.subsystems.get_mut(sys) {
            slot.default = command;
        }
        Ok(())
    }

    // --- button bindings ---

    /// Bind a button to a command under an activation policy
    pub fn bind(
        &mut self,
        button: ButtonId,
        activation: Activation,
        command: CommandId,
    ) -> Result<()> {
        let cmd = self
            .commands
            .get(command.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "bind"))?;
        if cmd.parent.is_some() {
            return Err(Error::with_msg(
                ErrorKind::InvalidOperation,
                "bind",
                "command is owned by a group",
            ));
        }
        self.board.bind(button, activation, command)
    }

    /// Assign a button to a toggle group; re-assignment moves it
    pub fn set_toggle_group(&mut self, button: ButtonId, group: u8) -> Result<()> {
        self.board.set_toggle_group(button, group)
    }

    /// Minimum spacing between accepted toggle edges (ms)
    pub fn set_debounce(&mut self, button: ButtonId, debounce_ms: u32) -> Result<()> {
        self.board.set_debounce(button, debounce_ms)
    }

    /// Current toggle latch of a button
    pub fn toggle_state(&self, button: ButtonId) -> Result<bool> {
        self.board.toggle_state(button)
    }

    // --- start/cancel requests ---

    /// Request admission of a command on the next tick
    ///
    /// Locks the command. Duplicate requests before the next tick
    /// collapse into one admission. Fails on a group-owned command: only
    /// the owning group may drive it.
    pub fn start(&mut self, id: CommandId) -> Result<()> {
        let cmd = self
            .commands
            .get_mut(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "start"))?;
        if cmd.parent.is_some() {
            return Err(Error::with_msg(
                ErrorKind::InvalidOperation,
                "start",
                "command is owned by a group",
            ));
        }
        cmd.status.insert(Status::LOCKED);
        if self.pending.contains(&id) {
            return Ok(());
        }
        self.pending
            .push(id)
            .map_err(|_| Error::new(ErrorKind::Capacity, "start"))
    }

    /// Mark a running command for the interrupted finalization path
    ///
    /// No-op when the command is not running. Fails on a group-owned
    /// command.
    pub fn cancel(&mut self, id: CommandId) -> Result<()> {
        let cmd = self
            .commands
            .get_mut(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "cancel"))?;
        if cmd.parent.is_some() {
            return Err(Error::with_msg(
                ErrorKind::InvalidOperation,
                "cancel",
                "command is owned by a group",
            ));
        }
        if cmd.status.is_running() {
            cmd.status.insert(Status::CANCELLED);
        }
        Ok(())
    }

    // --- read-only queries ---

    /// Read a command record
    pub fn command(&self, id: CommandId) -> Option<&Command<B>> {
        self.commands.get(id.index())
    }

    /// Read a subsystem record
    pub fn subsystem(&self, id: SubsystemId) -> Option<&Subsystem> {
        self.subsystems.get(id)
    }

    /// Admitted commands, in admission order
    pub fn running_commands(&self) -> &[CommandId] {
        &self.running
    }

    /// Kind-specific behavior access; groups have none
    pub fn behavior(&self, id: CommandId) -> Result<&B> {
        let cmd = self
            .commands
            .get(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "behavior"))?;
        match &cmd.kind {
            CommandKind::Leaf(behavior) => Ok(behavior),
            CommandKind::Group(_) => Err(Error::with_msg(
                ErrorKind::TypeMismatch,
                "behavior",
                "command is a group",
            )),
        }
    }

    /// Mutable kind-specific behavior access; groups have none
    pub fn behavior_mut(&mut self, id: CommandId) -> Result<&mut B> {
        let cmd = self
            .commands
            .get_mut(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "behavior_mut"))?;
        match &mut cmd.kind {
            CommandKind::Leaf(behavior) => Ok(behavior),
            CommandKind::Group(_) => Err(Error::with_msg(
                ErrorKind::TypeMismatch,
                "behavior_mut",
                "command is a group",
            )),
        }
    }

    /// Composed interruptibility: a group is interruptible only if its
    /// own flag, its active cursor child, and all concurrent children are
    pub fn is_interruptible(&self, id: CommandId) -> Result<bool> {
        self.commands
            .get(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "is_interruptible"))?;
        Ok(self.interruptible_of(id))
    }

    /// Command at a group's sequential cursor (visualization only)
    pub fn group_cursor_command(&self, id: CommandId) -> Result<Option<CommandId>> {
        let cmd = self
            .commands
            .get(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "group_cursor_command"))?;
        let group = cmd.group().ok_or(Error::with_msg(
            ErrorKind::TypeMismatch,
            "group_cursor_command",
            "not a command group",
        ))?;
        Ok(group.cursor_command())
    }

    /// Concurrent children of a group (visualization only)
    pub fn group_children(
        &self,
        id: CommandId,
    ) -> Result<Vec<CommandId, MAX_GROUP_ENTRIES>> {
        let cmd = self
            .commands
            .get(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "group_children"))?;
        let group = cmd.group().ok_or(Error::with_msg(
            ErrorKind::TypeMismatch,
            "group_children",
            "not a command group",
        ))?;
        Ok(group.child_commands())
    }

    // --- internals shared with tick ---

    fn configurable(&mut self, id: CommandId, op: &'static str) -> Result<&mut Command<B>> {
        let cmd = self
            .commands
            .get_mut(id.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, op))?;
        if cmd.status.is_locked() {
            return Err(Error::with_msg(
                ErrorKind::InvalidOperation,
                op,
                "command is locked",
            ));
        }
        Ok(cmd)
    }
}

impl<B: Behavior, I: Input> Default for Scheduler<B, I> {
    fn default() -> Self {
        Self::new()
    }
}
