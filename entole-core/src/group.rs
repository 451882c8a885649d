//! Command group composition records
//!
//! A group owns an ordered workflow of child commands. `InSequence`
//! entries advance a cursor one at a time; `BranchChild` entries detach
//! into a concurrent children set the moment the cursor reaches them and
//! run alongside the sequence. The execution algorithm lives in the
//! scheduler, which owns the command arena; this module holds the state
//! it drives.

use heapless::Vec;

use crate::command::CommandId;

/// Maximum workflow entries per group
pub const MAX_GROUP_ENTRIES: usize = 16;

/// How an entry participates in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryKind {
    /// Blocks the cursor until its command finishes
    InSequence,
    /// Detaches into the concurrent children set; never blocks the cursor
    BranchChild,
}

/// One workflow entry
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupEntry {
    /// Child command (parented to the group)
    pub command: CommandId,
    /// Sequential or branch participation
    pub kind: EntryKind,
    /// Per-entry timeout; elapsing force-cancels the child (ms)
    pub timeout_ms: Option<u32>,
    /// Set on the cursor's first encounter of this entry
    pub(crate) started: bool,
}

/// Execution state of a command group
///
/// `done` implies the cursor is exhausted; the group as a whole is
/// finished only once the children set drains too.
pub struct GroupState {
    pub(crate) entries: Vec<GroupEntry, MAX_GROUP_ENTRIES>,
    /// Index of the active sequential entry; `None` before first
    /// activation and after exhaustion
    pub(crate) cursor: Option<u8>,
    /// Cursor ran off the end of the entry list
    pub(crate) done: bool,
    /// Entry indices currently running concurrently
    pub(crate) children: Vec<u8, MAX_GROUP_ENTRIES>,
}

impl GroupState {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            done: false,
            children: Vec::new(),
        }
    }

    /// Finished means the sequential cursor is exhausted and no
    /// concurrent children remain
    pub fn is_finished(&self) -> bool {
        self.done && self.children.is_empty()
    }

    /// Command at the sequential cursor, if the cursor points at a live
    /// entry
    pub fn cursor_command(&self) -> Option<CommandId> {
        let index = self.cursor? as usize;
        self.entries.get(index).map(|entry| entry.command)
    }

    /// Commands in the concurrent children set
    pub fn child_commands(&self) -> Vec<CommandId, MAX_GROUP_ENTRIES> {
        let mut commands = Vec::new();
        for &index in &self.children {
            if let Some(entry) = self.entries.get(index as usize) {
                // Capacity matches the entry list, push cannot fail
                let _ = commands.push(entry.command);
            }
        }
        commands
    }

    /// Reset execution state so the group can run again from the top;
    /// the composed entries are kept
    pub(crate) fn reset_execution(&mut self) {
        self.cursor = None;
        self.done = false;
        self.children.clear();
        for entry in &mut self.entries {
            entry.started = false;
        }
    }
}
