//! Per-tick execution: button evaluation, command re-evaluation,
//! admission, and group workflows
//!
//! Subsystem ownership is acquired and released only here. Cancellation
//! is cooperative: marking a command cancelled never stops an execute
//! mid-call, it routes the next evaluation into the interrupted
//! finalization path.

use heapless::Vec;

use crate::button::Action;
use crate::command::{CommandId, CommandKind, Status, MAX_COMMANDS, MAX_REQUIREMENTS};
use crate::error::Result;
use crate::group::{EntryKind, GroupEntry, GroupState};
use crate::subsystem::SubsystemId;
use crate::traits::{Behavior, Input, TickCtx};

use super::Scheduler;

/// Ordered removal; tick order of the remaining elements is preserved
fn remove_at<T, const N: usize>(vec: &mut Vec<T, N>, position: usize) {
    let len = vec.len();
    if position >= len {
        return;
    }
    let slice: &mut [T] = vec;
    slice[position..].rotate_left(1);
    vec.truncate(len - 1);
}

impl<B: Behavior, I: Input> Scheduler<B, I> {
    /// Advance the scheduler by one tick
    ///
    /// `now_ms` is the caller's monotonic millisecond clock; `enabled` is
    /// the robot enable gate, polled for every top-level command that is
    /// not marked run-when-disabled.
    ///
    /// An `Err` aborts the remainder of this iteration with the captured
    /// diagnostic; the control loop is expected to resume on its next
    /// tick.
    pub fn run(&mut self, now_ms: u64, enabled: bool) -> Result<()> {
        // 1. Buttons: one sample per button, bindings evaluated in
        // reverse registration order so overlay bindings act first
        self.board.sample_all(now_ms);
        for index in (0..self.board.bindings_len()).rev() {
            match self.board.evaluate(index) {
                Some(Action::Start(cmd)) => self.start(cmd)?,
                Some(Action::Cancel(cmd)) => self.cancel(cmd)?,
                None => {}
            }
        }

        // 2. Re-evaluate the running set
        let running_snapshot = self.running.clone();
        for id in running_snapshot {
            let still_running = self.tick_command(id, now_ms, enabled, true);
            if !still_running {
                self.finalize_command(id, now_ms);
                self.subsystems.release_owner(id);
                self.remove_running(id);
            }
        }

        // 3. Admit pending requests
        let pending_snapshot = self.pending.clone();
        self.pending.clear();
        for id in pending_snapshot {
            self.admit(id, now_ms);
        }

        // 4. Idle subsystems fall back to their default command. Runs
        // after admission so a subsystem freed this tick is refilled
        // this tick.
        for index in 0..self.subsystems.len() {
            let sys = SubsystemId::new(index);
            let (current, default) = match self.subsystems.get(sys) {
                Some(slot) => (slot.current, slot.default),
                None => continue,
            };
            if current.is_none() {
                if let Some(default) = default {
                    self.admit(default, now_ms);
                }
            }
        }

        Ok(())
    }

    /// Cancel and finalize everything, releasing all subsystem claims
    ///
    /// Leaves the scheduler in the safe idle state the embedding
    /// application wants after an unrecoverable diagnostic.
    pub fn reset(&mut self, now_ms: u64) {
        let running_snapshot = self.running.clone();
        for id in running_snapshot {
            if let Some(cmd) = self.commands.get_mut(id.index()) {
                cmd.status.insert(Status::CANCELLED);
            }
            self.finalize_command(id, now_ms);
            self.subsystems.release_owner(id);
        }
        self.running.clear();
        self.pending.clear();
    }

    // --- admission ---

    /// Admit one command: resolve subsystem conflicts by cancellation,
    /// claim the requirement set, and mark it running
    fn admit(&mut self, id: CommandId, now_ms: u64) {
        let requires: Vec<SubsystemId, MAX_REQUIREMENTS> =
            match self.commands.get(id.index()) {
                Some(cmd) => {
                    if cmd.status.is_running() {
                        // Duplicate request; expected, not an error
                        #[cfg(feature = "defmt")]
                        defmt::debug!(
                            "admit: command {} already running, request dropped",
                            id.index()
                        );
                        return;
                    }
                    cmd.requires.clone()
                }
                None => return,
            };

        // A single non-interruptible occupant blocks the whole request
        for &sys in &requires {
            if let Some(occupant) = self.subsystems.get(sys).and_then(|s| s.current_command()) {
                if occupant != id && !self.interruptible_of(occupant) {
                    #[cfg(feature = "defmt")]
                    defmt::debug!(
                        "admit: command {} blocked by non-interruptible occupant {}",
                        id.index(),
                        occupant.index()
                    );
                    return;
                }
            }
        }

        // Preempt conflicting occupants through the interrupted path
        for &sys in &requires {
            let occupant = self.subsystems.get(sys).and_then(|s| s.current_command());
            if let Some(occupant) = occupant {
                if occupant != id {
                    if let Some(cmd) = self.commands.get_mut(occupant.index()) {
                        cmd.status.insert(Status::CANCELLED);
                    }
                    self.finalize_command(occupant, now_ms);
                    self.subsystems.release_owner(occupant);
                    self.remove_running(occupant);
                }
            }
        }

        for &sys in &requires {
            if let Some(slot) = self.subsystems.get_mut(sys) {
                slot.current = Some(id);
            }
        }
        if let Some(cmd) = self.commands.get_mut(id.index()) {
            cmd.status.insert(Status::RUNNING | Status::LOCKED);
        }
        if !self.running.contains(&id) {
            let _ = self.running.push(id);
        }
    }

    // --- command evaluation ---

    /// Evaluate one command for this tick; returns whether it is still
    /// running
    fn tick_command(
        &mut self,
        id: CommandId,
        now_ms: u64,
        enabled: bool,
        top_level: bool,
    ) -> bool {
        {
            let cmd = match self.commands.get_mut(id.index()) {
                Some(cmd) => cmd,
                None => return false,
            };
            if top_level && !enabled && !cmd.run_when_disabled {
                cmd.status.insert(Status::CANCELLED);
            }
            if cmd.status.is_cancelled() {
                return false;
            }
            if cmd.timed_out(now_ms) {
                // Normal termination, routed through interrupted
                cmd.status.insert(Status::CANCELLED);
                return false;
            }
            let first_tick = !cmd.status.is_initialized();
            if first_tick {
                cmd.status.insert(Status::INITIALIZED);
                cmd.started_at_ms = Some(now_ms);
            }
            let ctx = TickCtx {
                now_ms,
                started_at_ms: cmd.started_at_ms.unwrap_or(now_ms),
                timeout_ms: cmd.timeout_ms,
            };
            if let CommandKind::Leaf(behavior) = &mut cmd.kind {
                if first_tick {
                    behavior.initialize(&ctx);
                }
                behavior.execute(&ctx);
                return !behavior.is_finished(&ctx);
            }
        }

        // Group: run the workflow, then re-check completion
        self.group_execute(id, now_ms, enabled);
        match self.group_state(id) {
            Some(group) => !group.is_finished(),
            None => false,
        }
    }

    /// Run exactly one of the end/interrupted paths and reset execution
    /// state so a non-parented instance can be re-admitted from scratch
    fn finalize_command(&mut self, id: CommandId, now_ms: u64) {
        if self.group_state(id).is_some() {
            self.group_terminate(id, now_ms);
        }
        let cmd = match self.commands.get_mut(id.index()) {
            Some(cmd) => cmd,
            None => return,
        };
        // Never-initialized commands get no callback
        if cmd.status.is_initialized() {
            let ctx = TickCtx {
                now_ms,
                started_at_ms: cmd.started_at_ms.unwrap_or(now_ms),
                timeout_ms: cmd.timeout_ms,
            };
            let cancelled = cmd.status.is_cancelled();
            if let CommandKind::Leaf(behavior) = &mut cmd.kind {
                if cancelled {
                    behavior.interrupted(&ctx);
                } else {
                    behavior.end(&ctx);
                }
            }
        }
        cmd.status.clear_execution();
        cmd.started_at_ms = None;
        if let Some(group) = cmd.group_mut() {
            group.reset_execution();
        }
    }

    fn remove_running(&mut self, id: CommandId) {
        if let Some(position) = self.running.iter().position(|&r| r == id) {
            remove_at(&mut self.running, position);
        }
    }

    // --- group workflow execution ---

    pub(crate) fn group_state(&self, id: CommandId) -> Option<&GroupState> {
        self.commands.get(id.index()).and_then(|cmd| cmd.group())
    }

    fn group_state_mut(&mut self, id: CommandId) -> Option<&mut GroupState> {
        self.commands.get_mut(id.index()).and_then(|cmd| cmd.group_mut())
    }

    /// One tick of a group's workflow: advance the sequential cursor,
    /// detaching branch entries, then tick the concurrent children
    fn group_execute(&mut self, gid: CommandId, now_ms: u64, enabled: bool) {
        if let Some(group) = self.group_state_mut(gid) {
            if group.cursor.is_none() && !group.done {
                group.cursor = Some(0);
            }
        }

        loop {
            let at_cursor = {
                let group = match self.group_state(gid) {
                    Some(group) => group,
                    None => return,
                };
                match group.cursor {
                    Some(cursor) => Some((
                        cursor,
                        group.entries.get(cursor as usize).copied(),
                    )),
                    None => None,
                }
            };
            let (cursor, entry) = match at_cursor {
                Some((cursor, Some(entry))) => (cursor, entry),
                Some((_, None)) => {
                    // Cursor ran off the end of the sequence
                    if let Some(group) = self.group_state_mut(gid) {
                        group.cursor = None;
                        group.done = true;
                    }
                    break;
                }
                None => break,
            };

            if !entry.started {
                self.start_entry(gid, cursor, &entry);
            }

            match entry.kind {
                EntryKind::BranchChild => {
                    if let Some(group) = self.group_state_mut(gid) {
                        let _ = group.children.push(cursor);
                        group.cursor = Some(cursor + 1);
                    }
                }
                EntryKind::InSequence => {
                    self.enforce_entry_timeout(&entry, now_ms);
                    let still_running = self.tick_command(entry.command, now_ms, enabled, false);
                    if still_running {
                        break;
                    }
                    self.finalize_command(entry.command, now_ms);
                    if let Some(group) = self.group_state_mut(gid) {
                        group.cursor = Some(cursor + 1);
                    }
                }
            }
        }

        // Concurrent children: tick, enforce per-entry timeouts, drop
        // the finished
        let child_indices: Vec<u8, { crate::group::MAX_GROUP_ENTRIES }> =
            match self.group_state(gid) {
                Some(group) => group.children.clone(),
                None => return,
            };
        for child_index in child_indices {
            let entry = match self
                .group_state(gid)
                .and_then(|group| group.entries.get(child_index as usize).copied())
            {
                Some(entry) => entry,
                None => continue,
            };
            self.enforce_entry_timeout(&entry, now_ms);
            let still_running = self.tick_command(entry.command, now_ms, enabled, false);
            if !still_running {
                self.finalize_command(entry.command, now_ms);
                if let Some(group) = self.group_state_mut(gid) {
                    if let Some(position) =
                        group.children.iter().position(|&c| c == child_index)
                    {
                        remove_at(&mut group.children, position);
                    }
                }
            }
        }
    }

    /// First encounter of an entry: resolve conflicts group-locally the
    /// same way the scheduler does, then mark the child running
    fn start_entry(&mut self, gid: CommandId, cursor: u8, entry: &GroupEntry) {
        self.group_cancel_conflicts(gid, entry.command);
        if let Some(child) = self.commands.get_mut(entry.command.index()) {
            child.status.insert(Status::RUNNING);
        }
        if let Some(group) = self.group_state_mut(gid) {
            if let Some(slot) = group.entries.get_mut(cursor as usize) {
                slot.started = true;
            }
        }
    }

    /// Cancel every other running child of this group, and every
    /// scheduler-running command, that shares a required subsystem with
    /// the child being started
    fn group_cancel_conflicts(&mut self, gid: CommandId, starting: CommandId) {
        let requires: Vec<SubsystemId, MAX_REQUIREMENTS> =
            match self.commands.get(starting.index()) {
                Some(cmd) => cmd.requires.clone(),
                None => return,
            };
        if requires.is_empty() {
            return;
        }

        let siblings = match self.group_state(gid) {
            Some(group) => group.child_commands(),
            None => return,
        };
        for sibling in siblings {
            if sibling != starting && self.shares_requirement(sibling, &requires) {
                self.mark_cancelled(sibling);
            }
        }

        let running_snapshot: Vec<CommandId, MAX_COMMANDS> = self.running.clone();
        for top_level in running_snapshot {
            if top_level != gid
                && top_level != starting
                && self.shares_requirement(top_level, &requires)
            {
                self.mark_cancelled(top_level);
            }
        }
    }

    fn shares_requirement(&self, id: CommandId, requires: &[SubsystemId]) -> bool {
        match self.commands.get(id.index()) {
            Some(cmd) => cmd.requires.iter().any(|sys| requires.contains(sys)),
            None => false,
        }
    }

    fn mark_cancelled(&mut self, id: CommandId) {
        if let Some(cmd) = self.commands.get_mut(id.index()) {
            if cmd.status.is_running() {
                cmd.status.insert(Status::CANCELLED);
            }
        }
    }

    /// Force-cancel a child whose per-entry timeout elapsed
    fn enforce_entry_timeout(&mut self, entry: &GroupEntry, now_ms: u64) {
        let timeout_ms = match entry.timeout_ms {
            Some(timeout) => timeout,
            None => return,
        };
        if let Some(child) = self.commands.get_mut(entry.command.index()) {
            if let Some(started) = child.started_at_ms {
                if now_ms.saturating_sub(started) >= timeout_ms as u64 {
                    child.status.insert(Status::CANCELLED);
                }
            }
        }
    }

    /// Group end/interrupted: cancel-and-finalize the in-progress cursor
    /// entry and every concurrent child
    fn group_terminate(&mut self, gid: CommandId, now_ms: u64) {
        let mut active: Vec<CommandId, MAX_COMMANDS> = Vec::new();
        {
            let group = match self.group_state(gid) {
                Some(group) => group,
                None => return,
            };
            if let Some(cursor) = group.cursor {
                if let Some(entry) = group.entries.get(cursor as usize) {
                    if entry.started {
                        let _ = active.push(entry.command);
                    }
                }
            }
            for &child_index in &group.children {
                if let Some(entry) = group.entries.get(child_index as usize) {
                    let _ = active.push(entry.command);
                }
            }
        }
        for child in active {
            self.mark_cancelled(child);
            self.finalize_command(child, now_ms);
        }
    }

    /// Effective interruptibility, composed over a group's active members
    pub(crate) fn interruptible_of(&self, id: CommandId) -> bool {
        let cmd = match self.commands.get(id.index()) {
            Some(cmd) => cmd,
            None => return true,
        };
        if !cmd.interruptible {
            return false;
        }
        if let Some(group) = cmd.group() {
            if let Some(cursor) = group.cursor {
                if let Some(entry) = group.entries.get(cursor as usize) {
                    if entry.started && !self.interruptible_of(entry.command) {
                        return false;
                    }
                }
            }
            for child in group.child_commands() {
                if !self.interruptible_of(child) {
                    return false;
                }
            }
        }
        true
    }
}
