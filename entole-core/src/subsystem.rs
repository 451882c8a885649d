//! Subsystem registry
//!
//! A subsystem is an exclusive-ownership token for one physical actuator
//! group. It holds at most one current command (the owner) and one
//! fallback default command. Ownership is mutated only by the scheduler's
//! admission and release logic.

use heapless::Vec;

use crate::command::CommandId;
use crate::error::{Error, ErrorKind, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum subsystems per scheduler
pub const MAX_SUBSYSTEMS: usize = 8;

/// Stable handle into the subsystem registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubsystemId(u8);

impl SubsystemId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Registry slot index, for diagnostics
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One actuator-group slot
pub struct Subsystem {
    pub(crate) name: &'static str,
    /// Set at registration; commands may only require initialized
    /// subsystems
    pub(crate) initialized: bool,
    pub(crate) current: Option<CommandId>,
    pub(crate) default: Option<CommandId>,
}

impl Subsystem {
    /// Subsystem name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether bring-up registration completed for this slot
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Command presently claiming this subsystem
    pub fn current_command(&self) -> Option<CommandId> {
        self.current
    }

    /// Fallback command admitted whenever no command claims this
    /// subsystem
    pub fn default_command(&self) -> Option<CommandId> {
        self.default
    }
}

/// Registry of all subsystems, populated once at system bring-up
pub struct SubsystemRegistry {
    slots: Vec<Subsystem, MAX_SUBSYSTEMS>,
}

impl SubsystemRegistry {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn add(&mut self, name: &'static str) -> Result<SubsystemId> {
        let id = SubsystemId::new(self.slots.len());
        self.slots
            .push(Subsystem {
                name,
                initialized: true,
                current: None,
                default: None,
            })
            .map_err(|_| Error::new(ErrorKind::Capacity, "add_subsystem"))?;
        Ok(id)
    }

    pub(crate) fn get(&self, id: SubsystemId) -> Option<&Subsystem> {
        self.slots.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: SubsystemId) -> Option<&mut Subsystem> {
        self.slots.get_mut(id.index())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Clear every claim held by `owner`
    pub(crate) fn release_owner(&mut self, owner: CommandId) {
        for slot in &mut self.slots {
            if slot.current == Some(owner) {
                slot.current = None;
            }
        }
    }
}
