//! Buttons and activation bindings
//!
//! A button wraps an [`Input`] and is sampled once per tick. Bindings
//! pair a button with a target command under one of four activation
//! policies; the scheduler evaluates them in reverse registration order
//! so later-registered (overlay) bindings take effect first within a
//! tick.
//!
//! Toggle groups make `WhileToggled` buttons mutually exclusive: a button
//! toggling on clears the toggle state of every other member of its
//! group. The member scan is linear over all buttons, which is bounded by
//! the hardware button count.

use heapless::Vec;

use crate::command::CommandId;
use crate::error::{Error, ErrorKind, Result};
use crate::traits::Input;

/// Maximum buttons per scheduler
pub const MAX_BUTTONS: usize = 16;

/// Maximum activation bindings per scheduler
pub const MAX_BINDINGS: usize = 16;

/// Stable handle into the button registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonId(u8);

impl ButtonId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Registry slot index, for diagnostics
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Activation policy of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activation {
    /// Start on the false-to-true edge
    WhenPressed,
    /// Start every tick the level is true, cancel once on release
    WhileHeld,
    /// Start on the true-to-false edge
    WhenReleased,
    /// Press toggles a latch; start every tick the latch is set, cancel
    /// once when it clears (including when a toggle-group peer clears it)
    WhileToggled,
}

/// Start/cancel request produced by a binding evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Start(CommandId),
    Cancel(CommandId),
}

struct Button<I> {
    input: I,
    /// Level observed by the current tick's sample
    level: bool,
    /// Debounce-accepted rising edge this tick
    rose_debounced: bool,
    /// Toggle flip already applied this tick
    toggle_serviced: bool,
    toggle_state: bool,
    toggle_group: Option<u8>,
    /// Minimum spacing between accepted toggle edges (ms)
    debounce_ms: u32,
    last_edge_ms: u64,
}

struct Binding {
    button: ButtonId,
    command: CommandId,
    activation: Activation,
    /// Level this binding last observed
    held: bool,
    /// Toggle state this binding last observed
    toggled: bool,
}

/// Button registry plus activation bindings
pub(crate) struct ButtonBoard<I> {
    buttons: Vec<Button<I>, MAX_BUTTONS>,
    bindings: Vec<Binding, MAX_BINDINGS>,
}

impl<I: Input> ButtonBoard<I> {
    pub(crate) fn new() -> Self {
        Self {
            buttons: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub(crate) fn add_button(&mut self, input: I) -> Result<ButtonId> {
        let id = ButtonId::new(self.buttons.len());
        self.buttons
            .push(Button {
                input,
                level: false,
                rose_debounced: false,
                toggle_serviced: false,
                toggle_state: false,
                toggle_group: None,
                debounce_ms: 0,
                last_edge_ms: 0,
            })
            .map_err(|_| Error::new(ErrorKind::Capacity, "add_button"))?;
        Ok(id)
    }

    pub(crate) fn bind(
        &mut self,
        button: ButtonId,
        activation: Activation,
        command: CommandId,
    ) -> Result<()> {
        if button.index() >= self.buttons.len() {
            return Err(Error::new(ErrorKind::InvalidArgument, "bind"));
        }
        self.bindings
            .push(Binding {
                button,
                command,
                activation,
                held: false,
                toggled: false,
            })
            .map_err(|_| Error::new(ErrorKind::Capacity, "bind"))
    }

    pub(crate) fn set_toggle_group(&mut self, button: ButtonId, group: u8) -> Result<()> {
        let slot = self
            .buttons
            .get_mut(button.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "set_toggle_group"))?;
        // Re-assignment moves the button; membership is the Option itself
        slot.toggle_group = Some(group);
        Ok(())
    }

    pub(crate) fn set_debounce(&mut self, button: ButtonId, debounce_ms: u32) -> Result<()> {
        let slot = self
            .buttons
            .get_mut(button.index())
            .ok_or(Error::new(ErrorKind::InvalidArgument, "set_debounce"))?;
        slot.debounce_ms = debounce_ms;
        Ok(())
    }

    pub(crate) fn toggle_state(&self, button: ButtonId) -> Result<bool> {
        self.buttons
            .get(button.index())
            .map(|slot| slot.toggle_state)
            .ok_or(Error::new(ErrorKind::InvalidArgument, "toggle_state"))
    }

    pub(crate) fn bindings_len(&self) -> usize {
        self.bindings.len()
    }

    /// Sample every input once and compute this tick's edge flags
    pub(crate) fn sample_all(&mut self, now_ms: u64) {
        for button in &mut self.buttons {
            let level = button.input.get();
            let rose = level && !button.level;
            button.level = level;
            button.toggle_serviced = false;
            button.rose_debounced = false;
            if rose {
                let since_last = now_ms.saturating_sub(button.last_edge_ms);
                if since_last >= button.debounce_ms as u64 {
                    button.rose_debounced = true;
                    button.last_edge_ms = now_ms;
                }
            }
        }
    }

    /// Evaluate one binding against the current tick's samples
    pub(crate) fn evaluate(&mut self, index: usize) -> Option<Action> {
        let (button_index, activation, command) = {
            let binding = self.bindings.get(index)?;
            (
                binding.button.index(),
                binding.activation,
                binding.command,
            )
        };
        let level = self.buttons.get(button_index)?.level;

        let binding = &mut self.bindings[index];
        let rose = level && !binding.held;
        let fell = !level && binding.held;
        binding.held = level;

        match activation {
            Activation::WhenPressed => rose.then_some(Action::Start(command)),
            Activation::WhenReleased => fell.then_some(Action::Start(command)),
            Activation::WhileHeld => {
                if level {
                    Some(Action::Start(command))
                } else if fell {
                    Some(Action::Cancel(command))
                } else {
                    None
                }
            }
            Activation::WhileToggled => {
                self.service_toggle(button_index);
                let toggled = self.buttons[button_index].toggle_state;
                let binding = &mut self.bindings[index];
                let was_toggled = binding.toggled;
                binding.toggled = toggled;
                if toggled {
                    Some(Action::Start(command))
                } else if was_toggled {
                    Some(Action::Cancel(command))
                } else {
                    None
                }
            }
        }
    }

    /// Apply the button's toggle flip for this tick, at most once, and
    /// clear toggle-group peers when the flip turns the latch on
    fn service_toggle(&mut self, button_index: usize) {
        let (flip, group) = {
            let button = &self.buttons[button_index];
            (
                button.rose_debounced && !button.toggle_serviced,
                button.toggle_group,
            )
        };
        if !flip {
            return;
        }

        let button = &mut self.buttons[button_index];
        button.toggle_serviced = true;
        button.toggle_state = !button.toggle_state;
        let turned_on = button.toggle_state;

        if turned_on {
            if let Some(group) = group {
                for (other_index, other) in self.buttons.iter_mut().enumerate() {
                    if other_index != button_index && other.toggle_group == Some(group) {
                        other.toggle_state = false;
                    }
                }
            }
        }
    }
}
