//! Board-agnostic command scheduling core for the Entole robot
//! controller
//!
//! This crate contains the cooperative, tick-driven arbitration logic
//! that decides which command may drive which actuator group. It does
//! not depend on specific hardware:
//!
//! - Command lifecycle and behavior traits
//! - Sequential/parallel command group workflows
//! - Subsystem exclusive-ownership registry
//! - Button edge/level/toggle activation bindings
//! - The per-tick scheduler: admission, preemption, defaults
//!
//! The embedding firmware calls
//! [`Scheduler::run`](scheduler::Scheduler::run) once per control-loop
//! iteration, passing in the millisecond clock and the robot enable
//! flag.

#![no_std]
#![deny(unsafe_code)]

pub mod button;
pub mod command;
pub mod error;
pub mod group;
pub mod report;
pub mod scheduler;
pub mod subsystem;
pub mod traits;
