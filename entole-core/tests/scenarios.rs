//! End-to-end scheduler scenarios driven through the public surface:
//! buttons, admission, preemption, groups, and defaults together.

use std::cell::Cell;
use std::rc::Rc;

use entole_core::button::Activation;
use entole_core::error::ErrorKind;
use entole_core::scheduler::Scheduler;
use entole_core::traits::{Behavior, Input, TickCtx};

/// Counting behavior: finishes after a fixed number of executes per
/// admission, or never
struct Job {
    ticks_to_finish: u32,
    run_executes: u32,
    initializes: u32,
    ends: u32,
    interrupts: u32,
}

impl Job {
    fn finishes_after(ticks: u32) -> Self {
        Self {
            ticks_to_finish: ticks,
            run_executes: 0,
            initializes: 0,
            ends: 0,
            interrupts: 0,
        }
    }

    fn never_finishes() -> Self {
        Self::finishes_after(u32::MAX)
    }
}

impl Behavior for Job {
    fn kind(&self) -> &'static str {
        "Job"
    }

    fn initialize(&mut self, _ctx: &TickCtx) {
        self.initializes += 1;
        self.run_executes = 0;
    }

    fn execute(&mut self, _ctx: &TickCtx) {
        self.run_executes += 1;
    }

    fn is_finished(&mut self, _ctx: &TickCtx) -> bool {
        self.run_executes >= self.ticks_to_finish
    }

    fn end(&mut self, _ctx: &TickCtx) {
        self.ends += 1;
    }

    fn interrupted(&mut self, _ctx: &TickCtx) {
        self.interrupts += 1;
    }
}

/// Shared-cell input standing in for a joystick button bit
#[derive(Clone)]
struct Switch(Rc<Cell<bool>>);

impl Switch {
    fn new() -> Self {
        Self(Rc::new(Cell::new(false)))
    }

    fn set(&self, level: bool) {
        self.0.set(level);
    }
}

impl Input for Switch {
    fn get(&mut self) -> bool {
        self.0.get()
    }
}

#[test]
fn while_held_admits_once_and_cancels_once() {
    let mut sched: Scheduler<Job, Switch> = Scheduler::new();
    let held = Switch::new();
    let button = sched.add_button(held.clone()).unwrap();
    let cmd = sched.create(Job::never_finishes()).unwrap();
    sched.bind(button, Activation::WhileHeld, cmd).unwrap();

    held.set(true);
    let mut now = 0;
    for _ in 0..5 {
        sched.run(now, true).unwrap();
        now += 20;
    }

    // Re-asserted start every held tick, but exactly one admission
    assert!(sched.command(cmd).unwrap().status().is_running());
    assert_eq!(sched.behavior(cmd).unwrap().initializes, 1);

    held.set(false);
    sched.run(now, true).unwrap();
    sched.run(now + 20, true).unwrap();
    sched.run(now + 40, true).unwrap();

    // Exactly one cancel on release, through the interrupted path
    assert_eq!(sched.behavior(cmd).unwrap().interrupts, 1);
    assert_eq!(sched.behavior(cmd).unwrap().ends, 0);
    assert!(sched.running_commands().is_empty());
}

#[test]
fn when_pressed_starts_on_edge() {
    let mut sched: Scheduler<Job, Switch> = Scheduler::new();
    let press = Switch::new();
    let button = sched.add_button(press.clone()).unwrap();
    let cmd = sched.create(Job::finishes_after(1)).unwrap();
    sched.bind(button, Activation::WhenPressed, cmd).unwrap();

    sched.run(0, true).unwrap();
    assert!(sched.running_commands().is_empty());

    press.set(true);
    sched.run(20, true).unwrap(); // edge: request queued, admitted
    sched.run(40, true).unwrap(); // executes and finishes
    assert_eq!(sched.behavior(cmd).unwrap().ends, 1);

    // Holding produces no further admissions
    sched.run(60, true).unwrap();
    sched.run(80, true).unwrap();
    assert_eq!(sched.behavior(cmd).unwrap().initializes, 1);
}

#[test]
fn toggle_group_peers_are_mutually_exclusive() {
    let mut sched: Scheduler<Job, Switch> = Scheduler::new();
    let p = Switch::new();
    let q = Switch::new();
    let button_p = sched.add_button(p.clone()).unwrap();
    let button_q = sched.add_button(q.clone()).unwrap();
    let z = sched.create(Job::never_finishes()).unwrap();
    let w = sched.create(Job::never_finishes()).unwrap();
    sched.bind(button_p, Activation::WhileToggled, z).unwrap();
    sched.bind(button_q, Activation::WhileToggled, w).unwrap();
    sched.set_toggle_group(button_p, 1).unwrap();
    sched.set_toggle_group(button_q, 1).unwrap();

    // Press-and-release P within one tick still flips its latch
    p.set(true);
    sched.run(0, true).unwrap();
    p.set(false);
    sched.run(20, true).unwrap();

    assert!(sched.toggle_state(button_p).unwrap());
    assert!(sched.command(z).unwrap().status().is_running());

    // Pressing Q turns W on and clears P's latch, stopping Z
    q.set(true);
    sched.run(40, true).unwrap();
    q.set(false);
    sched.run(60, true).unwrap();

    assert!(!sched.toggle_state(button_p).unwrap());
    assert!(sched.toggle_state(button_q).unwrap());
    assert_eq!(sched.behavior(z).unwrap().interrupts, 1);
    assert!(sched.command(w).unwrap().status().is_running());
    assert!(!sched.command(z).unwrap().status().is_running());
}

#[test]
fn overlay_binding_wins_within_tick() {
    // Two bindings on the same edge targeting conflicting commands:
    // the later-registered one is evaluated first, so its start request
    // is admitted first and the earlier one is dropped as a duplicate
    // claim on the subsystem only if non-interruptible; with default
    // interruptibility the earlier binding's command preempts. Verify
    // the reverse evaluation order is observable through admission
    // ordering.
    let mut sched: Scheduler<Job, Switch> = Scheduler::new();
    let s = sched.add_subsystem("s").unwrap();
    let press = Switch::new();
    let button = sched.add_button(press.clone()).unwrap();
    let base = sched.create(Job::never_finishes()).unwrap();
    let overlay = sched.create(Job::never_finishes()).unwrap();
    sched.require(base, s).unwrap();
    sched.require(overlay, s).unwrap();
    sched.set_interruptible(overlay, false).unwrap();
    sched.bind(button, Activation::WhenPressed, base).unwrap();
    sched.bind(button, Activation::WhenPressed, overlay).unwrap();

    press.set(true);
    sched.run(0, true).unwrap();

    // Overlay was requested first (reverse registration order) and,
    // being non-interruptible, blocks the base command's admission
    assert_eq!(sched.subsystem(s).unwrap().current_command(), Some(overlay));
    assert!(!sched.command(base).unwrap().status().is_running());
}

#[test]
fn full_match_sequence() {
    // A small end-to-end flow: default drive command, an autonomous
    // group with a branch child, operator preemption, robot disable.
    let mut sched: Scheduler<Job, Switch> = Scheduler::new();
    let drive = sched.add_subsystem("drive").unwrap();
    let arm = sched.add_subsystem("arm").unwrap();

    let idle = sched.create(Job::never_finishes()).unwrap();
    sched.require(idle, drive).unwrap();
    sched.set_default_command(drive, Some(idle)).unwrap();

    let cross_line = sched.create(Job::finishes_after(2)).unwrap();
    sched.require(cross_line, drive).unwrap();
    let raise_arm = sched.create(Job::finishes_after(3)).unwrap();
    sched.require(raise_arm, arm).unwrap();

    let auto = sched.create_group().unwrap();
    sched.add_parallel(auto, raise_arm, None).unwrap();
    sched.add_sequential(auto, cross_line, None).unwrap();

    // Idle fills the drive subsystem first
    sched.run(0, true).unwrap();
    assert_eq!(sched.subsystem(drive).unwrap().current_command(), Some(idle));

    // Autonomous group preempts the default
    sched.start(auto).unwrap();
    sched.run(20, true).unwrap();
    assert_eq!(sched.subsystem(drive).unwrap().current_command(), Some(auto));
    assert_eq!(sched.behavior(idle).unwrap().interrupts, 1);

    sched.run(40, true).unwrap();
    sched.run(60, true).unwrap(); // cross_line finishes
    sched.run(80, true).unwrap(); // raise_arm finishes, group ends

    assert_eq!(sched.behavior(cross_line).unwrap().ends, 1);
    assert_eq!(sched.behavior(raise_arm).unwrap().ends, 1);
    // Default reclaims the drive subsystem the tick the group ended
    assert_eq!(sched.subsystem(drive).unwrap().current_command(), Some(idle));

    // Disabling the robot discards the default before it initializes,
    // and the idle subsystem immediately re-queues it; it parks
    // unexecuted until the robot re-enables
    sched.run(100, false).unwrap();
    sched.run(120, false).unwrap();
    assert_eq!(sched.subsystem(drive).unwrap().current_command(), Some(idle));
    assert_eq!(sched.behavior(idle).unwrap().initializes, 1);
    assert_eq!(sched.behavior(idle).unwrap().interrupts, 1);

    sched.run(140, true).unwrap();
    assert_eq!(sched.behavior(idle).unwrap().initializes, 2);
}

#[test]
fn run_error_leaves_scheduler_usable() {
    let mut sched: Scheduler<Job, Switch> = Scheduler::new();
    let press = Switch::new();
    let button = sched.add_button(press.clone()).unwrap();
    let cmd = sched.create(Job::never_finishes()).unwrap();
    sched.bind(button, Activation::WhenPressed, cmd).unwrap();

    // Binding target becomes group-owned after the fact: the press now
    // raises InvalidOperation out of run()
    let group = sched.create_group().unwrap();
    sched.add_sequential(group, cmd, None).unwrap();

    press.set(true);
    let err = sched.run(0, true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidOperation);

    // The control loop resumes on the next tick
    press.set(false);
    sched.run(20, true).unwrap();
    sched.start(group).unwrap();
    sched.run(40, true).unwrap();
    sched.run(60, true).unwrap();
    assert!(sched.command(cmd).unwrap().status().is_running());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    const SUBSYSTEMS: usize = 3;
    const COMMANDS: usize = 6;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Start(usize),
        Cancel(usize),
        Run,
        RunDisabled,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..COMMANDS).prop_map(Op::Start),
            (0..COMMANDS).prop_map(Op::Cancel),
            Just(Op::Run),
            Just(Op::RunDisabled),
        ]
    }

    fn check_invariants(sched: &Scheduler<Job, Switch>, ids: &[entole_core::command::CommandId]) {
        // Claimed subsystems point at a running command that requires
        // them, and running commands' requirement sets are disjoint
        for &id in ids {
            let record = sched.command(id).unwrap();
            if !record.status().is_running() {
                continue;
            }
            for &other in ids {
                if other == id {
                    continue;
                }
                let other_record = sched.command(other).unwrap();
                if !other_record.status().is_running() {
                    continue;
                }
                for sys in record.requires() {
                    assert!(
                        !other_record.requires().contains(sys),
                        "two running commands share a subsystem"
                    );
                }
            }
        }
        // Finalize exactly once per admission: a command is at most one
        // unfinished admission ahead of its finalizations
        for &id in ids {
            let job = sched.behavior(id).unwrap();
            let finalized = job.ends + job.interrupts;
            assert!(finalized <= job.initializes);
            assert!(job.initializes - finalized <= 1);
        }
    }

    proptest! {
        #[test]
        fn ownership_and_finalization_invariants(
            requires in proptest::collection::vec(
                proptest::collection::vec(0..SUBSYSTEMS, 0..=2),
                COMMANDS,
            ),
            interruptible in proptest::collection::vec(any::<bool>(), COMMANDS),
            ops in proptest::collection::vec(op_strategy(), 1..60),
        ) {
            let mut sched: Scheduler<Job, Switch> = Scheduler::new();
            let mut subsystems = Vec::new();
            for name in ["s0", "s1", "s2"] {
                subsystems.push(sched.add_subsystem(name).unwrap());
            }
            let mut ids = Vec::new();
            for index in 0..COMMANDS {
                let id = sched.create(Job::never_finishes()).unwrap();
                for &sys in &requires[index] {
                    sched.require(id, subsystems[sys]).unwrap();
                }
                sched.set_interruptible(id, interruptible[index]).unwrap();
                ids.push(id);
            }

            let mut now = 0u64;
            for op in ops {
                match op {
                    Op::Start(index) => sched.start(ids[index]).unwrap(),
                    Op::Cancel(index) => sched.cancel(ids[index]).unwrap(),
                    Op::Run => {
                        now += 20;
                        sched.run(now, true).unwrap();
                    }
                    Op::RunDisabled => {
                        now += 20;
                        sched.run(now, false).unwrap();
                    }
                }
                check_invariants(&sched, &ids);
            }

            // Bring-down: everything must finalize exactly once
            sched.reset(now + 20);
            for &id in &ids {
                let job = sched.behavior(id).unwrap();
                prop_assert_eq!(job.ends + job.interrupts, job.initializes);
            }
        }
    }
}
