//! Execution loop: the one place simulated time advances.
//!
//! Runs on a dedicated thread. Each iteration advances the core by one
//! quantum and flushes every pin event through the signal graph before the
//! next quantum begins, so peripheral state is never stale by more than one
//! quantum. The per-quantum unit is [`run_quantum`], a plain function the
//! tests drive without threads or wall-clock timing.
//!
//! The loop honors a debugger-held `Stopped` in the shared run-state cell
//! (parks briefly instead of advancing), publishes the run-state after
//! every quantum, and exits on a terminal state, on a wiring fault (state
//! forced to `Crashed`, the fault carried out through the join), or on an
//! external halt request (the quit path: the core is signalled to halt
//! rather than left advancing behind a dead session).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::devices::SharedDevice;
use crate::engine::{CoreEngine, CoreHandle, PinEvent, RunState, RunStateCell};
use crate::error::WiringError;
use crate::signal::{Pin, SignalGraph};

/// How long the loop parks while the debugger holds the core stopped.
const STOP_POLL: Duration = Duration::from_millis(1);

/// Advance the core by one quantum and flush its pin events through the
/// graph. Returns the run-state after the quantum.
pub fn run_quantum(
    core: &mut dyn CoreEngine,
    graph: &SignalGraph,
    devices: &[SharedDevice],
    events: &mut Vec<PinEvent>,
) -> Result<RunState, WiringError> {
    events.clear();
    let state = core.step_quantum(events);
    for ev in events.drain(..) {
        graph.propagate(Pin::core(ev.line), ev.value, core, devices)?;
    }
    Ok(state)
}

/// What the loop thread hands back at join time.
pub struct LoopOutcome {
    /// The core, readable now that its state is terminal.
    pub core: Box<dyn CoreEngine>,
    /// A wiring fault that aborted the loop, if any.
    pub fault: Option<WiringError>,
}

/// Handle to the running execution-loop thread.
pub struct ExecutionLoop {
    handle: JoinHandle<LoopOutcome>,
    state: Arc<RunStateCell>,
    halt: Arc<AtomicBool>,
}

impl ExecutionLoop {
    /// Move the core and the (fully wired) graph onto a new thread and
    /// start advancing. With `start_paused` the loop waits for the shared
    /// run-state to leave `Stopped` (the debugger's continue) before the
    /// first quantum.
    pub fn spawn(
        handle: CoreHandle,
        graph: SignalGraph,
        devices: Vec<SharedDevice>,
        start_paused: bool,
    ) -> Self {
        let CoreHandle { mut engine, state } = handle;
        let halt = Arc::new(AtomicBool::new(false));

        if !start_paused {
            state.store(RunState::Running);
        }

        let thread_state = state.clone();
        let thread_halt = halt.clone();
        let join = thread::spawn(move || {
            let mut events = Vec::new();
            let fault = loop {
                if thread_halt.load(Ordering::Acquire) {
                    engine.signal_halt();
                    thread_state.store(engine.run_state());
                    break None;
                }
                if thread_state.load() == RunState::Stopped {
                    thread::sleep(STOP_POLL);
                    continue;
                }
                match run_quantum(engine.as_mut(), &graph, &devices, &mut events) {
                    Ok(new_state) => {
                        thread_state.store(new_state);
                        if new_state.is_terminal() {
                            break None;
                        }
                    }
                    Err(fault) => {
                        log::error!("execution loop aborted: {}", fault);
                        thread_state.store(RunState::Crashed);
                        break Some(fault);
                    }
                }
            };
            LoopOutcome { core: engine, fault }
        });

        ExecutionLoop { handle: join, state, halt }
    }

    /// Run-state as last published by the loop (or the debug stub).
    pub fn state(&self) -> RunState {
        self.state.load()
    }

    /// Ask the loop to stop advancing simulated time. The core is
    /// signalled to halt at the next quantum boundary.
    pub fn request_halt(&self) {
        self.halt.store(true, Ordering::Release);
    }

    /// Wait for the loop to reach a terminal state and take the core back.
    pub fn join(self) -> LoopOutcome {
        self.handle.join().expect("execution loop thread panicked")
    }
}
