//! Cooperative multi-tick operations.
//!
//! A long operation is a non-trivial command that needs multiple passes
//! through the host's main loop: waits, transitions, save/load
//! sequences. While any long operation is on the stack the scheduler
//! polls the top one instead of executing bytecode; when its tick
//! reports [`TickResult::Done`] it is popped and whatever is beneath it
//! resumes.

use tracing::warn;

use crate::machine::RLMachine;
use crate::reference::IntReference;
use crate::system::MouseButton;

/// Outcome of one long-operation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Still running; poll again next tick.
    Continue,
    /// Finished; pop the operation and resume what is beneath it.
    Done,
}

/// A command that executes over multiple scheduler ticks.
///
/// An operation may push further long operations during its tick; they
/// run to completion before it is polled again. An operation that
/// replaces or clears the machine's stacks must return
/// [`TickResult::Continue`] and rely on the clearance to retire it, as
/// the frame it belongs to may no longer exist.
pub trait LongOperation {
    /// Executes one tick.
    fn tick(&mut self, machine: &mut RLMachine) -> TickResult;
}

/// The generic wait: any combination of a target time, click
/// termination with optional coordinate recording, and ctrl skipping.
#[derive(Debug)]
pub struct WaitLongOperation {
    target_time: Option<u32>,
    break_on_clicks: bool,
    save_click_location: Option<(IntReference, IntReference)>,
    break_on_ctrl: bool,
}

impl WaitLongOperation {
    /// A wait with no termination condition beyond fast-forward and
    /// (when the text system enables it) the control key.
    pub fn new(machine: &RLMachine) -> Self {
        Self {
            target_time: None,
            break_on_clicks: false,
            save_click_location: None,
            break_on_ctrl: machine.text().ctrl_key_skip(),
        }
    }

    /// Terminate once `time` milliseconds have elapsed.
    pub fn wait_milliseconds(mut self, machine: &RLMachine, time: u32) -> Self {
        self.target_time = Some(machine.events().ticks().wrapping_add(time));
        self
    }

    /// Terminate on a mouse click, reporting the button in the store
    /// register.
    pub fn break_on_clicks(mut self) -> Self {
        self.break_on_clicks = true;
        self
    }

    /// Record the cursor position into `x` and `y` when the wait ends.
    /// Implies click termination.
    pub fn save_click_location(mut self, x: IntReference, y: IntReference) -> Self {
        self.break_on_clicks = true;
        self.save_click_location = Some((x, y));
        self
    }

    fn record_cursor(&self, machine: &mut RLMachine) {
        if let Some((x, y)) = self.save_click_location {
            let (cx, cy) = machine.events().cursor_position();
            if x.write(machine.memory_mut(), cx).is_err()
                || y.write(machine.memory_mut(), cy).is_err()
            {
                warn!("click location reference is out of range");
            }
        }
    }
}

/// Presents select options and waits for the host's decision; the chosen
/// index lands in the store register.
#[derive(Debug)]
pub struct SelectLongOperation {
    options: Vec<Vec<u8>>,
}

impl SelectLongOperation {
    /// Builds a selection over decoded option texts.
    pub fn new(options: Vec<Vec<u8>>) -> Self {
        Self { options }
    }
}

impl LongOperation for SelectLongOperation {
    fn tick(&mut self, machine: &mut RLMachine) -> TickResult {
        match machine.text_mut().selection_choice(&self.options) {
            Some(choice) => {
                machine.set_store_register(choice);
                TickResult::Done
            }
            None => TickResult::Continue,
        }
    }
}

impl LongOperation for WaitLongOperation {
    fn tick(&mut self, machine: &mut RLMachine) -> TickResult {
        let mut done = (self.break_on_ctrl && machine.events().ctrl_pressed())
            || machine.fast_forward();

        if !done {
            if let Some(target) = self.target_time {
                done = machine.events().ticks() > target;
            }
        }

        if self.break_on_clicks {
            if let Some(button) = machine.events_mut().take_click() {
                self.record_cursor(machine);
                machine.set_store_register(match button {
                    MouseButton::Left => 1,
                    MouseButton::Right => -1,
                });
                return TickResult::Done;
            }
            if done {
                self.record_cursor(machine);
                machine.set_store_register(0);
            }
        }

        if done {
            TickResult::Done
        } else {
            TickResult::Continue
        }
    }
}
