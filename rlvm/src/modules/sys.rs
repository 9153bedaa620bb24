//! Wait and mouse-input operations of the Sys module (1:004).
//!
//! Each of these installs the generic wait long operation and returns;
//! the scheduler runs the wait instead of bytecode until it terminates.

use crate::error::Result;
use crate::machine::RLMachine;
use crate::module::RLModule;
use crate::operation::{Arguments, ParamKind, RLOperation};
use crate::long_operation::WaitLongOperation;

const TIME: &[ParamKind] = &[ParamKind::IntConstant];
const POINT_REFS: &[ParamKind] = &[ParamKind::IntReference, ParamKind::IntReference];
const TIME_AND_POINT_REFS: &[ParamKind] = &[
    ParamKind::IntConstant,
    ParamKind::IntReference,
    ParamKind::IntReference,
];

struct Wait {
    cancelable: bool,
}

impl RLOperation for Wait {
    fn param_kinds(&self) -> &'static [ParamKind] {
        TIME
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let time = args.int(machine.memory_mut(), 0)?.max(0) as u32;
        let mut wait = WaitLongOperation::new(machine).wait_milliseconds(machine, time);
        if self.cancelable {
            wait = wait.break_on_clicks();
        }
        machine.push_long_operation(Box::new(wait));
        Ok(())
    }
}

struct GetClick;

impl RLOperation for GetClick {
    fn param_kinds(&self) -> &'static [ParamKind] {
        POINT_REFS
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let x = args.int_ref(machine.memory_mut(), 0)?;
        let y = args.int_ref(machine.memory_mut(), 1)?;
        let wait = WaitLongOperation::new(machine).save_click_location(x, y);
        machine.push_long_operation(Box::new(wait));
        Ok(())
    }
}

struct WaitClick;

impl RLOperation for WaitClick {
    fn param_kinds(&self) -> &'static [ParamKind] {
        TIME_AND_POINT_REFS
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let time = args.int(machine.memory_mut(), 0)?.max(0) as u32;
        let x = args.int_ref(machine.memory_mut(), 1)?;
        let y = args.int_ref(machine.memory_mut(), 2)?;
        let wait = WaitLongOperation::new(machine)
            .wait_milliseconds(machine, time)
            .save_click_location(x, y);
        machine.push_long_operation(Box::new(wait));
        Ok(())
    }
}

/// Builds the wait/input slice of the Sys module.
pub fn create_sys_module() -> RLModule {
    let mut module = RLModule::new("Sys", 1, 4);
    module.add_opcode(100, 0, "wait", Box::new(Wait { cancelable: false }));
    module.add_opcode(101, 0, "waitC", Box::new(Wait { cancelable: true }));
    module.add_opcode(131, 0, "GetClick", Box::new(GetClick));
    module.add_opcode(132, 0, "WaitClick", Box::new(WaitClick));
    module
}
