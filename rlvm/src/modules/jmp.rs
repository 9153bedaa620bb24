//! Flow-control module (module 0:001).
//!
//! The goto family and select are the only commands whose parameters are
//! not ordinary expression lists, so they dispatch as special cases with
//! full control over the instruction pointer. The call-and-return
//! primitives (`ret`, `jump`, `farcall`, `rtl` and the `_with` variants)
//! are ordinary typed operations.

use reallive::expression::get_data;
use reallive::intmemref::{IntMemRef, INTL_LOCATION, STRK_LOCATION};
use reallive::{CommandElement, CommandVariant, ExpressionValueType};

use crate::error::{MachineError, Result};
use crate::machine::RLMachine;
use crate::module::RLModule;
use crate::operation::{Arguments, ParamKind, RLOperation, RLSpecialCaseOperation};

fn eval_expression(machine: &mut RLMachine, bytes: &[u8]) -> Result<i32> {
    let mut cursor = bytes;
    let piece = reallive::expression::get_expression(&mut cursor)?;
    Ok(piece.int_value(machine.memory_mut())?)
}

/// Evaluates `*_with` call arguments into the argument-passing banks:
/// integers land in L in declaration order, strings in K.
fn pass_arguments(machine: &mut RLMachine, params: &[Vec<u8>]) -> Result<()> {
    let mut next_int = 0;
    let mut next_str = 0;
    for raw in params {
        let mut cursor = &raw[..];
        let piece = get_data(&mut cursor)?;
        match piece.value_type() {
            ExpressionValueType::Integer => {
                let value = piece.int_value(machine.memory_mut())?;
                machine
                    .memory_mut()
                    .set_int_value(IntMemRef::new(INTL_LOCATION, 0, next_int), value)?;
                next_int += 1;
            }
            ExpressionValueType::String => {
                let value = piece.string_value(machine.memory_mut())?.to_vec();
                machine
                    .memory_mut()
                    .set_string_value(STRK_LOCATION, next_str, &value)?;
                next_str += 1;
            }
        }
    }
    Ok(())
}

struct Goto;

impl RLSpecialCaseOperation for Goto {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::Goto { target } => machine.goto_location(target.handle()),
            _ => Err(MachineError::BadCast("goto")),
        }
    }
}

struct GotoIf {
    jump_on: bool,
}

impl RLSpecialCaseOperation for GotoIf {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GotoIf { condition, target } => {
                if (eval_expression(machine, condition)? != 0) == self.jump_on {
                    machine.goto_location(target.handle())
                } else {
                    machine.advance_instruction_pointer();
                    Ok(())
                }
            }
            _ => Err(MachineError::BadCast("goto_if")),
        }
    }
}

struct GotoOn;

impl RLSpecialCaseOperation for GotoOn {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GotoOn { condition, targets } => {
                let index = eval_expression(machine, condition)?;
                match usize::try_from(index).ok().and_then(|i| targets.get(i)) {
                    Some(target) => machine.goto_location(target.handle()),
                    None => {
                        machine.advance_instruction_pointer();
                        Ok(())
                    }
                }
            }
            _ => Err(MachineError::BadCast("goto_on")),
        }
    }
}

struct GotoCase;

impl RLSpecialCaseOperation for GotoCase {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GotoCase { condition, cases } => {
                let value = eval_expression(machine, condition)?;
                for (case, target) in cases {
                    // The empty case `()` is the default branch.
                    let matched = case.as_slice() == b"()"
                        || eval_expression(machine, &case[1..case.len() - 1])? == value;
                    if matched {
                        return machine.goto_location(target.handle());
                    }
                }
                machine.advance_instruction_pointer();
                Ok(())
            }
            _ => Err(MachineError::BadCast("goto_case")),
        }
    }
}

struct Gosub;

impl RLSpecialCaseOperation for Gosub {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::Goto { target } => machine.gosub(target.handle()),
            _ => Err(MachineError::BadCast("gosub")),
        }
    }
}

struct GosubIf {
    jump_on: bool,
}

impl RLSpecialCaseOperation for GosubIf {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GotoIf { condition, target } => {
                if (eval_expression(machine, condition)? != 0) == self.jump_on {
                    machine.gosub(target.handle())
                } else {
                    machine.advance_instruction_pointer();
                    Ok(())
                }
            }
            _ => Err(MachineError::BadCast("gosub_if")),
        }
    }
}

struct GosubOn;

impl RLSpecialCaseOperation for GosubOn {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GotoOn { condition, targets } => {
                let index = eval_expression(machine, condition)?;
                match usize::try_from(index).ok().and_then(|i| targets.get(i)) {
                    Some(target) => machine.gosub(target.handle()),
                    None => {
                        machine.advance_instruction_pointer();
                        Ok(())
                    }
                }
            }
            _ => Err(MachineError::BadCast("gosub_on")),
        }
    }
}

struct GosubCase;

impl RLSpecialCaseOperation for GosubCase {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GotoCase { condition, cases } => {
                let value = eval_expression(machine, condition)?;
                for (case, target) in cases {
                    let matched = case.as_slice() == b"()"
                        || eval_expression(machine, &case[1..case.len() - 1])? == value;
                    if matched {
                        return machine.gosub(target.handle());
                    }
                }
                machine.advance_instruction_pointer();
                Ok(())
            }
            _ => Err(MachineError::BadCast("gosub_case")),
        }
    }
}

struct GosubWith;

impl RLSpecialCaseOperation for GosubWith {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::GosubWith { params, target } => {
                pass_arguments(machine, params)?;
                machine.gosub(target.handle())
            }
            _ => Err(MachineError::BadCast("gosub_with")),
        }
    }
}

const NO_PARAMS: &[ParamKind] = &[];
const SCENARIO: &[ParamKind] = &[ParamKind::IntConstant];
const SCENARIO_AND_ENTRYPOINT: &[ParamKind] = &[ParamKind::IntConstant, ParamKind::IntConstant];
const OPTIONAL_VALUE: &[ParamKind] = &[ParamKind::Argc(&ParamKind::IntConstant)];

struct Ret;

impl RLOperation for Ret {
    fn param_kinds(&self) -> &'static [ParamKind] {
        NO_PARAMS
    }

    fn call(&self, machine: &mut RLMachine, _args: &Arguments<'_>) -> Result<()> {
        machine.return_from_gosub()
    }
}

struct RetWith;

impl RLOperation for RetWith {
    fn param_kinds(&self) -> &'static [ParamKind] {
        OPTIONAL_VALUE
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        if !args.is_empty() {
            let value = args.int(machine.memory_mut(), 0)?;
            machine.set_store_register(value);
        }
        machine.return_from_gosub()
    }
}

struct Jump {
    with_entrypoint: bool,
}

impl RLOperation for Jump {
    fn param_kinds(&self) -> &'static [ParamKind] {
        if self.with_entrypoint {
            SCENARIO_AND_ENTRYPOINT
        } else {
            SCENARIO
        }
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let scenario = args.int(machine.memory_mut(), 0)?;
        let entrypoint = if self.with_entrypoint {
            args.int(machine.memory_mut(), 1)?
        } else {
            0
        };
        machine.jump(scenario, entrypoint)
    }
}

struct Farcall {
    with_entrypoint: bool,
}

impl RLOperation for Farcall {
    fn param_kinds(&self) -> &'static [ParamKind] {
        if self.with_entrypoint {
            SCENARIO_AND_ENTRYPOINT
        } else {
            SCENARIO
        }
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let scenario = args.int(machine.memory_mut(), 0)?;
        let entrypoint = if self.with_entrypoint {
            args.int(machine.memory_mut(), 1)?
        } else {
            0
        };
        machine.farcall(scenario, entrypoint)
    }
}

struct Rtl;

impl RLOperation for Rtl {
    fn param_kinds(&self) -> &'static [ParamKind] {
        NO_PARAMS
    }

    fn call(&self, machine: &mut RLMachine, _args: &Arguments<'_>) -> Result<()> {
        machine.return_from_farcall()
    }
}

struct RtlWith;

impl RLOperation for RtlWith {
    fn param_kinds(&self) -> &'static [ParamKind] {
        OPTIONAL_VALUE
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        if !args.is_empty() {
            let value = args.int(machine.memory_mut(), 0)?;
            machine.set_store_register(value);
        }
        machine.return_from_farcall()
    }
}

struct FarcallWith;

impl RLOperation for FarcallWith {
    fn param_kinds(&self) -> &'static [ParamKind] {
        const KINDS: &[ParamKind] = &[
            ParamKind::IntConstant,
            ParamKind::IntConstant,
            ParamKind::Argc(&ParamKind::IntConstant),
        ];
        KINDS
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let scenario = args.int(machine.memory_mut(), 0)?;
        let entrypoint = args.int(machine.memory_mut(), 1)?;
        let values = args.ints_from(machine.memory_mut(), 2)?;
        for (i, value) in values.iter().enumerate() {
            machine
                .memory_mut()
                .set_int_value(IntMemRef::new(INTL_LOCATION, 0, i as i32), *value)?;
        }
        machine.farcall(scenario, entrypoint)
    }
}

/// Builds the flow-control module.
pub fn create_jmp_module() -> RLModule {
    let mut module = RLModule::new("Jmp", 0, 1);
    module.add_special_case(0, 0, "goto", Box::new(Goto));
    module.add_special_case(1, 0, "goto_if", Box::new(GotoIf { jump_on: true }));
    module.add_special_case(2, 0, "goto_unless", Box::new(GotoIf { jump_on: false }));
    module.add_special_case(3, 0, "goto_on", Box::new(GotoOn));
    module.add_special_case(4, 0, "goto_case", Box::new(GotoCase));
    module.add_special_case(5, 0, "gosub", Box::new(Gosub));
    module.add_special_case(6, 0, "gosub_if", Box::new(GosubIf { jump_on: true }));
    module.add_special_case(7, 0, "gosub_unless", Box::new(GosubIf { jump_on: false }));
    module.add_special_case(8, 0, "gosub_on", Box::new(GosubOn));
    module.add_special_case(9, 0, "gosub_case", Box::new(GosubCase));
    module.add_opcode(10, 0, "ret", Box::new(Ret));
    module.add_opcode(11, 0, "jump", Box::new(Jump { with_entrypoint: false }));
    module.add_opcode(
        11,
        1,
        "jump",
        Box::new(Jump {
            with_entrypoint: true,
        }),
    );
    module.add_opcode(
        12,
        0,
        "farcall",
        Box::new(Farcall {
            with_entrypoint: false,
        }),
    );
    module.add_opcode(
        12,
        1,
        "farcall",
        Box::new(Farcall {
            with_entrypoint: true,
        }),
    );
    module.add_opcode(13, 0, "rtl", Box::new(Rtl));
    module.add_special_case(16, 0, "gosub_with", Box::new(GosubWith));
    module.add_opcode(17, 0, "ret_with", Box::new(RetWith));
    module.add_opcode(18, 0, "farcall_with", Box::new(FarcallWith));
    module.add_opcode(19, 0, "rtl_with", Box::new(RtlWith));
    module
}
