//! String-memory operations (module 1:010).
//!
//! Strings are byte strings in the scenario's own encoding; lengths and
//! comparisons work on bytes, so a double-byte character counts as two.

use std::cmp::Ordering;

use crate::error::Result;
use crate::machine::RLMachine;
use crate::module::RLModule;
use crate::operation::{Arguments, ParamKind, RLOperation, RLStoreOperation, Store};

const REF_AND_VALUE: &[ParamKind] = &[ParamKind::StrReference, ParamKind::StrConstant];
const REF_VALUE_COUNT: &[ParamKind] = &[
    ParamKind::StrReference,
    ParamKind::StrConstant,
    ParamKind::IntConstant,
];
const ONE_REF: &[ParamKind] = &[ParamKind::StrReference];
const REF_RANGE: &[ParamKind] = &[ParamKind::StrReference, ParamKind::StrReference];
const ONE_VALUE: &[ParamKind] = &[ParamKind::StrConstant];
const TWO_VALUES: &[ParamKind] = &[ParamKind::StrConstant, ParamKind::StrConstant];
const ONE_INT: &[ParamKind] = &[ParamKind::IntConstant];

struct StrCpy {
    counted: bool,
}

impl RLOperation for StrCpy {
    fn param_kinds(&self) -> &'static [ParamKind] {
        if self.counted {
            REF_VALUE_COUNT
        } else {
            REF_AND_VALUE
        }
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let dest = args.str_ref(machine.memory_mut(), 0)?;
        let mut value = args.string(machine.memory_mut(), 1)?;
        if self.counted {
            let count = args.int(machine.memory_mut(), 2)?.max(0) as usize;
            value.truncate(count);
        }
        dest.write(machine.memory_mut(), &value)
    }
}

struct StrClear {
    ranged: bool,
}

impl RLOperation for StrClear {
    fn param_kinds(&self) -> &'static [ParamKind] {
        if self.ranged {
            REF_RANGE
        } else {
            ONE_REF
        }
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let first = args.str_ref(machine.memory_mut(), 0)?;
        let count = if self.ranged {
            let last = args.str_ref(machine.memory_mut(), 1)?;
            first.distance_to(&last)
        } else {
            1
        };
        for i in 0..count {
            first.advanced(i).write(machine.memory_mut(), b"")?;
        }
        Ok(())
    }
}

struct StrLen;

impl RLStoreOperation for StrLen {
    fn param_kinds(&self) -> &'static [ParamKind] {
        ONE_VALUE
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<i32> {
        Ok(args.string(machine.memory_mut(), 0)?.len() as i32)
    }
}

struct StrCmp;

impl RLStoreOperation for StrCmp {
    fn param_kinds(&self) -> &'static [ParamKind] {
        TWO_VALUES
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<i32> {
        let lhs = args.string(machine.memory_mut(), 0)?;
        let rhs = args.string(machine.memory_mut(), 1)?;
        Ok(match lhs.cmp(&rhs) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })
    }
}

struct StrOut;

impl RLOperation for StrOut {
    fn param_kinds(&self) -> &'static [ParamKind] {
        ONE_VALUE
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let value = args.string(machine.memory_mut(), 0)?;
        machine.show_text(&value);
        Ok(())
    }
}

struct IntOut;

impl RLOperation for IntOut {
    fn param_kinds(&self) -> &'static [ParamKind] {
        ONE_INT
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let value = args.int(machine.memory_mut(), 0)?;
        machine.show_text(value.to_string().as_bytes());
        Ok(())
    }
}

struct StrUsed;

impl RLStoreOperation for StrUsed {
    fn param_kinds(&self) -> &'static [ParamKind] {
        ONE_REF
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<i32> {
        let cell = args.str_ref(machine.memory_mut(), 0)?;
        Ok((!cell.read(machine.memory())?.is_empty()) as i32)
    }
}

/// Builds the Str module.
pub fn create_str_module() -> RLModule {
    let mut module = RLModule::new("Str", 1, 10);
    module.add_opcode(0, 0, "strcpy", Box::new(StrCpy { counted: false }));
    module.add_opcode(0, 1, "strcpy", Box::new(StrCpy { counted: true }));
    module.add_opcode(1, 0, "strclear", Box::new(StrClear { ranged: false }));
    module.add_opcode(1, 1, "strclear", Box::new(StrClear { ranged: true }));
    module.add_opcode(2, 0, "strlen", Box::new(Store(StrLen)));
    module.add_opcode(3, 0, "strcmp", Box::new(Store(StrCmp)));
    module.add_opcode(100, 0, "strout", Box::new(StrOut));
    module.add_opcode(100, 1, "intout", Box::new(IntOut));
    module.add_opcode(200, 0, "strused", Box::new(Store(StrUsed)));
    module
}
