//! Integer-memory block operations (module 1:011).
//!
//! RealLive ranges are inclusive on both ends.

use itertools::iterate;

use crate::error::Result;
use crate::machine::RLMachine;
use crate::module::RLModule;
use crate::operation::{Arguments, ParamKind, RLOperation, RLStoreOperation, Store};

const REF_AND_VALUES: &[ParamKind] = &[
    ParamKind::IntReference,
    ParamKind::Argc(&ParamKind::IntConstant),
];
const RANGE: &[ParamKind] = &[ParamKind::IntReference, ParamKind::IntReference];
const RANGE_AND_VALUE: &[ParamKind] = &[
    ParamKind::IntReference,
    ParamKind::IntReference,
    ParamKind::IntConstant,
];
const REF_STEP_COUNT: &[ParamKind] = &[
    ParamKind::IntReference,
    ParamKind::IntConstant,
    ParamKind::IntConstant,
];
const REF_STEP_COUNT_VALUE: &[ParamKind] = &[
    ParamKind::IntReference,
    ParamKind::IntConstant,
    ParamKind::IntConstant,
    ParamKind::IntConstant,
];
const REF_STEP_VALUES: &[ParamKind] = &[
    ParamKind::IntReference,
    ParamKind::IntConstant,
    ParamKind::Argc(&ParamKind::IntConstant),
];
const REF_OFFSET_REFS: &[ParamKind] = &[
    ParamKind::IntReference,
    ParamKind::IntConstant,
    ParamKind::Argc(&ParamKind::IntReference),
];
const RANGES: &[ParamKind] = &[ParamKind::Argc(&ParamKind::Complex(RANGE))];

struct SetArray;

impl RLOperation for SetArray {
    fn param_kinds(&self) -> &'static [ParamKind] {
        REF_AND_VALUES
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let origin = args.int_ref(machine.memory_mut(), 0)?;
        let values = args.ints_from(machine.memory_mut(), 1)?;
        for (i, value) in values.iter().enumerate() {
            origin.advanced(i as i32).write(machine.memory_mut(), *value)?;
        }
        Ok(())
    }
}

struct SetRange {
    value_param: bool,
}

impl RLOperation for SetRange {
    fn param_kinds(&self) -> &'static [ParamKind] {
        if self.value_param {
            RANGE_AND_VALUE
        } else {
            RANGE
        }
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let first = args.int_ref(machine.memory_mut(), 0)?;
        let last = args.int_ref(machine.memory_mut(), 1)?;
        let value = if self.value_param {
            args.int(machine.memory_mut(), 2)?
        } else {
            0
        };
        for i in 0..first.distance_to(&last) {
            first.advanced(i).write(machine.memory_mut(), value)?;
        }
        Ok(())
    }
}

struct CopyRange;

impl RLOperation for CopyRange {
    fn param_kinds(&self) -> &'static [ParamKind] {
        RANGE_AND_VALUE
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let source = args.int_ref(machine.memory_mut(), 0)?;
        let dest = args.int_ref(machine.memory_mut(), 1)?;
        let count = args.int(machine.memory_mut(), 2)?;
        // Buffer first so overlapping ranges copy coherently.
        let values: Vec<i32> = (0..count)
            .map(|i| source.advanced(i).read(machine.memory()))
            .collect::<Result<_>>()?;
        for (i, value) in values.iter().enumerate() {
            dest.advanced(i as i32).write(machine.memory_mut(), *value)?;
        }
        Ok(())
    }
}

struct SetArrayStepped;

impl RLOperation for SetArrayStepped {
    fn param_kinds(&self) -> &'static [ParamKind] {
        REF_STEP_VALUES
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let origin = args.int_ref(machine.memory_mut(), 0)?;
        let step = args.int(machine.memory_mut(), 1)?;
        let values = args.ints_from(machine.memory_mut(), 2)?;
        for (slot, value) in iterate(origin, |r| r.advanced(step)).zip(values) {
            slot.write(machine.memory_mut(), value)?;
        }
        Ok(())
    }
}

struct SetRangeStepped {
    value_param: bool,
}

impl RLOperation for SetRangeStepped {
    fn param_kinds(&self) -> &'static [ParamKind] {
        if self.value_param {
            REF_STEP_COUNT_VALUE
        } else {
            REF_STEP_COUNT
        }
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let origin = args.int_ref(machine.memory_mut(), 0)?;
        let step = args.int(machine.memory_mut(), 1)?;
        let count = args.int(machine.memory_mut(), 2)?;
        let value = if self.value_param {
            args.int(machine.memory_mut(), 3)?
        } else {
            0
        };
        for slot in iterate(origin, |r| r.advanced(step)).take(count.max(0) as usize) {
            slot.write(machine.memory_mut(), value)?;
        }
        Ok(())
    }
}

struct CopyVars;

impl RLOperation for CopyVars {
    fn param_kinds(&self) -> &'static [ParamKind] {
        REF_OFFSET_REFS
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let origin = args.int_ref(machine.memory_mut(), 0)?;
        let offset = args.int(machine.memory_mut(), 1)?;
        let sources = args.int_refs_from(machine.memory_mut(), 2)?;
        for (i, source) in sources.iter().enumerate() {
            let value = source.advanced(offset).read(machine.memory())?;
            origin.advanced(i as i32).write(machine.memory_mut(), value)?;
        }
        Ok(())
    }
}

struct Sum;

impl RLStoreOperation for Sum {
    fn param_kinds(&self) -> &'static [ParamKind] {
        RANGE
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<i32> {
        let first = args.int_ref(machine.memory_mut(), 0)?;
        let last = args.int_ref(machine.memory_mut(), 1)?;
        let mut total = 0i32;
        for i in 0..first.distance_to(&last) {
            total = total.wrapping_add(first.advanced(i).read(machine.memory())?);
        }
        Ok(total)
    }
}

struct Sums;

impl RLStoreOperation for Sums {
    fn param_kinds(&self) -> &'static [ParamKind] {
        RANGES
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<i32> {
        let mut total = 0i32;
        for pair in args.complexes_from(0)? {
            let first = pair.int_ref(machine.memory_mut(), 0)?;
            let last = pair.int_ref(machine.memory_mut(), 1)?;
            for i in 0..first.distance_to(&last) {
                total = total.wrapping_add(first.advanced(i).read(machine.memory())?);
            }
        }
        Ok(total)
    }
}

/// Builds the Mem module.
pub fn create_mem_module() -> RLModule {
    let mut module = RLModule::new("Mem", 1, 11);
    module.add_opcode(0, 0, "setarray", Box::new(SetArray));
    module.add_opcode(1, 0, "setrng", Box::new(SetRange { value_param: false }));
    module.add_opcode(1, 1, "setrng", Box::new(SetRange { value_param: true }));
    module.add_opcode(2, 0, "cpyrng", Box::new(CopyRange));
    module.add_opcode(3, 0, "setarray_stepped", Box::new(SetArrayStepped));
    module.add_opcode(
        4,
        0,
        "setrng_stepped",
        Box::new(SetRangeStepped { value_param: false }),
    );
    module.add_opcode(
        4,
        1,
        "setrng_stepped",
        Box::new(SetRangeStepped { value_param: true }),
    );
    module.add_opcode(6, 0, "cpyvars", Box::new(CopyVars));
    module.add_opcode(100, 0, "sum", Box::new(Store(Sum)));
    module.add_opcode(101, 0, "sums", Box::new(Store(Sums)));
    module
}
