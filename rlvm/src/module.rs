//! Opcode modules and their registry keys.
//!
//! A module is a named group of operations registered as one unit. The
//! machine routes a command by `(module type, module number)`, then the
//! module routes by `(opcode << 8) | overload`. The `argc` field of the
//! command header is informational and never part of the key.

use std::collections::HashMap;

use reallive::CommandElement;

use crate::error::{MachineError, Result};
use crate::machine::RLMachine;
use crate::operation::{verify_kinds, Arguments, RLOperation, RLSpecialCaseOperation};

enum OpImpl {
    Typed(Box<dyn RLOperation>),
    Special(Box<dyn RLSpecialCaseOperation>),
}

struct OpcodeEntry {
    name: &'static str,
    imp: OpImpl,
}

/// A named group of opcode handlers.
pub struct RLModule {
    name: &'static str,
    module_type: u8,
    module_number: u8,
    operations: HashMap<u32, OpcodeEntry>,
}

impl RLModule {
    /// Builds an empty module.
    pub fn new(name: &'static str, module_type: u8, module_number: u8) -> Self {
        Self {
            name,
            module_type,
            module_number,
            operations: HashMap::new(),
        }
    }

    /// The module's display name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The module type half of the registry key.
    pub fn module_type(&self) -> u8 {
        self.module_type
    }

    /// The module number half of the registry key.
    pub fn module_number(&self) -> u8 {
        self.module_number
    }

    fn pack_opcode(opcode: u16, overload: u8) -> u32 {
        (u32::from(opcode) << 8) | u32::from(overload)
    }

    fn insert(&mut self, opcode: u16, overload: u8, entry: OpcodeEntry) {
        let previous = self
            .operations
            .insert(Self::pack_opcode(opcode, overload), entry);
        if let Some(previous) = previous {
            panic!(
                "duplicate registration of <{}:{:05}, {}>: `{}`",
                self.name, opcode, overload, previous.name
            );
        }
    }

    /// Registers a typed operation. Duplicate keys are a programmer
    /// error and panic.
    pub fn add_opcode(
        &mut self,
        opcode: u16,
        overload: u8,
        name: &'static str,
        operation: Box<dyn RLOperation>,
    ) {
        self.insert(
            opcode,
            overload,
            OpcodeEntry {
                name,
                imp: OpImpl::Typed(operation),
            },
        );
    }

    /// Registers a special-case operation that manages its own parameter
    /// handling and instruction pointer.
    pub fn add_special_case(
        &mut self,
        opcode: u16,
        overload: u8,
        name: &'static str,
        operation: Box<dyn RLSpecialCaseOperation>,
    ) {
        self.insert(
            opcode,
            overload,
            OpcodeEntry {
                name,
                imp: OpImpl::Special(operation),
            },
        );
    }

    pub(crate) fn dispatch(
        &self,
        machine: &mut RLMachine,
        command: &CommandElement,
    ) -> Result<()> {
        let key = Self::pack_opcode(command.opcode(), command.overload());
        let entry = self
            .operations
            .get(&key)
            .ok_or(MachineError::UndefinedOpcode {
                modtype: command.modtype(),
                module: command.module(),
                opcode: command.opcode(),
                overload: command.overload(),
            })?;

        match &entry.imp {
            OpImpl::Special(operation) => operation.call(machine, command),
            OpImpl::Typed(operation) => {
                let pieces = command.parsed_parameters()?;
                if !verify_kinds(operation.param_kinds(), pieces) {
                    return Err(MachineError::ParamTypeMismatch { name: entry.name });
                }
                let result = operation.call(machine, &Arguments::new(pieces));
                // The pointer moves regardless of the handler's outcome;
                // retrying a faulting element forever is worse than
                // skipping it.
                machine.advance_instruction_pointer();
                result
            }
        }
    }
}

/// Packs the machine-level registry key.
pub(crate) fn pack_module(module_type: u8, module_number: u8) -> u32 {
    (u32::from(module_type) << 8) | u32::from(module_number)
}
