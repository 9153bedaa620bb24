//! Option-menu commands (module 0:002).
//!
//! Select parses as its own element shape, so every opcode here is a
//! special case: the handler decodes the option texts, installs a
//! [`SelectLongOperation`] and advances past the command; the chosen
//! index arrives in the store register when the host decides.

use reallive::{CommandElement, CommandVariant};

use crate::error::{MachineError, Result};
use crate::long_operation::SelectLongOperation;
use crate::machine::RLMachine;
use crate::module::RLModule;
use crate::operation::RLSpecialCaseOperation;

struct Select;

impl RLSpecialCaseOperation for Select {
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()> {
        match command.variant() {
            CommandVariant::Select(select) => {
                let options: Vec<_> = (0..select.params.len())
                    .map(|i| select.text(i))
                    .collect();
                machine.advance_instruction_pointer();
                machine.push_long_operation(Box::new(SelectLongOperation::new(options)));
                Ok(())
            }
            _ => Err(MachineError::BadCast("select")),
        }
    }
}

/// Builds the Sel module.
pub fn create_sel_module() -> RLModule {
    let mut module = RLModule::new("Sel", 0, 2);
    module.add_special_case(0, 0, "select_w", Box::new(Select));
    module.add_special_case(1, 0, "select", Box::new(Select));
    module.add_special_case(2, 0, "select_s2", Box::new(Select));
    module.add_special_case(3, 0, "select_s", Box::new(Select));
    module.add_special_case(16, 0, "select_cancel", Box::new(Select));
    module
}
