//! Built-in opcode modules.

mod jmp;
mod mem;
mod sel;
mod str;
mod sys;

pub use jmp::create_jmp_module;
pub use mem::create_mem_module;
pub use sel::create_sel_module;
pub use str::create_str_module;
pub use sys::create_sys_module;

use crate::machine::RLMachine;

/// Attaches every built-in module to a machine.
pub fn add_all_modules(machine: &mut RLMachine) {
    machine.attach_module(create_jmp_module());
    machine.attach_module(create_mem_module());
    machine.attach_module(create_sel_module());
    machine.attach_module(create_str_module());
    machine.attach_module(create_sys_module());
}
