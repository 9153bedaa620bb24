//! The RealLive virtual machine.
//!
//! [`RLMachine`] drives the bytecode parsed by the `reallive` crate: it
//! owns the integer and string memory banks, the typed call stack, the
//! module registry and the cooperative long-operation stack. The host
//! calls [`RLMachine::step`] once per main-loop iteration; handlers that
//! need multiple ticks install a [`LongOperation`] and return.
//!
//! Opcode implementations group into [`RLModule`]s registered under a
//! `(module type, module number)` pair; within a module, handlers declare
//! their parameter kinds and are dispatched only when the decoded
//! parameters verify against them.

#![warn(missing_docs)]

pub mod error;
pub mod long_operation;
pub mod machine;
pub mod memory;
pub mod module;
pub mod modules;
pub mod operation;
pub mod reference;
pub mod stack_frame;
pub mod system;

pub use error::{MachineError, Result};
pub use long_operation::{LongOperation, SelectLongOperation, TickResult, WaitLongOperation};
pub use machine::{MachineFlags, RLMachine};
pub use memory::Memory;
pub use module::RLModule;
pub use operation::{
    Arguments, ParamKind, RLOperation, RLSpecialCaseOperation, RLStoreOperation, SpecialVariant,
    Store,
};
pub use reference::{IntReference, StrReference};
pub use stack_frame::{FrameKind, StackFrame};
pub use system::{EventSystem, MouseButton, NullEventSystem, NullTextSystem, TextSystem};
