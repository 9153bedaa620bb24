//! Runtime error variants.

use thiserror::Error;

/// Errors raised while executing bytecode.
#[derive(Debug, Error)]
pub enum MachineError {
    /// A command addressed a `(module type, module)` pair nothing is
    /// registered under.
    #[error("undefined module <{modtype}:{module:03}>")]
    UndefinedModule {
        /// Module type from the command header.
        modtype: u8,
        /// Module number from the command header.
        module: u8,
    },
    /// A known module has no handler for the opcode/overload pair.
    #[error("undefined opcode <{modtype}:{module:03}:{opcode:05}, {overload}>")]
    UndefinedOpcode {
        /// Module type from the command header.
        modtype: u8,
        /// Module number from the command header.
        module: u8,
        /// Opcode.
        opcode: u16,
        /// Overload selector.
        overload: u8,
    },
    /// Decoded parameters do not verify against the handler's declared
    /// kinds.
    #[error("parameter type mismatch dispatching `{name}`")]
    ParamTypeMismatch {
        /// Registered handler name.
        name: &'static str,
    },
    /// A parameter projection was applied to the wrong piece shape.
    #[error("bad cast: {0}")]
    BadCast(&'static str),
    /// A return did not match the kind of frame on top of the stack.
    #[error("call stack type mismatch in {operation}")]
    StackMismatch {
        /// The return primitive that faulted.
        operation: &'static str,
    },
    /// The call stack has no frames.
    #[error("the call stack is empty")]
    EmptyStack,
    /// Error bubbled up from scenario data.
    #[error(transparent)]
    Scenario(#[from] reallive::Error),
}

/// Result alias defaulting to [`MachineError`].
pub type Result<T, E = MachineError> = core::result::Result<T, E>;
