//! The operation framework: parameter kinds, verification and typed
//! projection.
//!
//! Every opcode handler declares the kinds of parameters it consumes.
//! Dispatch verifies the decoded parameter pool against that declaration
//! exactly once, then hands the handler an [`Arguments`] view it projects
//! typed values out of. Matching is total: a handler runs only when every
//! piece verifies and every piece is consumed.

use reallive::intmemref::{is_string_location, IntMemRef, STORE_REGISTER_IN_BYTECODE};
use reallive::{CommandElement, ExpressionPiece, ExpressionValueType};

use crate::error::{MachineError, Result};
use crate::machine::RLMachine;
use crate::memory::Memory;
use crate::reference::{IntReference, StrReference};

/// One parameter kind in a handler's declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any integer-typed expression.
    IntConstant,
    /// A reference to integer memory (or the store register).
    IntReference,
    /// Any string-typed expression.
    StrConstant,
    /// A reference to string memory.
    StrReference,
    /// Zero or more parameters of the inner kind, to the end of the
    /// list. Only meaningful as the final kind.
    Argc(&'static ParamKind),
    /// A complex (tuple) parameter whose members match pointwise.
    Complex(&'static [ParamKind]),
    /// A special-tagged parameter; the tag selects which variant the
    /// members must match.
    Special(&'static [SpecialVariant]),
}

/// One admissible variant of a [`ParamKind::Special`] parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialVariant {
    /// The overload tag.
    pub tag: i32,
    /// Member kinds, matched pointwise.
    pub kinds: &'static [ParamKind],
}

fn verify_one(kind: &ParamKind, pieces: &[ExpressionPiece], pos: usize) -> bool {
    let Some(piece) = pieces.get(pos) else {
        return matches!(kind, ParamKind::Argc(_));
    };
    match kind {
        ParamKind::IntConstant => piece.value_type() == ExpressionValueType::Integer,
        ParamKind::IntReference => {
            piece.is_memory_reference() && piece.value_type() == ExpressionValueType::Integer
        }
        ParamKind::StrConstant => piece.value_type() == ExpressionValueType::String,
        ParamKind::StrReference => {
            piece.is_memory_reference() && piece.value_type() == ExpressionValueType::String
        }
        ParamKind::Argc(inner) => (pos..pieces.len()).all(|i| verify_one(inner, pieces, i)),
        ParamKind::Complex(kinds) => {
            piece.is_complex_parameter() && verify_pointwise(kinds, piece.contained_pieces())
        }
        ParamKind::Special(variants) => match piece.overload_tag() {
            Some(tag) => variants.iter().any(|variant| {
                variant.tag == tag && verify_pointwise(variant.kinds, piece.contained_pieces())
            }),
            None => false,
        },
    }
}

fn verify_pointwise(kinds: &[ParamKind], pieces: &[ExpressionPiece]) -> bool {
    kinds.len() == pieces.len()
        && kinds
            .iter()
            .enumerate()
            .all(|(i, kind)| verify_one(kind, pieces, i))
}

/// Checks a decoded parameter pool against a kind declaration.
pub fn verify_kinds(kinds: &[ParamKind], pieces: &[ExpressionPiece]) -> bool {
    let mut pos = 0usize;
    for kind in kinds {
        if !verify_one(kind, pieces, pos) {
            return false;
        }
        match kind {
            ParamKind::Argc(_) => pos = pieces.len(),
            _ => pos += 1,
        }
    }
    pos == pieces.len()
}

/// A verified parameter pool, projected into typed values by position.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    pieces: &'a [ExpressionPiece],
}

impl<'a> Arguments<'a> {
    /// Wraps a verified pool.
    pub fn new(pieces: &'a [ExpressionPiece]) -> Self {
        Self { pieces }
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    fn piece(&self, index: usize) -> Result<&'a ExpressionPiece> {
        self.pieces
            .get(index)
            .ok_or(MachineError::BadCast("parameter index out of range"))
    }

    /// The parameter as an integer.
    pub fn int(&self, memory: &mut Memory, index: usize) -> Result<i32> {
        Ok(self.piece(index)?.int_value(memory)?)
    }

    /// The parameter as a byte string.
    pub fn string(&self, memory: &mut Memory, index: usize) -> Result<Vec<u8>> {
        Ok(self.piece(index)?.string_value(memory)?.to_vec())
    }

    /// The parameter as an integer memory cursor.
    pub fn int_ref(&self, memory: &mut Memory, index: usize) -> Result<IntReference> {
        match self.piece(index)? {
            ExpressionPiece::StoreRegister => Ok(IntReference::StoreRegister),
            piece => {
                let (ty, location) = piece
                    .memory_reference()
                    .filter(|(ty, _)| !is_string_location(*ty))
                    .ok_or(MachineError::BadCast("expected an integer reference"))?;
                if ty == STORE_REGISTER_IN_BYTECODE {
                    return Ok(IntReference::StoreRegister);
                }
                let location = location.int_value(memory)?;
                Ok(IntReference::Memory(IntMemRef::from_bytecode(
                    ty, location,
                )?))
            }
        }
    }

    /// The parameter as a string memory cursor.
    pub fn str_ref(&self, memory: &mut Memory, index: usize) -> Result<StrReference> {
        let (ty, location) = self
            .piece(index)?
            .memory_reference()
            .filter(|(ty, _)| is_string_location(*ty))
            .ok_or(MachineError::BadCast("expected a string reference"))?;
        let location = location.int_value(memory)?;
        StrReference::new(ty, location).ok_or(MachineError::BadCast("expected a string reference"))
    }

    /// Every parameter from `start` on, as integers.
    pub fn ints_from(&self, memory: &mut Memory, start: usize) -> Result<Vec<i32>> {
        (start..self.len()).map(|i| self.int(memory, i)).collect()
    }

    /// Every parameter from `start` on, as integer cursors.
    pub fn int_refs_from(&self, memory: &mut Memory, start: usize) -> Result<Vec<IntReference>> {
        (start..self.len())
            .map(|i| self.int_ref(memory, i))
            .collect()
    }

    /// The members of a complex parameter, as a nested argument view.
    pub fn complex(&self, index: usize) -> Result<Arguments<'a>> {
        let piece = self.piece(index)?;
        if !piece.is_complex_parameter() {
            return Err(MachineError::BadCast("expected a complex parameter"));
        }
        Ok(Arguments::new(piece.contained_pieces()))
    }

    /// Every parameter from `start` on, as complex views.
    pub fn complexes_from(&self, start: usize) -> Result<Vec<Arguments<'a>>> {
        (start..self.len()).map(|i| self.complex(i)).collect()
    }

    /// Tag and members of a special parameter.
    pub fn special(&self, index: usize) -> Result<(i32, Arguments<'a>)> {
        let piece = self.piece(index)?;
        let tag = piece
            .overload_tag()
            .ok_or(MachineError::BadCast("expected a special parameter"))?;
        Ok((tag, Arguments::new(piece.contained_pieces())))
    }
}

/// A typed operation: dispatched with a verified argument pool, after
/// which the machine advances the instruction pointer.
pub trait RLOperation: Send + Sync {
    /// The kind tuple verified before dispatch.
    fn param_kinds(&self) -> &'static [ParamKind];

    /// Executes the operation.
    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()>;
}

/// A typed operation whose result lands in the store register.
pub trait RLStoreOperation: Send + Sync {
    /// The kind tuple verified before dispatch.
    fn param_kinds(&self) -> &'static [ParamKind];

    /// Executes the operation, producing the store-register value.
    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<i32>;
}

/// Adapter giving a store operation the plain operation interface.
pub struct Store<T>(pub T);

impl<T: RLStoreOperation> RLOperation for Store<T> {
    fn param_kinds(&self) -> &'static [ParamKind] {
        self.0.param_kinds()
    }

    fn call(&self, machine: &mut RLMachine, args: &Arguments<'_>) -> Result<()> {
        let value = self.0.call(machine, args)?;
        machine.set_store_register(value);
        Ok(())
    }
}

/// Complete control over dispatch: no parameter parsing, no type check,
/// and no implicit instruction-pointer advancement. Used by instructions
/// that manage the IP themselves, such as the goto family and select.
pub trait RLSpecialCaseOperation: Send + Sync {
    /// Executes against the raw command element.
    fn call(&self, machine: &mut RLMachine, command: &CommandElement) -> Result<()>;
}
