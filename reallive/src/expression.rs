//! The RealLive expression sub-language.
//!
//! Expressions appear in two places: as standalone expression elements and
//! as command parameters. Scanning and parsing are split the way the
//! reference disassembler splits them: the `next_*` family only measures a
//! construct's length in bytes (used while isolating elements), while the
//! `get_*` family builds an [`ExpressionPiece`] tree for evaluation.
//!
//! Evaluation runs against a [`MemoryServices`] implementation so that this
//! crate never needs to see the virtual machine itself.

use crate::bytes::{is_lead_byte, peek};
use crate::error::{Error, Result};
use crate::intmemref::{is_string_location, IntMemRef};

/// What a piece evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionValueType {
    /// An `i32`.
    Integer,
    /// A byte string.
    String,
}

/// The memory surface expressions evaluate against.
///
/// Implemented by the machine's memory block; expressions only ever touch
/// integer banks, string banks and the store register.
pub trait MemoryServices {
    /// Reads an integer memory cell.
    fn int_value(&self, r: IntMemRef) -> Result<i32>;
    /// Writes an integer memory cell.
    fn set_int_value(&mut self, r: IntMemRef, value: i32) -> Result<()>;
    /// Reads a string bank cell. `ty` is the bytecode bank byte.
    fn string_value(&self, ty: u8, location: i32) -> Result<&[u8]>;
    /// Writes a string bank cell.
    fn set_string_value(&mut self, ty: u8, location: i32, value: &[u8]) -> Result<()>;
    /// Reads the store register.
    fn store_register_value(&self) -> i32;
    /// Writes the store register.
    fn set_store_register(&mut self, value: i32);
}

// -----------------------------------------------------------------------
// Tokenization: length-only scanning, no tree building.
// -----------------------------------------------------------------------

fn tail(src: &[u8], n: usize) -> &[u8] {
    src.get(n..).unwrap_or(&[])
}

/// Length of a `$`-token: integer literal, store register or memory
/// reference.
pub fn next_token(src: &[u8]) -> usize {
    if peek(src, 0) != b'$' {
        return 0;
    }
    if peek(src, 1) == 0xff {
        return 6;
    }
    if peek(src, 2) != b'[' {
        return 2;
    }
    4 + next_expr(tail(src, 3))
}

/// Length of a term: parenthesised expression, `\`-wrapped term or token.
pub fn next_term(src: &[u8]) -> usize {
    if peek(src, 0) == b'(' {
        return 2 + next_expr(tail(src, 1));
    }
    if peek(src, 0) == b'\\' {
        return 2 + next_term(tail(src, 2));
    }
    next_token(src)
}

fn next_arith(src: &[u8]) -> usize {
    let lhs = next_term(src);
    if peek(src, lhs) == b'\\' {
        lhs + 2 + next_arith(tail(src, lhs + 2))
    } else {
        lhs
    }
}

fn next_cond(src: &[u8]) -> usize {
    let lhs = next_arith(src);
    if peek(src, lhs) == b'\\' && (0x28..=0x2d).contains(&peek(src, lhs + 1)) {
        lhs + 2 + next_arith(tail(src, lhs + 2))
    } else {
        lhs
    }
}

fn next_and(src: &[u8]) -> usize {
    let lhs = next_cond(src);
    if peek(src, lhs) == b'\\' && peek(src, lhs + 1) == 0x3c {
        lhs + 2 + next_and(tail(src, lhs + 2))
    } else {
        lhs
    }
}

/// Length of a full expression (boolean precedence level).
pub fn next_expr(src: &[u8]) -> usize {
    let lhs = next_and(src);
    if peek(src, lhs) == b'\\' && peek(src, lhs + 1) == 0x3d {
        lhs + 2 + next_expr(tail(src, lhs + 2))
    } else {
        lhs
    }
}

/// Length of a string constant in a parameter list, honouring quoting,
/// Shift-JIS lead bytes and `###PRINT(...)` splices.
pub fn next_string(src: &[u8]) -> usize {
    let mut quoted = false;
    let mut end = 0usize;

    loop {
        let c = peek(src, end);
        if quoted {
            quoted = c != b'"';
            if !quoted && peek(src, end.wrapping_sub(1)) != b'\\' {
                end += 1; // consume the final quote
                break;
            }
        } else {
            quoted = c == b'"';
            if tail(src, end).starts_with(b"###PRINT(") {
                end += 9;
                end += 1 + next_expr(tail(src, end));
                continue;
            }
            if !(is_lead_byte(c)
                || c.is_ascii_uppercase()
                || c.is_ascii_digit()
                || c == b' '
                || c == b'?'
                || c == b'_'
                || c == b'"')
            {
                break;
            }
        }
        if is_lead_byte(peek(src, end)) {
            end += 2;
        } else {
            end += 1;
        }
    }

    end
}

/// Length of one entry in a parameter list: string, complex/special group
/// or plain expression, with leading separators consumed.
pub fn next_data(src: &[u8]) -> usize {
    let c = peek(src, 0);
    if c == b',' {
        return 1 + next_data(tail(src, 1));
    }
    if c == b'\n' {
        return 3 + next_data(tail(src, 3));
    }
    if is_lead_byte(c)
        || c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || c == b' '
        || c == b'?'
        || c == b'_'
        || c == b'"'
        || src.starts_with(b"###PRINT(")
    {
        return next_string(src);
    }
    if c == b'a' || c == b'(' {
        let mut end = 0usize;
        if peek(src, end) == b'a' {
            end += 2;

            // Some special cases have multiple tags.
            if peek(src, end) == b'a' {
                end += 2;
            }

            if peek(src, end) != b'(' {
                end += next_data(tail(src, end));
                return end;
            }
            end += 1;
        } else {
            end += 1;
        }

        while peek(src, end) != b')' {
            let n = next_data(tail(src, end));
            if n == 0 {
                break;
            }
            end += n;
        }
        end += 1;
        if peek(src, end) == b'\\' {
            end += next_expr(tail(src, end));
        }
        end
    } else {
        next_expr(src)
    }
}

// -----------------------------------------------------------------------
// Parsing: recursive descent mirroring the tokenizer, producing pieces.
// -----------------------------------------------------------------------

fn first(src: &[u8]) -> u8 {
    peek(src, 0)
}

fn second(src: &[u8]) -> u8 {
    peek(src, 1)
}

fn advance(src: &mut &[u8], n: usize) {
    *src = src.get(n..).unwrap_or(&[]);
}

fn get_expr_token(src: &mut &[u8]) -> Result<ExpressionPiece> {
    match first(src) {
        0xff => {
            let value = crate::bytes::read_i32(src, 1)?;
            advance(src, 5);
            Ok(ExpressionPiece::IntConstant { value })
        }
        0xc8 => {
            advance(src, 1);
            Ok(ExpressionPiece::StoreRegister)
        }
        0 => Err(Error::UnexpectedEnd("expression token")),
        ty if second(src) == b'[' => {
            advance(src, 2);
            let location = get_expression(src)?;
            if first(src) != b']' {
                return Err(Error::UnexpectedByte {
                    found: first(src),
                    context: "expression token (`]` expected)",
                });
            }
            advance(src, 1);
            Ok(ExpressionPiece::MemoryReference {
                ty,
                location: Box::new(location),
            })
        }
        found => Err(Error::UnexpectedByte {
            found,
            context: "expression token",
        }),
    }
}

fn get_expr_term(src: &mut &[u8]) -> Result<ExpressionPiece> {
    if first(src) == b'$' {
        advance(src, 1);
        return get_expr_token(src);
    }
    if first(src) == b'\\' && second(src) == 0x00 {
        advance(src, 2);
        return get_expr_term(src);
    }
    if first(src) == b'\\' && second(src) == 0x01 {
        advance(src, 2);
        return Ok(ExpressionPiece::UnaryOperator {
            op: 0x01,
            operand: Box::new(get_expr_term(src)?),
        });
    }
    if first(src) == b'(' {
        advance(src, 1);
        let piece = get_expr_bool(src)?;
        if first(src) != b')' {
            return Err(Error::UnexpectedByte {
                found: first(src),
                context: "expression term (`)` expected)",
            });
        }
        advance(src, 1);
        return Ok(piece);
    }
    if first(src) == 0 {
        return Err(Error::UnexpectedEnd("expression term"));
    }
    Err(Error::UnexpectedByte {
        found: first(src),
        context: "expression term",
    })
}

fn get_expr_arith_loop_hi_prec(src: &mut &[u8], tok: ExpressionPiece) -> Result<ExpressionPiece> {
    if first(src) == b'\\' && (0x02..=0x09).contains(&second(src)) {
        let op = second(src);
        advance(src, 2);
        let piece = ExpressionPiece::BinaryOperator {
            op,
            lhs: Box::new(tok),
            rhs: Box::new(get_expr_term(src)?),
        };
        get_expr_arith_loop_hi_prec(src, piece)
    } else {
        Ok(tok)
    }
}

fn get_expr_arith_loop(src: &mut &[u8], tok: ExpressionPiece) -> Result<ExpressionPiece> {
    if first(src) == b'\\' && (second(src) == 0x00 || second(src) == 0x01) {
        let op = second(src);
        advance(src, 2);
        let term = get_expr_term(src)?;
        let rhs = get_expr_arith_loop_hi_prec(src, term)?;
        let piece = ExpressionPiece::BinaryOperator {
            op,
            lhs: Box::new(tok),
            rhs: Box::new(rhs),
        };
        get_expr_arith_loop(src, piece)
    } else {
        Ok(tok)
    }
}

fn get_expr_arith(src: &mut &[u8]) -> Result<ExpressionPiece> {
    let term = get_expr_term(src)?;
    let hi = get_expr_arith_loop_hi_prec(src, term)?;
    get_expr_arith_loop(src, hi)
}

fn get_expr_cond_loop(src: &mut &[u8], tok: ExpressionPiece) -> Result<ExpressionPiece> {
    if first(src) == b'\\' && (0x28..=0x2d).contains(&second(src)) {
        let op = second(src);
        advance(src, 2);
        let rhs = get_expr_arith(src)?;
        let piece = ExpressionPiece::BinaryOperator {
            op,
            lhs: Box::new(tok),
            rhs: Box::new(rhs),
        };
        get_expr_cond_loop(src, piece)
    } else {
        Ok(tok)
    }
}

fn get_expr_cond(src: &mut &[u8]) -> Result<ExpressionPiece> {
    let arith = get_expr_arith(src)?;
    get_expr_cond_loop(src, arith)
}

fn get_expr_bool_loop_and(src: &mut &[u8], tok: ExpressionPiece) -> Result<ExpressionPiece> {
    if first(src) == b'\\' && second(src) == 0x3c {
        advance(src, 2);
        let rhs = get_expr_cond(src)?;
        let piece = ExpressionPiece::BinaryOperator {
            op: 0x3c,
            lhs: Box::new(tok),
            rhs: Box::new(rhs),
        };
        get_expr_bool_loop_and(src, piece)
    } else {
        Ok(tok)
    }
}

fn get_expr_bool_loop_or(src: &mut &[u8], tok: ExpressionPiece) -> Result<ExpressionPiece> {
    if first(src) == b'\\' && second(src) == 0x3d {
        advance(src, 2);
        let inner = get_expr_cond(src)?;
        let rhs = get_expr_bool_loop_and(src, inner)?;
        let piece = ExpressionPiece::BinaryOperator {
            op: 0x3d,
            lhs: Box::new(tok),
            rhs: Box::new(rhs),
        };
        get_expr_bool_loop_or(src, piece)
    } else {
        Ok(tok)
    }
}

fn get_expr_bool(src: &mut &[u8]) -> Result<ExpressionPiece> {
    let cond = get_expr_cond(src)?;
    let and = get_expr_bool_loop_and(src, cond)?;
    get_expr_bool_loop_or(src, and)
}

/// Parses a full expression (no assignment at the top level).
pub fn get_expression(src: &mut &[u8]) -> Result<ExpressionPiece> {
    get_expr_bool(src)
}

/// Parses an expression of the form `lvalue <op>= expression`.
pub fn get_assignment(src: &mut &[u8]) -> Result<ExpressionPiece> {
    let lhs = get_expr_term(src)?;
    let op = second(src);
    advance(src, 2);
    let rhs = get_expression(src)?;
    if (0x14..=0x24).contains(&op) {
        Ok(ExpressionPiece::Assignment {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    } else {
        Err(Error::InvalidOperator(op))
    }
}

fn get_string(src: &mut &[u8]) -> Result<ExpressionPiece> {
    let length = next_string(src);
    let value = if first(src) == b'"' {
        src.get(1..length.saturating_sub(1))
            .ok_or(Error::UnexpectedEnd("string constant"))?
            .to_vec()
    } else {
        src.get(..length)
            .ok_or(Error::UnexpectedEnd("string constant"))?
            .to_vec()
    };
    advance(src, length);
    Ok(ExpressionPiece::StringConstant { value })
}

/// Parses one entry of a parameter list. This is the only production that
/// can produce strings, complex groups and special-tagged groups.
pub fn get_data(src: &mut &[u8]) -> Result<ExpressionPiece> {
    let c = first(src);
    if c == b',' {
        advance(src, 1);
        return get_data(src);
    }
    if c == b'\n' {
        advance(src, 3);
        return get_data(src);
    }
    if is_lead_byte(c)
        || c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || c == b' '
        || c == b'?'
        || c == b'_'
        || c == b'"'
        || src.starts_with(b"###PRINT(")
    {
        return get_string(src);
    }
    if c == b'a' {
        advance(src, 1);
        let mut tag = i32::from(first(src));
        advance(src, 1);

        // Some special cases have multiple tags.
        if first(src) == b'a' {
            advance(src, 1);
            let second_tag = i32::from(first(src));
            advance(src, 1);
            tag = (second_tag << 16) | tag;
        }

        let mut pieces = Vec::new();
        if first(src) != b'(' {
            // A single datum in this special expression.
            pieces.push(get_data(src)?);
            return Ok(ExpressionPiece::Special { tag, pieces });
        }
        advance(src, 1);

        while first(src) != b')' {
            if src.is_empty() {
                return Err(Error::UnexpectedEnd("special parameter"));
            }
            pieces.push(get_data(src)?);
        }
        advance(src, 1);
        return Ok(ExpressionPiece::Special { tag, pieces });
    }
    get_expression(src)
}

/// Parses one entry of a complex parameter's interior.
pub fn get_complex_param(src: &mut &[u8]) -> Result<ExpressionPiece> {
    if first(src) == b',' {
        advance(src, 1);
        return get_data(src);
    }
    if first(src) == b'(' {
        advance(src, 1);
        let mut pieces = Vec::new();
        while first(src) != b')' {
            if src.is_empty() {
                return Err(Error::UnexpectedEnd("complex parameter"));
            }
            pieces.push(get_data(src)?);
        }
        advance(src, 1);
        return Ok(ExpressionPiece::Complex { pieces });
    }
    get_expression(src)
}

/// Resolves a `###PRINT(expression)` splice to the expression's string
/// value; anything else passes through untouched.
pub fn evaluate_print(mem: &mut dyn MemoryServices, input: &[u8]) -> Result<Vec<u8>> {
    if let Some(rest) = input.strip_prefix(b"###PRINT(") {
        let mut cursor = rest;
        let piece = get_expression(&mut cursor)?;
        if first(&cursor) != b')' {
            return Err(Error::UnexpectedByte {
                found: first(&cursor),
                context: "###PRINT (`)` expected)",
            });
        }
        Ok(piece.string_value(mem)?.to_vec())
    } else {
        Ok(input.to_vec())
    }
}

// -----------------------------------------------------------------------
// Pieces
// -----------------------------------------------------------------------

/// One node of a parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionPiece {
    /// A literal `i32`.
    IntConstant {
        /// The literal value.
        value: i32,
    },
    /// A literal byte string.
    StringConstant {
        /// Raw bytes, quotes stripped.
        value: Vec<u8>,
    },
    /// The machine's store register.
    StoreRegister,
    /// A reference into integer or string memory. `ty` is the raw bank
    /// byte; the location is itself an expression.
    MemoryReference {
        /// Raw bytecode bank byte.
        ty: u8,
        /// Index expression.
        location: Box<ExpressionPiece>,
    },
    /// A unary operator application.
    UnaryOperator {
        /// Operator byte (only 0x01, negation, is defined).
        op: u8,
        /// Operand.
        operand: Box<ExpressionPiece>,
    },
    /// A binary operator application.
    BinaryOperator {
        /// Operator byte, see the operator table.
        op: u8,
        /// Left operand.
        lhs: Box<ExpressionPiece>,
        /// Right operand.
        rhs: Box<ExpressionPiece>,
    },
    /// An assignment; evaluating stores into `lhs` and yields the stored
    /// value.
    Assignment {
        /// 0x1e for plain assignment, 0x14..=0x1d for compound forms.
        op: u8,
        /// The lvalue.
        lhs: Box<ExpressionPiece>,
        /// The rvalue.
        rhs: Box<ExpressionPiece>,
    },
    /// A parenthesised tuple in a parameter list.
    Complex {
        /// Member pieces in order.
        pieces: Vec<ExpressionPiece>,
    },
    /// A tagged union in a parameter list; the tag selects the overload.
    Special {
        /// Overload tag. Double-tagged specials pack the second tag into
        /// the high 16 bits.
        tag: i32,
        /// Member pieces in order.
        pieces: Vec<ExpressionPiece>,
    },
}

/// Integer semantics of the operator table. Division and modulo by zero
/// yield the left operand unchanged.
pub fn perform_binary_operation(op: u8, lhs: i32, rhs: i32) -> Result<i32> {
    Ok(match op {
        0x00 | 0x14 => lhs.wrapping_add(rhs),
        0x01 | 0x15 => lhs.wrapping_sub(rhs),
        0x02 | 0x16 => lhs.wrapping_mul(rhs),
        0x03 | 0x17 => {
            if rhs != 0 {
                lhs.wrapping_div(rhs)
            } else {
                lhs
            }
        }
        0x04 | 0x18 => {
            if rhs != 0 {
                lhs.wrapping_rem(rhs)
            } else {
                lhs
            }
        }
        0x05 | 0x19 => lhs & rhs,
        0x06 | 0x1a => lhs | rhs,
        0x07 | 0x1b => lhs ^ rhs,
        0x08 | 0x1c => lhs.wrapping_shl(rhs as u32),
        0x09 | 0x1d => lhs.wrapping_shr(rhs as u32),
        0x28 => (lhs == rhs) as i32,
        0x29 => (lhs != rhs) as i32,
        0x2a => (lhs <= rhs) as i32,
        0x2b => (lhs < rhs) as i32,
        0x2c => (lhs >= rhs) as i32,
        0x2d => (lhs > rhs) as i32,
        0x3c => (lhs != 0 && rhs != 0) as i32,
        0x3d => (lhs != 0 || rhs != 0) as i32,
        other => return Err(Error::InvalidOperator(other)),
    })
}

impl ExpressionPiece {
    /// Whether the piece evaluates to an integer or a string.
    pub fn value_type(&self) -> ExpressionValueType {
        match self {
            Self::StringConstant { .. } => ExpressionValueType::String,
            Self::MemoryReference { ty, .. } if is_string_location(*ty) => {
                ExpressionValueType::String
            }
            _ => ExpressionValueType::Integer,
        }
    }

    /// Whether the piece denotes a memory location (including the store
    /// register).
    pub fn is_memory_reference(&self) -> bool {
        matches!(self, Self::MemoryReference { .. } | Self::StoreRegister)
    }

    /// Whether the piece is a complex (tuple) parameter.
    pub fn is_complex_parameter(&self) -> bool {
        matches!(self, Self::Complex { .. })
    }

    /// Whether the piece is a special (tagged) parameter.
    pub fn is_special_parameter(&self) -> bool {
        matches!(self, Self::Special { .. })
    }

    /// Member pieces of a complex or special parameter; empty otherwise.
    pub fn contained_pieces(&self) -> &[ExpressionPiece] {
        match self {
            Self::Complex { pieces } | Self::Special { pieces, .. } => pieces,
            _ => &[],
        }
    }

    /// Overload tag of a special parameter.
    pub fn overload_tag(&self) -> Option<i32> {
        match self {
            Self::Special { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// Evaluates the piece as an integer.
    pub fn int_value(&self, mem: &mut dyn MemoryServices) -> Result<i32> {
        match self {
            Self::IntConstant { value } => Ok(*value),
            Self::StoreRegister => Ok(mem.store_register_value()),
            Self::MemoryReference { ty, location } => {
                if is_string_location(*ty) {
                    return Err(Error::TypeError(
                        "integer value requested from a string reference",
                    ));
                }
                let location = location.int_value(mem)?;
                mem.int_value(IntMemRef::from_bytecode(*ty, location)?)
            }
            Self::UnaryOperator { op, operand } => {
                let value = operand.int_value(mem)?;
                Ok(match op {
                    0x01 => value.wrapping_neg(),
                    _ => value,
                })
            }
            Self::BinaryOperator { op, lhs, rhs } => {
                let l = lhs.int_value(mem)?;
                let r = rhs.int_value(mem)?;
                perform_binary_operation(*op, l, r)
            }
            Self::Assignment { op, lhs, rhs } => {
                let value = if *op == 0x1e {
                    rhs.int_value(mem)?
                } else {
                    let l = lhs.int_value(mem)?;
                    let r = rhs.int_value(mem)?;
                    perform_binary_operation(*op, l, r)?
                };
                lhs.assign_int_value(mem, value)?;
                Ok(value)
            }
            Self::StringConstant { .. } | Self::Complex { .. } | Self::Special { .. } => Err(
                Error::TypeError("integer value requested from a non-integer piece"),
            ),
        }
    }

    /// Evaluates the piece as a byte string.
    pub fn string_value<'a>(&'a self, mem: &'a mut dyn MemoryServices) -> Result<&'a [u8]> {
        match self {
            Self::StringConstant { value } => Ok(value),
            Self::MemoryReference { ty, location } if is_string_location(*ty) => {
                let location = location.int_value(mem)?;
                mem.string_value(*ty, location)
            }
            _ => Err(Error::TypeError(
                "string value requested from a non-string piece",
            )),
        }
    }

    /// Writes an integer through the piece if it denotes a location;
    /// non-lvalues ignore the write.
    pub fn assign_int_value(&self, mem: &mut dyn MemoryServices, value: i32) -> Result<()> {
        match self {
            Self::StoreRegister => {
                mem.set_store_register(value);
                Ok(())
            }
            Self::MemoryReference { ty, location } if !is_string_location(*ty) => {
                let location = location.int_value(mem)?;
                mem.set_int_value(IntMemRef::from_bytecode(*ty, location)?, value)
            }
            _ => Ok(()),
        }
    }

    /// Writes a string through the piece if it denotes a string location;
    /// non-lvalues ignore the write.
    pub fn assign_string_value(&self, mem: &mut dyn MemoryServices, value: &[u8]) -> Result<()> {
        match self {
            Self::MemoryReference { ty, location } if is_string_location(*ty) => {
                let location = location.int_value(mem)?;
                mem.set_string_value(*ty, location, value)
            }
            _ => Ok(()),
        }
    }

    /// Raw bank byte and location expression of a memory reference.
    pub fn memory_reference(&self) -> Option<(u8, &ExpressionPiece)> {
        match self {
            Self::MemoryReference { ty, location } => Some((*ty, location)),
            _ => None,
        }
    }

    /// A source-like rendering for diagnostics.
    pub fn debug_string(&self) -> String {
        use crate::intmemref::{
            int_bank_name, INTL_LOCATION_IN_BYTECODE, INTZ_LOCATION_IN_BYTECODE, STRK_LOCATION,
            STRM_LOCATION, STRS_LOCATION,
        };
        match self {
            Self::IntConstant { value } => value.to_string(),
            Self::StringConstant { value } => {
                format!("\"{}\"", String::from_utf8_lossy(value))
            }
            Self::StoreRegister => "<store>".to_string(),
            Self::MemoryReference { ty, location } => {
                let bank = match *ty {
                    STRS_LOCATION => "strS".to_string(),
                    STRK_LOCATION => "strK".to_string(),
                    STRM_LOCATION => "strM".to_string(),
                    INTZ_LOCATION_IN_BYTECODE => "intZ".to_string(),
                    INTL_LOCATION_IN_BYTECODE => "intL".to_string(),
                    t => format!("int{}", int_bank_name(t % 26)),
                };
                format!("{bank}[{}]", location.debug_string())
            }
            Self::UnaryOperator { operand, .. } => format!("-{}", operand.debug_string()),
            Self::BinaryOperator { op, lhs, rhs } | Self::Assignment { op, lhs, rhs } => {
                let name = match op {
                    0x00 | 0x14 => "+",
                    0x01 | 0x15 => "-",
                    0x02 | 0x16 => "*",
                    0x03 | 0x17 => "/",
                    0x04 | 0x18 => "%",
                    0x05 | 0x19 => "&",
                    0x06 | 0x1a => "|",
                    0x07 | 0x1b => "^",
                    0x08 | 0x1c => "<<",
                    0x09 | 0x1d => ">>",
                    0x1e => "=",
                    0x28 => "==",
                    0x29 => "!=",
                    0x2a => "<=",
                    0x2b => "<",
                    0x2c => ">=",
                    0x2d => ">",
                    0x3c => "&&",
                    0x3d => "||",
                    _ => "?",
                };
                if matches!(self, Self::Assignment { .. }) && *op != 0x1e {
                    format!("{} {name}= {}", lhs.debug_string(), rhs.debug_string())
                } else {
                    format!("{} {name} {}", lhs.debug_string(), rhs.debug_string())
                }
            }
            Self::Complex { pieces } => {
                let inner: Vec<_> = pieces.iter().map(|p| p.debug_string()).collect();
                format!("({})", inner.join(", "))
            }
            Self::Special { tag, pieces } => {
                let inner: Vec<_> = pieces.iter().map(|p| p.debug_string()).collect();
                format!("{tag}:{{{}}}", inner.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{int_constant, int_reference, op};
    use test_case::test_case;

    /// A small stand-in memory for evaluation tests: one word-view bank per
    /// canonical index and the S string bank.
    #[derive(Default)]
    struct TestMemory {
        ints: std::collections::HashMap<(u8, i32), i32>,
        strings: std::collections::HashMap<(u8, i32), Vec<u8>>,
        store: i32,
    }

    impl MemoryServices for TestMemory {
        fn int_value(&self, r: IntMemRef) -> Result<i32> {
            Ok(*self.ints.get(&(r.bank(), r.location())).unwrap_or(&0))
        }

        fn set_int_value(&mut self, r: IntMemRef, value: i32) -> Result<()> {
            self.ints.insert((r.bank(), r.location()), value);
            Ok(())
        }

        fn string_value(&self, ty: u8, location: i32) -> Result<&[u8]> {
            Ok(self
                .strings
                .get(&(ty, location))
                .map(|v| v.as_slice())
                .unwrap_or(b""))
        }

        fn set_string_value(&mut self, ty: u8, location: i32, value: &[u8]) -> Result<()> {
            self.strings.insert((ty, location), value.to_vec());
            Ok(())
        }

        fn store_register_value(&self) -> i32 {
            self.store
        }

        fn set_store_register(&mut self, value: i32) {
            self.store = value;
        }
    }

    fn eval(bytes: &[u8]) -> i32 {
        let mut mem = TestMemory::default();
        let mut cursor = bytes;
        get_expression(&mut cursor)
            .unwrap()
            .int_value(&mut mem)
            .unwrap()
    }

    #[test]
    fn addition_of_constants() {
        // $ FF 05 00 00 00 \ 00 $ FF 03 00 00 00  =>  5 + 3
        let mut bytes = int_constant(5);
        bytes.extend(op(0x00));
        bytes.extend(int_constant(3));
        assert_eq!(eval(&bytes), 8);
    }

    #[quickcheck_macros::quickcheck]
    fn division_and_modulo_by_zero_are_identities(a: i32) -> bool {
        perform_binary_operation(0x03, a, 0).unwrap() == a
            && perform_binary_operation(0x04, a, 0).unwrap() == a
    }

    #[test]
    fn divide_by_zero_yields_left_operand() {
        let mut bytes = int_constant(7);
        bytes.extend(op(0x03));
        bytes.extend(int_constant(0));
        assert_eq!(eval(&bytes), 7);

        let mut bytes = int_constant(7);
        bytes.extend(op(0x04));
        bytes.extend(int_constant(0));
        assert_eq!(eval(&bytes), 7);
    }

    #[test_case(0x00, 10, 3 => 13; "add")]
    #[test_case(0x01, 10, 3 => 7; "sub")]
    #[test_case(0x02, 10, 3 => 30; "mul")]
    #[test_case(0x03, 10, 3 => 3; "div")]
    #[test_case(0x04, 10, 3 => 1; "modulo")]
    #[test_case(0x05, 0b1100, 0b1010 => 0b1000; "bitand")]
    #[test_case(0x06, 0b1100, 0b1010 => 0b1110; "bitor")]
    #[test_case(0x07, 0b1100, 0b1010 => 0b0110; "bitxor")]
    #[test_case(0x08, 1, 4 => 16; "shl")]
    #[test_case(0x09, -16, 2 => -4; "shr is arithmetic")]
    #[test_case(0x28, 4, 4 => 1; "eq")]
    #[test_case(0x29, 4, 4 => 0; "ne")]
    #[test_case(0x2a, 3, 4 => 1; "le")]
    #[test_case(0x2b, 4, 4 => 0; "lt")]
    #[test_case(0x2c, 4, 4 => 1; "ge")]
    #[test_case(0x2d, 4, 4 => 0; "gt")]
    #[test_case(0x3c, 2, 3 => 1; "logical and")]
    #[test_case(0x3d, 0, 3 => 1; "logical or")]
    fn operator_table(opcode: u8, lhs: i32, rhs: i32) -> i32 {
        perform_binary_operation(opcode, lhs, rhs).unwrap()
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        // 2 + 3 * 4 == 14
        let mut bytes = int_constant(2);
        bytes.extend(op(0x00));
        bytes.extend(int_constant(3));
        bytes.extend(op(0x02));
        bytes.extend(int_constant(4));
        assert_eq!(eval(&bytes), 14);
    }

    #[test]
    fn parenthesised_term_overrides_precedence() {
        // (2 + 3) * 4 == 20
        let mut bytes = vec![b'('];
        bytes.extend(int_constant(2));
        bytes.extend(op(0x00));
        bytes.extend(int_constant(3));
        bytes.push(b')');
        bytes.extend(op(0x02));
        bytes.extend(int_constant(4));
        assert_eq!(eval(&bytes), 20);
    }

    #[test]
    fn unary_minus() {
        let mut bytes = vec![b'\\', 0x01];
        bytes.extend(int_constant(9));
        assert_eq!(eval(&bytes), -9);
    }

    #[test]
    fn assignment_returns_value_and_stores() {
        // intA[2] = 41
        let mut bytes = int_reference(0, 2);
        bytes.extend([b'\\', 0x1e]);
        bytes.extend(int_constant(41));

        let mut mem = TestMemory::default();
        let mut cursor = &bytes[..];
        let piece = get_assignment(&mut cursor).unwrap();
        assert_eq!(piece.int_value(&mut mem).unwrap(), 41);
        assert_eq!(*mem.ints.get(&(0, 2)).unwrap(), 41);
    }

    #[test]
    fn compound_assignment_combines_with_current_value() {
        // intA[0] += 5 with intA[0] == 37
        let mut mem = TestMemory::default();
        mem.ints.insert((0, 0), 37);

        let mut bytes = int_reference(0, 0);
        bytes.extend([b'\\', 0x14]);
        bytes.extend(int_constant(5));

        let mut cursor = &bytes[..];
        let piece = get_assignment(&mut cursor).unwrap();
        assert_eq!(piece.int_value(&mut mem).unwrap(), 42);
        assert_eq!(*mem.ints.get(&(0, 0)).unwrap(), 42);
    }

    #[test]
    fn store_register_reads_and_writes() {
        let mut mem = TestMemory::default();
        mem.store = 17;

        let mut bytes = vec![b'$', 0xc8];
        bytes.extend([b'\\', 0x14]);
        bytes.extend(int_constant(3));

        let mut cursor = &bytes[..];
        let piece = get_assignment(&mut cursor).unwrap();
        assert_eq!(piece.int_value(&mut mem).unwrap(), 20);
        assert_eq!(mem.store, 20);
    }

    #[test]
    fn memory_reference_reads_through_alias() {
        // intZ[3] spelled with the bytecode alias 25.
        let mut mem = TestMemory::default();
        mem.ints.insert((7, 3), 99);
        let bytes = int_reference(25, 3);
        let mut cursor = &bytes[..];
        let piece = get_expression(&mut cursor).unwrap();
        assert_eq!(piece.int_value(&mut mem).unwrap(), 99);
    }

    #[test]
    fn tokenizer_lengths() {
        assert_eq!(next_token(&int_constant(5)), 6);
        assert_eq!(next_token(&[b'$', 0xc8]), 2);
        let r = int_reference(0, 2);
        assert_eq!(next_token(&r), r.len());

        let mut expr = int_constant(5);
        expr.extend(op(0x00));
        expr.extend(int_constant(3));
        assert_eq!(next_expr(&expr), expr.len());
    }

    #[test]
    fn next_string_measures_quoted_and_bare() {
        assert_eq!(next_string(b"\"AB C\"$rest"), 6);
        assert_eq!(next_string(b"AB12)"), 4);
    }

    #[test]
    fn string_constant_strips_quotes() {
        let mut cursor = &b"\"HELLO\""[..];
        let piece = get_data(&mut cursor).unwrap();
        let mut mem = TestMemory::default();
        assert_eq!(piece.string_value(&mut mem).unwrap(), b"HELLO");
    }

    #[test]
    fn complex_parameter_parses_members() {
        // (intA[0] 5)
        let mut bytes = vec![b'('];
        bytes.extend(int_reference(0, 0));
        bytes.extend(int_constant(5));
        bytes.push(b')');
        let mut cursor = &bytes[..];
        let piece = get_complex_param(&mut cursor).unwrap();
        assert!(piece.is_complex_parameter());
        assert_eq!(piece.contained_pieces().len(), 2);
    }

    #[test]
    fn special_parameter_carries_tag() {
        let mut bytes = vec![b'a', 0x02, b'('];
        bytes.extend(int_constant(1));
        bytes.extend(int_constant(2));
        bytes.push(b')');
        let mut cursor = &bytes[..];
        let piece = get_data(&mut cursor).unwrap();
        assert_eq!(piece.overload_tag(), Some(2));
        assert_eq!(piece.contained_pieces().len(), 2);
    }

    #[test]
    fn double_tagged_special_packs_both_tags() {
        let mut bytes = vec![b'a', 0x02, b'a', 0x03];
        bytes.extend(int_constant(1));
        let mut cursor = &bytes[..];
        let piece = get_data(&mut cursor).unwrap();
        assert_eq!(piece.overload_tag(), Some((3 << 16) | 2));
    }

    #[test]
    fn evaluate_print_resolves_splices() {
        let mut mem = TestMemory::default();
        mem.strings.insert((0x12, 0), b"NAME".to_vec());

        let mut input = b"###PRINT(".to_vec();
        input.extend(crate::testing::str_reference(0x12, 0));
        input.push(b')');
        assert_eq!(evaluate_print(&mut mem, &input).unwrap(), b"NAME");
        assert_eq!(evaluate_print(&mut mem, b"plain").unwrap(), b"plain");
    }
}
