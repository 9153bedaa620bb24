//! The bytecode element stream.
//!
//! A scenario's decompressed payload is a flat sequence of elements:
//! separators, metadata markers, display text, expressions and commands.
//! The reference implementation models these as a class hierarchy; here
//! they collapse into the [`BytecodeElement`] tagged union, with jump
//! targets resolved once into [`ElementHandle`] indices into the owning
//! script's element arena.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::bytes::{is_lead_byte, peek, read_u16, read_u32};
use crate::error::{Error, Result};
use crate::expression::{self, ExpressionPiece};

/// Size of the raw command header: `# type module opcode:u16 argc:u16
/// overload`.
pub const COMMAND_SIZE: usize = 8;

/// A stable index into a script's element arena. Valid for the scenario's
/// lifetime; elements never move after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(u32);

impl ElementHandle {
    pub(crate) const UNRESOLVED: ElementHandle = ElementHandle(u32::MAX);

    /// Wraps a raw element index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The element index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The handle one element further on.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Parser state threaded through element construction.
pub(crate) struct ConstructionData {
    pub(crate) kidoku_table: Vec<u32>,
    pub(crate) offsets: HashMap<u32, ElementHandle>,
    /// `'@'` until the first `'!'` marker is seen, then `'!'` for the rest
    /// of the parse.
    entrypoint_marker: u8,
}

impl ConstructionData {
    pub(crate) fn new(kidoku_table: Vec<u32>) -> Self {
        Self {
            kidoku_table,
            offsets: HashMap::new(),
            entrypoint_marker: b'@',
        }
    }
}

/// Broad element classification, mostly for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ElementKind {
    /// Separator.
    Comma,
    /// Line-number marker.
    Line,
    /// Kidoku marker.
    Kidoku,
    /// Entry point marker.
    Entrypoint,
    /// Display text.
    Textout,
    /// Standalone expression.
    Expression,
    /// Plain function command.
    Function,
    /// Goto-family command (including conditional and gosub-with forms).
    Goto,
    /// Computed goto.
    GotoOn,
    /// Case dispatch.
    GotoCase,
    /// Option menu.
    Select,
}

/// A jump destination: the byte offset encoded in the bytecode and the
/// element handle it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    offset: u32,
    handle: ElementHandle,
}

impl Target {
    fn pending(offset: u32) -> Self {
        Self {
            offset,
            handle: ElementHandle::UNRESOLVED,
        }
    }

    fn resolve(&mut self, offsets: &HashMap<u32, ElementHandle>) -> Result<()> {
        self.handle = *offsets
            .get(&self.offset)
            .ok_or(Error::InvalidTarget {
                offset: self.offset,
            })?;
        Ok(())
    }

    /// The byte offset from the raw bytecode.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// The resolved element handle.
    pub const fn handle(&self) -> ElementHandle {
        self.handle
    }
}

/// A display-text element. Keeps the raw escaped bytes; [`Self::text`]
/// decodes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextoutElement {
    raw: Vec<u8>,
}

impl TextoutElement {
    /// The raw bytes as they appear in the bytecode.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Decodes quoting and escapes, keeping Shift-JIS pairs intact.
    pub fn text(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw.len());
        let mut quoted = false;
        let mut it = 0usize;
        while it < self.raw.len() {
            let c = self.raw[it];
            if c == b'"' {
                it += 1;
                quoted = !quoted;
            } else if quoted && c == b'\\' {
                it += 1;
                if peek(&self.raw, it) == b'"' {
                    it += 1;
                    out.push(b'"');
                } else {
                    out.push(b'\\');
                }
            } else {
                if is_lead_byte(c) && it + 1 < self.raw.len() {
                    out.push(self.raw[it]);
                    it += 1;
                }
                out.push(peek(&self.raw, it));
                it += 1;
            }
        }
        out
    }
}

/// A standalone expression element, parsed lazily on first execution.
#[derive(Debug)]
pub struct ExpressionElement {
    raw: Vec<u8>,
    parsed: OnceLock<ExpressionPiece>,
}

impl ExpressionElement {
    /// The parsed expression, including any top-level assignment. Parsing
    /// is idempotent and cached.
    pub fn parsed_expression(&self) -> Result<&ExpressionPiece> {
        if let Some(piece) = self.parsed.get() {
            return Ok(piece);
        }
        let mut cursor = &self.raw[..];
        let piece = expression::get_assignment(&mut cursor)
            .or_else(|_| expression::get_expression(&mut &self.raw[..]))?;
        Ok(self.parsed.get_or_init(|| piece))
    }

    /// Evaluates the expression purely for its integer value.
    pub fn value_only(&self, mem: &mut dyn expression::MemoryServices) -> Result<i32> {
        let mut cursor = &self.raw[..];
        expression::get_expression(&mut cursor)?.int_value(mem)
    }
}

/// One option of a select command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectParam {
    /// Decoded condition records, possibly empty.
    pub conditions: Vec<SelectCondition>,
    /// The raw condition bytes including parentheses.
    pub cond_raw: Vec<u8>,
    /// The option's display text, raw.
    pub text: Vec<u8>,
    /// Source line number.
    pub line: u16,
}

/// One condition record attached to a select option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectCondition {
    /// Guard expression bytes, when present.
    pub condition: Option<Vec<u8>>,
    /// Effect selector byte.
    pub effect: u8,
    /// Effect argument expression bytes, when present.
    pub effect_argument: Option<Vec<u8>>,
}

/// The body of a select command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectElement {
    /// Window-number expression, without its parentheses; absent when the
    /// command uses the default window.
    pub window: Option<Vec<u8>>,
    /// Line number of the opening brace row, when present.
    pub first_line: u16,
    /// The options.
    pub params: Vec<SelectParam>,
    /// Count of spurious trailing `\n u16` records consumed after the
    /// declared options.
    pub useless_junk: usize,
}

impl SelectElement {
    /// Decodes one option's display text: quoting toggles off, escaped
    /// backslashes double, and `###PRINT(expr)` splices become `\s{expr}`
    /// runs for the text system to resolve.
    pub fn text(&self, index: usize) -> Vec<u8> {
        let Some(param) = self.params.get(index) else {
            return Vec::new();
        };
        let raw = &param.text;
        let mut out = Vec::with_capacity(raw.len());
        let mut quoted = false;
        let mut it = 0usize;
        while it < raw.len() {
            let c = raw[it];
            if c == b'"' {
                it += 1;
                quoted = !quoted;
            } else if !quoted && raw[it..].starts_with(b"###PRINT(") {
                it += 9;
                let len = expression::next_expr(&raw[it..]);
                out.extend_from_slice(b"\\s{");
                out.extend_from_slice(&raw[it..(it + len).min(raw.len())]);
                out.push(b'}');
                it += len + 1;
            } else if c == b'\\' {
                out.extend_from_slice(b"\\\\");
                it += 1;
            } else {
                if is_lead_byte(c) && it + 1 < raw.len() {
                    out.push(raw[it]);
                    it += 1;
                }
                out.push(peek(raw, it));
                it += 1;
            }
        }
        out
    }
}

/// Decoded 8-byte command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    /// Module type.
    pub modtype: u8,
    /// Module number.
    pub module: u8,
    /// Opcode.
    pub opcode: u16,
    /// Declared argument count (informational, not part of dispatch).
    pub argc: u16,
    /// Overload selector.
    pub overload: u8,
}

impl CommandInfo {
    fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < COMMAND_SIZE {
            return Err(Error::UnexpectedEnd("command header"));
        }
        Ok(Self {
            modtype: src[1],
            module: src[2],
            opcode: read_u16(src, 3)?,
            argc: read_u16(src, 5)?,
            overload: src[7],
        })
    }
}

/// The command payload variants the parser distinguishes.
#[derive(Debug)]
pub enum CommandVariant {
    /// A plain function call with zero or more raw parameters.
    Function {
        /// Raw bytes of each parameter.
        params: Vec<Vec<u8>>,
    },
    /// Unconditional jump.
    Goto {
        /// Destination.
        target: Target,
    },
    /// Conditional jump; the condition's sense is the opcode's business.
    GotoIf {
        /// Raw condition expression bytes.
        condition: Vec<u8>,
        /// Destination.
        target: Target,
    },
    /// Computed jump: the discriminant indexes the target list.
    GotoOn {
        /// Raw discriminant expression bytes.
        condition: Vec<u8>,
        /// Destinations in index order.
        targets: Vec<Target>,
    },
    /// Case dispatch: the discriminant is compared against each case.
    GotoCase {
        /// Raw discriminant expression bytes.
        condition: Vec<u8>,
        /// `(case bytes including parentheses, destination)` pairs; the
        /// empty case `()` is the default.
        cases: Vec<(Vec<u8>, Target)>,
    },
    /// Subroutine call with arguments.
    GosubWith {
        /// Raw bytes of each argument.
        params: Vec<Vec<u8>>,
        /// Destination.
        target: Target,
    },
    /// Option menu.
    Select(SelectElement),
}

/// A command element: decoded header, payload variant and the lazily
/// parsed parameter pool.
#[derive(Debug)]
pub struct CommandElement {
    info: CommandInfo,
    variant: CommandVariant,
    parsed_params: OnceLock<Vec<ExpressionPiece>>,
}

impl CommandElement {
    fn new(info: CommandInfo, variant: CommandVariant) -> Self {
        Self {
            info,
            variant,
            parsed_params: OnceLock::new(),
        }
    }

    /// The decoded header.
    pub fn info(&self) -> &CommandInfo {
        &self.info
    }

    /// The payload variant.
    pub fn variant(&self) -> &CommandVariant {
        &self.variant
    }

    /// Module type from the header.
    pub fn modtype(&self) -> u8 {
        self.info.modtype
    }

    /// Module number from the header.
    pub fn module(&self) -> u8 {
        self.info.module
    }

    /// Opcode from the header.
    pub fn opcode(&self) -> u16 {
        self.info.opcode
    }

    /// Declared argument count from the header.
    pub fn argc(&self) -> u16 {
        self.info.argc
    }

    /// Overload selector from the header.
    pub fn overload(&self) -> u8 {
        self.info.overload
    }

    /// Effective raw parameters of a plain function.
    ///
    /// Line-number metadata can be embedded inside parameter lists; when
    /// the final parameter is exactly such a three-byte record it is a
    /// pseudo-parameter and excluded here.
    pub fn raw_params(&self) -> &[Vec<u8>] {
        match &self.variant {
            CommandVariant::Function { params } | CommandVariant::GosubWith { params, .. } => {
                if let Some(last) = params.last() {
                    if last.len() == 3 && last[0] == b'\n' {
                        return &params[..params.len() - 1];
                    }
                }
                params
            }
            _ => &[],
        }
    }

    /// Number of effective parameters.
    pub fn param_count(&self) -> usize {
        match &self.variant {
            CommandVariant::Select(select) => select.params.len(),
            _ => self.raw_params().len(),
        }
    }

    /// The parsed parameter pool, built on first use and cached.
    pub fn parsed_parameters(&self) -> Result<&[ExpressionPiece]> {
        if let Some(pieces) = self.parsed_params.get() {
            return Ok(pieces);
        }
        let mut pieces = Vec::with_capacity(self.param_count());
        for raw in self.raw_params() {
            let mut cursor = &raw[..];
            pieces.push(expression::get_data(&mut cursor)?);
        }
        Ok(self.parsed_params.get_or_init(|| pieces))
    }

    fn set_pointers(&mut self, offsets: &HashMap<u32, ElementHandle>) -> Result<()> {
        match &mut self.variant {
            CommandVariant::Goto { target }
            | CommandVariant::GotoIf { target, .. }
            | CommandVariant::GosubWith { target, .. } => target.resolve(offsets),
            CommandVariant::GotoOn { targets, .. } => {
                targets.iter_mut().try_for_each(|t| t.resolve(offsets))
            }
            CommandVariant::GotoCase { cases, .. } => cases
                .iter_mut()
                .try_for_each(|(_, t)| t.resolve(offsets)),
            CommandVariant::Function { .. } | CommandVariant::Select(_) => Ok(()),
        }
    }

    /// Every resolved jump destination of this command.
    pub fn pointers(&self) -> Vec<ElementHandle> {
        match &self.variant {
            CommandVariant::Goto { target }
            | CommandVariant::GotoIf { target, .. }
            | CommandVariant::GosubWith { target, .. } => vec![target.handle()],
            CommandVariant::GotoOn { targets, .. } => {
                targets.iter().map(Target::handle).collect()
            }
            CommandVariant::GotoCase { cases, .. } => {
                cases.iter().map(|(_, t)| t.handle()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// One token of the parsed scenario stream.
#[derive(Debug)]
pub enum BytecodeElement {
    /// Separator; no effect at runtime.
    Comma,
    /// Source line marker.
    Line {
        /// Line number.
        number: u16,
    },
    /// Reading-mark metadata.
    Kidoku {
        /// Kidoku table index.
        value: u16,
    },
    /// A named jump destination.
    Entrypoint {
        /// Entry point id.
        index: i32,
        /// Kidoku table index the id was recovered from.
        value: u16,
    },
    /// Display text.
    Textout(TextoutElement),
    /// Standalone expression.
    Expression(ExpressionElement),
    /// Command.
    Command(CommandElement),
}

impl BytecodeElement {
    /// Scans one element from the head of `src`, returning it with its
    /// byte length.
    pub(crate) fn read(
        src: &[u8],
        cdat: &mut ConstructionData,
    ) -> Result<(BytecodeElement, usize)> {
        let c = peek(src, 0);
        if c == b'!' {
            cdat.entrypoint_marker = b'!';
        }
        match c {
            0 | b',' => Ok((BytecodeElement::Comma, 1)),
            b'\n' => {
                let number = read_u16(src, 1)?;
                Ok((BytecodeElement::Line { number }, 3))
            }
            b'@' | b'!' => {
                let value = read_u16(src, 1)?;
                let entry = *cdat.kidoku_table.get(value as usize).ok_or_else(|| {
                    Error::InvalidScenario(format!("kidoku marker {value} outside the table"))
                })?;
                let element = if entry >= 1_000_000 {
                    BytecodeElement::Entrypoint {
                        index: (entry - 1_000_000) as i32,
                        value,
                    }
                } else {
                    BytecodeElement::Kidoku { value }
                };
                Ok((element, 3))
            }
            b'$' => {
                // Isolate without parsing.
                let mut len = expression::next_token(src);
                if peek(src, len) == b'\\' {
                    len += 2;
                    len += expression::next_expr(src.get(len..).unwrap_or(&[]));
                }
                let raw = src
                    .get(..len)
                    .ok_or(Error::UnexpectedEnd("expression element"))?
                    .to_vec();
                Ok((
                    BytecodeElement::Expression(ExpressionElement {
                        raw,
                        parsed: OnceLock::new(),
                    }),
                    len,
                ))
            }
            b'#' => read_function(src),
            _ => {
                let len = scan_textout(src, cdat.entrypoint_marker);
                Ok((
                    BytecodeElement::Textout(TextoutElement {
                        raw: src
                            .get(..len)
                            .ok_or(Error::UnexpectedEnd("textout element"))?
                            .to_vec(),
                    }),
                    len,
                ))
            }
        }
    }

    pub(crate) fn set_pointers(&mut self, offsets: &HashMap<u32, ElementHandle>) -> Result<()> {
        match self {
            BytecodeElement::Command(cmd) => cmd.set_pointers(offsets),
            _ => Ok(()),
        }
    }

    /// Broad classification of the element.
    pub fn kind(&self) -> ElementKind {
        match self {
            BytecodeElement::Comma => ElementKind::Comma,
            BytecodeElement::Line { .. } => ElementKind::Line,
            BytecodeElement::Kidoku { .. } => ElementKind::Kidoku,
            BytecodeElement::Entrypoint { .. } => ElementKind::Entrypoint,
            BytecodeElement::Textout(_) => ElementKind::Textout,
            BytecodeElement::Expression(_) => ElementKind::Expression,
            BytecodeElement::Command(cmd) => match cmd.variant() {
                CommandVariant::Function { .. } => ElementKind::Function,
                CommandVariant::Goto { .. }
                | CommandVariant::GotoIf { .. }
                | CommandVariant::GosubWith { .. } => ElementKind::Goto,
                CommandVariant::GotoOn { .. } => ElementKind::GotoOn,
                CommandVariant::GotoCase { .. } => ElementKind::GotoCase,
                CommandVariant::Select(_) => ElementKind::Select,
            },
        }
    }

    /// Entry point id, for entry point elements.
    pub fn entrypoint(&self) -> Option<i32> {
        match self {
            BytecodeElement::Entrypoint { index, .. } => Some(*index),
            _ => None,
        }
    }
}

fn scan_textout(src: &[u8], entrypoint_marker: u8) -> usize {
    let mut end = 0usize;
    let mut quoted = false;
    while end < src.len() {
        let c = src[end];
        if quoted {
            quoted = c != b'"';
            if c == b'\\' && peek(src, end + 1) == b'"' {
                end += 1;
            }
        } else {
            if c == b',' {
                end += 1;
            }
            let c = peek(src, end);
            quoted = c == b'"';
            if c == 0
                || c == b'#'
                || c == b'$'
                || c == b'\n'
                || c == b'@'
                || c == entrypoint_marker
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

/// Routes a `#` command to its parsing specialisation by
/// (modtype, module, opcode).
fn read_function(src: &[u8]) -> Result<(BytecodeElement, usize)> {
    let info = CommandInfo::decode(src)?;
    let (variant, len) = match (info.modtype, info.module, info.opcode) {
        (0, 1, 0x0000) | (0, 1, 0x0005) | (0, 5, 0x0001) | (0, 5, 0x0005) => read_goto(src)?,
        (0, 1, 0x0001)
        | (0, 1, 0x0002)
        | (0, 1, 0x0006)
        | (0, 1, 0x0007)
        | (0, 5, 0x0002)
        | (0, 5, 0x0006)
        | (0, 5, 0x0007) => read_goto_if(src)?,
        (0, 1, 0x0003) | (0, 1, 0x0008) | (0, 5, 0x0003) | (0, 5, 0x0008) => {
            read_goto_on(src, info.argc)?
        }
        (0, 1, 0x0004) | (0, 1, 0x0009) | (0, 5, 0x0004) | (0, 5, 0x0009) => {
            read_goto_case(src, info.argc)?
        }
        (0, 1, 0x0010) => read_gosub_with(src)?,
        (0, 2, 0x0000..=0x0003) | (0, 2, 0x0010) => read_select(src, info.argc)?,
        _ => read_plain_function(src)?,
    };
    Ok((
        BytecodeElement::Command(CommandElement::new(info, variant)),
        len,
    ))
}

fn read_goto(src: &[u8]) -> Result<(CommandVariant, usize)> {
    let target = Target::pending(read_u32(src, COMMAND_SIZE)?);
    Ok((CommandVariant::Goto { target }, COMMAND_SIZE + 4))
}

fn read_goto_if(src: &[u8]) -> Result<(CommandVariant, usize)> {
    let mut pos = COMMAND_SIZE;
    if peek(src, pos) != b'(' {
        return Err(Error::MalformedElement {
            element: "goto_if",
            expected: '(',
        });
    }
    pos += 1;
    let expr = expression::next_expr(src.get(pos..).unwrap_or(&[]));
    let condition = src
        .get(pos..pos + expr)
        .ok_or(Error::UnexpectedEnd("goto_if condition"))?
        .to_vec();
    pos += expr;
    if peek(src, pos) != b')' {
        return Err(Error::MalformedElement {
            element: "goto_if",
            expected: ')',
        });
    }
    pos += 1;
    let target = Target::pending(read_u32(src, pos)?);
    Ok((CommandVariant::GotoIf { condition, target }, pos + 4))
}

fn read_goto_on(src: &[u8], argc: u16) -> Result<(CommandVariant, usize)> {
    let mut pos = COMMAND_SIZE;
    let expr = expression::next_expr(src.get(pos..).unwrap_or(&[]));
    let condition = src
        .get(pos..pos + expr)
        .ok_or(Error::UnexpectedEnd("goto_on discriminant"))?
        .to_vec();
    pos += expr;
    if peek(src, pos) != b'{' {
        return Err(Error::MalformedElement {
            element: "goto_on",
            expected: '{',
        });
    }
    pos += 1;
    let mut targets = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        targets.push(Target::pending(read_u32(src, pos)?));
        pos += 4;
    }
    if peek(src, pos) != b'}' {
        return Err(Error::MalformedElement {
            element: "goto_on",
            expected: '}',
        });
    }
    pos += 1;
    Ok((CommandVariant::GotoOn { condition, targets }, pos))
}

fn read_goto_case(src: &[u8], argc: u16) -> Result<(CommandVariant, usize)> {
    let mut pos = COMMAND_SIZE;
    let expr = expression::next_expr(src.get(pos..).unwrap_or(&[]));
    let condition = src
        .get(pos..pos + expr)
        .ok_or(Error::UnexpectedEnd("goto_case discriminant"))?
        .to_vec();
    pos += expr;
    if peek(src, pos) != b'{' {
        return Err(Error::MalformedElement {
            element: "goto_case",
            expected: '{',
        });
    }
    pos += 1;
    let mut cases = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        if peek(src, pos) != b'(' {
            return Err(Error::MalformedElement {
                element: "goto_case",
                expected: '(',
            });
        }
        let case = if peek(src, pos + 1) == b')' {
            pos += 2;
            b"()".to_vec()
        } else {
            let cexpr = expression::next_expr(src.get(pos + 1..).unwrap_or(&[]));
            let case = src
                .get(pos..pos + cexpr + 2)
                .ok_or(Error::UnexpectedEnd("goto_case case"))?
                .to_vec();
            pos += cexpr + 1;
            if peek(src, pos) != b')' {
                return Err(Error::MalformedElement {
                    element: "goto_case",
                    expected: ')',
                });
            }
            pos += 1;
            case
        };
        let target = Target::pending(read_u32(src, pos)?);
        pos += 4;
        cases.push((case, target));
    }
    if peek(src, pos) != b'}' {
        return Err(Error::MalformedElement {
            element: "goto_case",
            expected: '}',
        });
    }
    pos += 1;
    Ok((CommandVariant::GotoCase { condition, cases }, pos))
}

fn read_gosub_with(src: &[u8]) -> Result<(CommandVariant, usize)> {
    let mut pos = COMMAND_SIZE;
    let mut params = Vec::new();
    if peek(src, pos) == b'(' {
        pos += 1;
        while peek(src, pos) != b')' {
            let len = expression::next_data(src.get(pos..).unwrap_or(&[]));
            if len == 0 {
                return Err(Error::UnexpectedEnd("gosub_with parameters"));
            }
            params.push(
                src.get(pos..pos + len)
                    .ok_or(Error::UnexpectedEnd("gosub_with parameters"))?
                    .to_vec(),
            );
            pos += len;
        }
        pos += 1;
    }
    let target = Target::pending(read_u32(src, pos)?);
    Ok((CommandVariant::GosubWith { params, target }, pos + 4))
}

fn read_select(src: &[u8], argc: u16) -> Result<(CommandVariant, usize)> {
    let mut pos = COMMAND_SIZE;

    let window = if peek(src, pos) == b'(' {
        let elen = expression::next_expr(src.get(pos..).unwrap_or(&[]));
        let inner = src
            .get(pos + 1..pos + elen.saturating_sub(1))
            .ok_or(Error::UnexpectedEnd("select window"))?
            .to_vec();
        pos += elen;
        Some(inner)
    } else {
        None
    };

    if peek(src, pos) != b'{' {
        return Err(Error::MalformedElement {
            element: "select",
            expected: '{',
        });
    }
    pos += 1;

    let first_line = if peek(src, pos) == b'\n' {
        let line = read_u16(src, pos + 1)?;
        pos += 3;
        line
    } else {
        0
    };

    let mut params = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        // Skip preliminary metadata.
        while peek(src, pos) == b',' {
            pos += 1;
        }

        // Read condition records, if present.
        let cond_start = pos;
        let mut conditions = Vec::new();
        if peek(src, pos) == b'(' {
            pos += 1;
            while peek(src, pos) != b')' {
                let condition = if peek(src, pos) == b'(' {
                    let len = expression::next_expr(src.get(pos..).unwrap_or(&[]));
                    let bytes = src
                        .get(pos..pos + len)
                        .ok_or(Error::UnexpectedEnd("select condition"))?
                        .to_vec();
                    pos += len;
                    Some(bytes)
                } else {
                    None
                };
                let effect = peek(src, pos);
                let seek_argument = effect != b'2' && effect != b'3';
                pos += 1;
                let next = peek(src, pos);
                let effect_argument =
                    if seek_argument && next != b')' && !next.is_ascii_digit() {
                        let len = expression::next_expr(src.get(pos..).unwrap_or(&[]));
                        let bytes = src
                            .get(pos..pos + len)
                            .ok_or(Error::UnexpectedEnd("select condition argument"))?
                            .to_vec();
                        pos += len;
                        Some(bytes)
                    } else {
                        None
                    };
                conditions.push(SelectCondition {
                    condition,
                    effect,
                    effect_argument,
                });
            }
            if peek(src, pos) != b')' {
                return Err(Error::MalformedElement {
                    element: "select",
                    expected: ')',
                });
            }
            pos += 1;
        }
        let cond_raw = src
            .get(cond_start..pos)
            .ok_or(Error::UnexpectedEnd("select condition"))?
            .to_vec();

        // Read text.
        let tlen = expression::next_string(src.get(pos..).unwrap_or(&[]));
        let text = src
            .get(pos..pos + tlen)
            .ok_or(Error::UnexpectedEnd("select text"))?
            .to_vec();
        pos += tlen;

        if peek(src, pos) != b'\n' {
            return Err(Error::MalformedElement {
                element: "select",
                expected: '\n',
            });
        }
        let line = read_u16(src, pos + 1)?;
        pos += 3;

        params.push(SelectParam {
            conditions,
            cond_raw,
            text,
            line,
        });
    }

    // Some scenarios carry empty options beyond the declared count;
    // consume them as useless junk.
    let mut useless_junk = 0usize;
    while peek(src, pos) == b'\n' {
        pos += 3;
        useless_junk += 1;
    }

    if peek(src, pos) != b'}' {
        return Err(Error::MalformedElement {
            element: "select",
            expected: '}',
        });
    }
    pos += 1;

    Ok((
        CommandVariant::Select(SelectElement {
            window,
            first_line,
            params,
            useless_junk,
        }),
        pos,
    ))
}

fn read_plain_function(src: &[u8]) -> Result<(CommandVariant, usize)> {
    let mut pos = COMMAND_SIZE;
    let mut params = Vec::new();
    if peek(src, pos) == b'(' {
        pos += 1;
        while peek(src, pos) != b')' {
            let len = expression::next_data(src.get(pos..).unwrap_or(&[]));
            if len == 0 {
                return Err(Error::UnexpectedEnd("function parameters"));
            }
            params.push(
                src.get(pos..pos + len)
                    .ok_or(Error::UnexpectedEnd("function parameters"))?
                    .to_vec(),
            );
            pos += len;
        }
        pos += 1;
    }
    Ok((CommandVariant::Function { params }, pos))
}
