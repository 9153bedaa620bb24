//! Builders for hand-assembled scenario data.
//!
//! Used by this crate's own tests and, behind the `test-helpers` feature,
//! by downstream crates that need raw scenario bytes without shipping
//! fixture files.

use crate::bytecode::COMMAND_SIZE;

/// Encodes an integer constant token (`$ FF i32`).
pub fn int_constant(value: i32) -> Vec<u8> {
    let mut out = vec![b'$', 0xff];
    out.extend(value.to_le_bytes());
    out
}

/// Encodes a memory reference token with a constant index.
pub fn int_reference(ty: u8, location: i32) -> Vec<u8> {
    let mut out = vec![b'$', ty, b'['];
    out.extend(int_constant(location));
    out.push(b']');
    out
}

/// Encodes a string-bank reference; same shape as an integer reference.
pub fn str_reference(ty: u8, location: i32) -> Vec<u8> {
    int_reference(ty, location)
}

/// Encodes an operator: `\ op`.
pub fn op(opcode: u8) -> [u8; 2] {
    [b'\\', opcode]
}

/// Encodes a quoted string constant.
pub fn str_constant(text: &[u8]) -> Vec<u8> {
    let mut out = vec![b'"'];
    out.extend_from_slice(text);
    out.push(b'"');
    out
}

/// Encodes the 8-byte command header.
pub fn command_header(modtype: u8, module: u8, opcode: u16, argc: u16, overload: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(COMMAND_SIZE);
    out.push(b'#');
    out.push(modtype);
    out.push(module);
    out.extend(opcode.to_le_bytes());
    out.extend(argc.to_le_bytes());
    out.push(overload);
    out
}

/// Encodes a function command with a parenthesised parameter list.
pub fn function(
    modtype: u8,
    module: u8,
    opcode: u16,
    overload: u8,
    params: &[Vec<u8>],
) -> Vec<u8> {
    let mut out = command_header(modtype, module, opcode, params.len() as u16, overload);
    if !params.is_empty() {
        out.push(b'(');
        for p in params {
            out.extend_from_slice(p);
        }
        out.push(b')');
    }
    out
}

/// Compresses data as a stream of literals (every flag bit set).
pub fn lz_literal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    for chunk in data.chunks(8) {
        out.push(0xff);
        out.extend_from_slice(chunk);
    }
    out
}

/// Assembles a complete raw scenario: header, kidoku table and a
/// literal-compressed payload.
#[derive(Default)]
pub struct ScenarioBuilder {
    payload: Vec<u8>,
    kidoku: Vec<u32>,
    version: u32,
    dramatis: Vec<Vec<u8>>,
    encoding: Option<u8>,
}

impl ScenarioBuilder {
    /// A builder for a first-generation (no second XOR layer) scenario.
    pub fn new() -> Self {
        Self {
            payload: Vec::new(),
            kidoku: Vec::new(),
            version: 10002,
            dramatis: Vec::new(),
            encoding: None,
        }
    }

    /// Overrides the compiler version tag.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Adds a dramatis-personae entry.
    pub fn dramatis(mut self, name: &[u8]) -> Self {
        self.dramatis.push(name.to_vec());
        self
    }

    /// Appends an RLdev metadata block declaring a text encoding.
    pub fn rldev_encoding(mut self, encoding: u8) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Byte offset the next appended element will land on.
    pub fn offset(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Appends raw element bytes.
    pub fn add(&mut self, bytes: &[u8]) -> &mut Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    /// Appends a line-number metadata element.
    pub fn add_line(&mut self, number: u16) -> &mut Self {
        self.payload.push(b'\n');
        self.payload.extend(number.to_le_bytes());
        self
    }

    /// Appends a kidoku marker, registering it in the kidoku table.
    pub fn add_kidoku(&mut self, value: u32) -> &mut Self {
        let index = self.kidoku.len() as u16;
        self.kidoku.push(value);
        self.payload.push(b'@');
        self.payload.extend(index.to_le_bytes());
        self
    }

    /// Appends an entry point, registering it in the kidoku table.
    pub fn add_entrypoint(&mut self, id: i32) -> &mut Self {
        let index = self.kidoku.len() as u16;
        self.kidoku.push(1_000_000 + id as u32);
        self.payload.push(b'@');
        self.payload.extend(index.to_le_bytes());
        self
    }

    /// Produces the raw scenario bytes.
    pub fn build(&self) -> Vec<u8> {
        const HEADER_LEN: usize = 0x1d0;
        let kidoku_offset = HEADER_LEN;
        let dramatis_offset = kidoku_offset + self.kidoku.len() * 4;

        let mut dramatis_bytes = Vec::new();
        for name in &self.dramatis {
            dramatis_bytes.extend((name.len() as u32 + 1).to_le_bytes());
            dramatis_bytes.extend_from_slice(name);
            dramatis_bytes.push(0);
        }

        // An RLdev metadata block shows as a gap between the dramatis
        // table and the payload.
        let mut metadata = Vec::new();
        if let Some(encoding) = self.encoding {
            let id_len_field = 3u32; // id length is stored minus one
            let meta_len = id_len_field as usize + 1 + 17;
            metadata.extend((meta_len as u32).to_le_bytes());
            metadata.extend(id_len_field.to_le_bytes());
            metadata.resize(meta_len, 0);
            metadata[id_len_field as usize + 1 + 16] = encoding;
        }

        let payload_offset = dramatis_offset + dramatis_bytes.len() + metadata.len();
        let compressed = lz_literal(&self.payload);

        let mut out = vec![0u8; payload_offset];
        let put = |out: &mut Vec<u8>, at: usize, v: u32| {
            out[at..at + 4].copy_from_slice(&v.to_le_bytes());
        };
        put(&mut out, 0x00, HEADER_LEN as u32);
        put(&mut out, 0x04, self.version);
        put(&mut out, 0x08, kidoku_offset as u32);
        put(&mut out, 0x0c, self.kidoku.len() as u32);
        put(&mut out, 0x14, dramatis_offset as u32);
        put(&mut out, 0x18, self.dramatis.len() as u32);
        put(&mut out, 0x1c, dramatis_bytes.len() as u32);
        put(&mut out, 0x20, payload_offset as u32);
        put(&mut out, 0x24, self.payload.len() as u32);
        put(&mut out, 0x28, compressed.len() as u32);

        for (i, value) in self.kidoku.iter().enumerate() {
            let at = kidoku_offset + i * 4;
            out[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        out[dramatis_offset..dramatis_offset + dramatis_bytes.len()]
            .copy_from_slice(&dramatis_bytes);
        let meta_at = dramatis_offset + dramatis_bytes.len();
        out[meta_at..meta_at + metadata.len()].copy_from_slice(&metadata);
        out.extend_from_slice(&compressed);
        out
    }
}

/// Assembles a SEEN.TXT archive image from (id, scenario bytes) pairs.
pub fn build_archive(scenarios: &[(usize, Vec<u8>)]) -> Vec<u8> {
    const TOC_LEN: usize = 80_000;
    let mut out = vec![0u8; TOC_LEN];
    for (id, data) in scenarios {
        let offset = out.len() as u32;
        out.extend_from_slice(data);
        let slot = id * 8;
        out[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
        out[slot + 4..slot + 8].copy_from_slice(&(data.len() as u32).to_le_bytes());
    }
    out
}
