//! Per-scenario header and script parsing.
//!
//! A scenario's raw bytes begin with a 0x1d0-byte plaintext header (plus
//! the kidoku and dramatis-personae tables it points into), followed by
//! the compressed bytecode payload. [`Header`] decodes the preamble,
//! [`Script`] inflates the payload and parses it into the element arena,
//! and [`Scenario`] ties both to the scenario id.

use std::collections::HashMap;

use crate::bytecode::{BytecodeElement, ConstructionData, ElementHandle};
use crate::bytes::{read_i32, read_u32};
use crate::compression;
use crate::error::{Error, Result};
use crate::xor_key::XorKey;

/// Minimum (and in practice only) header length.
const HEADER_LEN: usize = 0x1d0;

/// Location and length of a scenario inside its backing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilePos {
    /// Byte offset into the archive data, or 0 for an override's own file.
    pub offset: usize,
    /// Length in bytes.
    pub length: usize,
}

/// RLdev metadata block appended between the dramatis table and the
/// payload by scenarios compiled with the homebrew toolchain.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    as_bytes: Vec<u8>,
    encoding: u8,
}

impl Metadata {
    fn assign(&mut self, input: &[u8]) -> Result<()> {
        let meta_len = read_u32(input, 0)? as usize;
        let id_len = read_u32(input, 4)? as usize + 1;
        if meta_len < id_len + 17 {
            return Ok(()); // malformed metadata
        }
        self.as_bytes = input
            .get(..meta_len)
            .ok_or(Error::UnexpectedEnd("rldev metadata"))?
            .to_vec();
        self.encoding = self.as_bytes[id_len + 16];
        Ok(())
    }

    /// The raw metadata bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.as_bytes
    }

    /// Declared text encoding tag; 0 when absent.
    pub fn text_encoding(&self) -> u8 {
        self.encoding
    }
}

/// A scenario's savepoint policy for one trigger class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointPolicy {
    /// Set the savepoint on this trigger.
    Enabled,
    /// Never set the savepoint on this trigger.
    Disabled,
    /// Defer to the game-wide configuration.
    GameDefault,
}

impl SavepointPolicy {
    fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Enabled,
            1 => Self::Disabled,
            _ => Self::GameDefault,
        }
    }

    /// Resolves the policy against the game-wide default.
    pub fn resolve(self, game_default: bool) -> bool {
        match self {
            Self::Enabled => true,
            Self::Disabled => false,
            Self::GameDefault => game_default,
        }
    }
}

/// The decoded per-scenario preamble.
#[derive(Debug, Clone)]
pub struct Header {
    use_xor_2: bool,
    z_minus_one: i32,
    z_minus_two: i32,
    savepoint_message: SavepointPolicy,
    savepoint_selcom: SavepointPolicy,
    savepoint_seentop: SavepointPolicy,
    dramatis_personae: Vec<Vec<u8>>,
    rldev_metadata: Metadata,
}

impl Header {
    /// Decodes a header from the raw scenario bytes.
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::InvalidScenario("header too short".into()));
        }

        let use_xor_2 = match read_u32(data, 4)? {
            10002 => false,
            110002 | 1110002 => true,
            other => return Err(Error::UnsupportedCompilerVersion(other)),
        };

        if read_u32(data, 0)? as usize != HEADER_LEN {
            return Err(Error::InvalidScenario(
                "unsupported bytecode version".into(),
            ));
        }

        // Debug entrypoints.
        let z_minus_one = read_i32(data, 0x2c)?;
        let z_minus_two = read_i32(data, 0x30)?;

        // Misc settings.
        let savepoint_message = SavepointPolicy::from_raw(read_i32(data, 0x1c4)?);
        let savepoint_selcom = SavepointPolicy::from_raw(read_i32(data, 0x1c8)?);
        let savepoint_seentop = SavepointPolicy::from_raw(read_i32(data, 0x1cc)?);

        // Dramatis personae.
        let count = read_u32(data, 0x18)? as usize;
        let mut dramatis_personae = Vec::with_capacity(count);
        let mut offs = read_u32(data, 0x14)? as usize;
        for _ in 0..count {
            let elen = read_u32(data, offs)? as usize;
            let name = data
                .get(offs + 4..offs + 4 + elen.saturating_sub(1))
                .ok_or(Error::UnexpectedEnd("dramatis personae table"))?;
            dramatis_personae.push(name.to_vec());
            offs += elen + 4;
        }

        // Scenarios compiled with RLdev may append a metadata block after
        // the dramatis table; its presence shows as a gap before the
        // payload offset.
        let mut rldev_metadata = Metadata::default();
        let meta_offs = read_u32(data, 0x14)? as usize + read_u32(data, 0x1c)? as usize;
        if meta_offs != read_u32(data, 0x20)? as usize {
            rldev_metadata.assign(
                data.get(meta_offs..)
                    .ok_or(Error::UnexpectedEnd("rldev metadata"))?,
            )?;
        }

        Ok(Self {
            use_xor_2,
            z_minus_one,
            z_minus_two,
            savepoint_message,
            savepoint_selcom,
            savepoint_seentop,
            dramatis_personae,
            rldev_metadata,
        })
    }

    /// Whether the payload carries the second obfuscation layer.
    pub fn uses_xor_2(&self) -> bool {
        self.use_xor_2
    }

    /// Debug entry point Z-1.
    pub fn z_minus_one(&self) -> i32 {
        self.z_minus_one
    }

    /// Debug entry point Z-2.
    pub fn z_minus_two(&self) -> i32 {
        self.z_minus_two
    }

    /// Savepoint policy applied when a message begins.
    pub fn savepoint_message(&self) -> SavepointPolicy {
        self.savepoint_message
    }

    /// Savepoint policy applied when a selection command runs.
    pub fn savepoint_selcom(&self) -> SavepointPolicy {
        self.savepoint_selcom
    }

    /// Savepoint policy applied on entry to the scenario top.
    pub fn savepoint_seentop(&self) -> SavepointPolicy {
        self.savepoint_seentop
    }

    /// The cast list, raw bytes per entry.
    pub fn dramatis_personae(&self) -> &[Vec<u8>] {
        &self.dramatis_personae
    }

    /// RLdev metadata, empty when the block is absent.
    pub fn rldev_metadata(&self) -> &Metadata {
        &self.rldev_metadata
    }
}

/// The parsed element stream of one scenario.
#[derive(Debug)]
pub struct Script {
    elements: Vec<BytecodeElement>,
    /// Original byte offset of each element, parallel to `elements`.
    offsets: Vec<u32>,
    entrypoints: HashMap<i32, ElementHandle>,
}

impl Script {
    pub(crate) fn new(
        header: &Header,
        data: &[u8],
        regname: &[u8],
        key: Option<&XorKey>,
    ) -> Result<Self> {
        // Kidoku/entrypoint table.
        let kidoku_offs = read_u32(data, 0x08)? as usize;
        let kidoku_len = read_u32(data, 0x0c)? as usize;
        let mut kidoku_table = Vec::with_capacity(kidoku_len);
        for i in 0..kidoku_len {
            kidoku_table.push(read_u32(data, kidoku_offs + i * 4)?);
        }

        let key = if header.uses_xor_2() {
            match key {
                Some(key) => Some(key),
                None => {
                    return Err(Error::EncryptedUnsupported {
                        regname: String::from_utf8_lossy(regname).into_owned(),
                    })
                }
            }
        } else {
            None
        };

        // Decompress the payload.
        let payload_offs = read_u32(data, 0x20)? as usize;
        let uncompressed_len = read_u32(data, 0x24)? as usize;
        let compressed_len = read_u32(data, 0x28)? as usize;
        let compressed = data
            .get(payload_offs..payload_offs + compressed_len)
            .ok_or_else(|| Error::InvalidScenario("payload extends past the data".into()))?;
        let stream = compression::decompress(compressed, uncompressed_len, key)?;

        // First pass: scan elements and record their offsets.
        let mut cdat = ConstructionData::new(kidoku_table);
        let mut elements = Vec::new();
        let mut offsets = Vec::new();
        let mut entrypoints = HashMap::new();
        let mut pos = 0usize;
        while pos < stream.len() {
            let handle = ElementHandle::new(elements.len() as u32);
            let (element, length) = BytecodeElement::read(&stream[pos..], &mut cdat)?;
            cdat.offsets.insert(pos as u32, handle);
            if let BytecodeElement::Entrypoint { index, .. } = element {
                entrypoints.insert(index, handle);
            }
            elements.push(element);
            offsets.push(pos as u32);
            // Failsafe: always advance at least one byte.
            pos += length.max(1);
        }

        // Second pass: resolve jump targets to element handles.
        for element in &mut elements {
            element.set_pointers(&cdat.offsets)?;
        }

        Ok(Self {
            elements,
            offsets,
            entrypoints,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the scenario parsed to no elements at all.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The element behind a handle, or `None` at or past the end sentinel.
    pub fn element(&self, handle: ElementHandle) -> Option<&BytecodeElement> {
        self.elements.get(handle.index())
    }

    /// The original byte offset of an element.
    pub fn element_offset(&self, handle: ElementHandle) -> Option<u32> {
        self.offsets.get(handle.index()).copied()
    }

    /// Looks up an entry point.
    pub fn entrypoint(&self, entrypoint: i32) -> Result<ElementHandle> {
        self.entrypoints
            .get(&entrypoint)
            .copied()
            .ok_or(Error::UnknownEntrypoint(entrypoint))
    }

    /// Iterates elements in stream order.
    pub fn elements(&self) -> impl Iterator<Item = &BytecodeElement> {
        self.elements.iter()
    }
}

/// One parsed scenario: id, header and script. Immutable after parsing.
#[derive(Debug)]
pub struct Scenario {
    id: i32,
    header: Header,
    script: Script,
}

impl Scenario {
    /// Parses a scenario from its raw bytes.
    pub fn new(data: &[u8], id: i32, regname: &[u8], key: Option<&XorKey>) -> Result<Self> {
        let header = Header::new(data)?;
        let script = Script::new(&header, data, regname, key)?;
        Ok(Self { id, header, script })
    }

    /// The scenario id (SEEN number).
    pub fn id(&self) -> i32 {
        self.id
    }

    /// The decoded preamble.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The parsed element stream.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Handle of the first element.
    pub fn begin(&self) -> ElementHandle {
        ElementHandle::new(0)
    }

    /// One-past-the-end sentinel handle.
    pub fn end(&self) -> ElementHandle {
        ElementHandle::new(self.script.len() as u32)
    }

    /// Looks up an entry point.
    pub fn find_entrypoint(&self, entrypoint: i32) -> Result<ElementHandle> {
        self.script.entrypoint(entrypoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScenarioBuilder;

    #[test]
    fn short_data_is_rejected() {
        assert!(matches!(
            Header::new(&[0u8; 16]),
            Err(Error::InvalidScenario(_))
        ));
    }

    #[test]
    fn unknown_compiler_version_is_rejected() {
        let data = ScenarioBuilder::new().version(424242).build();
        assert!(matches!(
            Header::new(&data),
            Err(Error::UnsupportedCompilerVersion(424242))
        ));
    }

    #[test]
    fn xor2_scenario_without_key_is_refused() {
        let mut builder = ScenarioBuilder::new().version(110002);
        builder.add_line(1);
        let data = builder.build();
        match Scenario::new(&data, 0, b"KEY\\UNKNOWN_GAME", None) {
            Err(Error::EncryptedUnsupported { regname }) => {
                assert!(regname.contains("UNKNOWN_GAME"));
            }
            other => panic!("expected EncryptedUnsupported, got {other:?}"),
        }
    }

    #[test]
    fn dramatis_personae_and_metadata_are_decoded() {
        let data = ScenarioBuilder::new()
            .dramatis(b"AKANE")
            .dramatis(b"YUKITO")
            .rldev_encoding(2)
            .build();
        let header = Header::new(&data).unwrap();
        assert_eq!(
            header.dramatis_personae(),
            &[b"AKANE".to_vec(), b"YUKITO".to_vec()]
        );
        assert_eq!(header.rldev_metadata().text_encoding(), 2);

        let plain = ScenarioBuilder::new().build();
        let header = Header::new(&plain).unwrap();
        assert!(header.dramatis_personae().is_empty());
        assert_eq!(header.rldev_metadata().text_encoding(), 0);
    }

    #[test]
    fn savepoint_policies_decode_from_the_header() {
        let mut data = ScenarioBuilder::new().build();
        data[0x1c4..0x1c8].copy_from_slice(&0u32.to_le_bytes());
        data[0x1c8..0x1cc].copy_from_slice(&1u32.to_le_bytes());
        data[0x1cc..0x1d0].copy_from_slice(&7u32.to_le_bytes());
        let header = Header::new(&data).unwrap();
        assert_eq!(header.savepoint_message(), SavepointPolicy::Enabled);
        assert_eq!(header.savepoint_selcom(), SavepointPolicy::Disabled);
        assert_eq!(header.savepoint_seentop(), SavepointPolicy::GameDefault);
        assert!(header.savepoint_message().resolve(false));
        assert!(!header.savepoint_selcom().resolve(true));
        assert!(header.savepoint_seentop().resolve(true));
    }

    #[test]
    fn kidoku_and_entrypoint_markers_disambiguate() {
        let mut builder = ScenarioBuilder::new();
        builder.add_kidoku(5);
        builder.add_entrypoint(2);
        builder.add_line(10);
        let scenario = Scenario::new(&builder.build(), 0, b"", None).unwrap();

        let script = scenario.script();
        assert_eq!(script.len(), 3);
        assert!(matches!(
            script.element(ElementHandle::new(0)),
            Some(BytecodeElement::Kidoku { value: 0 })
        ));
        assert!(matches!(
            script.element(ElementHandle::new(1)),
            Some(BytecodeElement::Entrypoint { index: 2, .. })
        ));
        assert_eq!(script.entrypoint(2).unwrap(), ElementHandle::new(1));
        assert!(script.entrypoint(9).is_err());
    }

    #[test]
    fn element_offsets_are_recorded() {
        let mut builder = ScenarioBuilder::new();
        builder.add_line(1); // 3 bytes
        builder.add(b","); // 1 byte
        builder.add_line(2);
        let scenario = Scenario::new(&builder.build(), 0, b"", None).unwrap();
        let script = scenario.script();
        assert_eq!(script.element_offset(ElementHandle::new(0)), Some(0));
        assert_eq!(script.element_offset(ElementHandle::new(1)), Some(3));
        assert_eq!(script.element_offset(ElementHandle::new(2)), Some(4));
    }

    #[test]
    fn parsing_twice_is_isomorphic() {
        let mut builder = ScenarioBuilder::new();
        let mut goto = crate::testing::command_header(0, 1, 0, 0, 0);
        goto.extend(12u32.to_le_bytes());
        builder.add(&goto); // 12 bytes, targets the element after itself
        builder.add_line(1);
        builder.add_line(2);
        let data = builder.build();

        let a = Scenario::new(&data, 0, b"", None).unwrap();
        let b = Scenario::new(&data, 0, b"", None).unwrap();
        assert_eq!(a.script().len(), b.script().len());
        let targets = |s: &Scenario| -> Vec<_> {
            s.script()
                .elements()
                .filter_map(|e| match e {
                    BytecodeElement::Command(cmd) => Some(cmd.pointers()),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(targets(&a), targets(&b));
    }
}
