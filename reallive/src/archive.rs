//! The SEEN.TXT archive container.
//!
//! An archive opens with a fixed 80,000-byte table of contents: 10,000
//! slots of `{offset: u32, length: u32}`, a zero offset marking an empty
//! slot. Loose `seenNNNN.txt` files beside the archive transparently
//! override their TOC slot, which is how fan patches and RLdev builds
//! ship replacement scenarios.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::bytes::read_u32;
use crate::compression;
use crate::error::{Error, Result};
use crate::scenario::{FilePos, Header, Scenario};
use crate::xor_key::{key_for_game, XorKey};

const TOC_SLOTS: usize = 10_000;
const TOC_LEN: usize = TOC_SLOTS * 8;

/// An opened scenario archive.
pub struct Archive {
    data: Vec<u8>,
    scenarios: BTreeMap<i32, FilePos>,
    overrides: HashMap<i32, Vec<u8>>,
    regname: Vec<u8>,
    second_level_xor_key: Option<&'static XorKey>,
    accessed: HashMap<i32, Arc<Scenario>>,
}

impl Archive {
    /// Opens an archive that needs no per-title key.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_for_game(path, b"")
    }

    /// Opens an archive for a given game registry string, selecting the
    /// built-in second-level XOR key when the title is known to need one.
    pub fn open_for_game(path: impl AsRef<Path>, regname: &[u8]) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        if data.len() < TOC_LEN {
            return Err(Error::InvalidArchive(format!(
                "{} bytes is shorter than the table of contents",
                data.len()
            )));
        }

        let mut scenarios = BTreeMap::new();
        for i in 0..TOC_SLOTS {
            let offset = read_u32(&data, i * 8)? as usize;
            if offset != 0 {
                let length = read_u32(&data, i * 8 + 4)? as usize;
                if offset + length > data.len() {
                    return Err(Error::InvalidArchive(format!(
                        "scenario {i} extends past the end of the file"
                    )));
                }
                scenarios.insert(i as i32, FilePos { offset, length });
            }
        }

        let mut archive = Self {
            data,
            scenarios,
            overrides: HashMap::new(),
            regname: regname.to_vec(),
            second_level_xor_key: key_for_game(regname),
            accessed: HashMap::new(),
        };
        archive.read_overrides(path)?;
        Ok(archive)
    }

    /// Scans the archive's directory for loose `seenNNNN.txt` files and
    /// overrides the matching TOC slots.
    fn read_overrides(&mut self, archive_path: &Path) -> Result<()> {
        let Some(dir) = archive_path.parent() else {
            return Ok(());
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = override_index(name) {
                debug!(scenario = index, file = name, "loose scenario override");
                let bytes = std::fs::read(entry.path())?;
                self.scenarios.insert(
                    index,
                    FilePos {
                        offset: 0,
                        length: bytes.len(),
                    },
                );
                self.overrides.insert(index, bytes);
            }
        }
        Ok(())
    }

    /// Ids of every populated scenario slot, in order.
    pub fn scenario_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.scenarios.keys().copied()
    }

    /// Whether the archive holds the given scenario.
    pub fn has_scenario(&self, index: i32) -> bool {
        self.scenarios.contains_key(&index)
    }

    /// Raw bytes of one scenario (header plus compressed payload).
    fn raw_scenario(&self, index: i32) -> Result<&[u8]> {
        if let Some(bytes) = self.overrides.get(&index) {
            return Ok(bytes);
        }
        let pos = self
            .scenarios
            .get(&index)
            .ok_or(Error::UnknownScenario(index))?;
        Ok(&self.data[pos.offset..pos.offset + pos.length])
    }

    /// Header plus decompressed payload of one scenario, without parsing
    /// the element stream.
    pub fn scenario_bytes(&self, index: i32) -> Result<Vec<u8>> {
        let data = self.raw_scenario(index)?;
        let header = Header::new(data)?;
        let key = if header.uses_xor_2() {
            Some(self.second_level_xor_key.ok_or_else(|| {
                Error::EncryptedUnsupported {
                    regname: String::from_utf8_lossy(&self.regname).into_owned(),
                }
            })?)
        } else {
            None
        };
        let payload_offs = read_u32(data, 0x20)? as usize;
        let uncompressed_len = read_u32(data, 0x24)? as usize;
        let compressed_len = read_u32(data, 0x28)? as usize;
        let compressed = data
            .get(payload_offs..payload_offs + compressed_len)
            .ok_or_else(|| Error::InvalidScenario("payload extends past the data".into()))?;

        let mut out = data[..payload_offs].to_vec();
        out.extend(compression::decompress(compressed, uncompressed_len, key)?);
        Ok(out)
    }

    /// Parses a scenario, or returns the cached parse.
    pub fn scenario(&mut self, index: i32) -> Result<Arc<Scenario>> {
        if let Some(scenario) = self.accessed.get(&index) {
            return Ok(Arc::clone(scenario));
        }
        let data = self.raw_scenario(index)?.to_vec();
        let scenario = Arc::new(Scenario::new(
            &data,
            index,
            &self.regname,
            self.second_level_xor_key,
        )?);
        self.accessed.insert(index, Arc::clone(&scenario));
        Ok(scenario)
    }

    /// Drops every cached scenario parse.
    pub fn reset(&mut self) {
        self.accessed.clear();
    }

    /// Scans scenario headers for an RLdev text-encoding declaration and
    /// returns the first non-zero tag, or 0 when none declares one.
    pub fn probable_encoding(&self) -> u8 {
        // Headers only; parsing every scenario here would be wasteful.
        for (&index, _) in self.scenarios.iter() {
            let Ok(data) = self.raw_scenario(index) else {
                continue;
            };
            if let Ok(header) = Header::new(data) {
                let encoding = header.rldev_metadata().text_encoding();
                if encoding != 0 {
                    return encoding;
                }
            }
        }
        0
    }
}

/// Matches `seenNNNN.txt` case-insensitively, exactly four digits.
fn override_index(filename: &str) -> Option<i32> {
    let bytes = filename.as_bytes();
    if bytes.len() != 12
        || !bytes[..4].eq_ignore_ascii_case(b"seen")
        || !bytes[8..].eq_ignore_ascii_case(b".txt")
    {
        return None;
    }
    let digits = &bytes[4..8];
    if !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Read-only view of a legacy PACL archive.
///
/// The table of contents starts at offset 0x20 with 32-byte records:
/// a 16-byte name, then `{offset, arcsize, filesize}` as `u32`s. Members
/// compress with the reverse-bit LZSS variant.
pub struct PaclArchive {
    data: Vec<u8>,
    members: Vec<PaclMember>,
}

#[derive(Debug, Clone)]
struct PaclMember {
    name: Vec<u8>,
    offset: usize,
    arcsize: usize,
    filesize: usize,
}

impl PaclArchive {
    /// Opens a PACL archive file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Parses an in-memory PACL image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if !data.starts_with(b"PACL") {
            return Err(Error::InvalidArchive("missing PACL magic".into()));
        }
        let count = read_u32(&data, 0x10)? as usize;
        let mut members = Vec::with_capacity(count);
        let mut at = 0x20;
        for _ in 0..count {
            let record = data
                .get(at..at + 0x20)
                .ok_or_else(|| Error::InvalidArchive("truncated PACL record".into()))?;
            let name_len = record[..0x10]
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(0x10);
            members.push(PaclMember {
                name: record[..name_len].to_vec(),
                offset: read_u32(record, 0x10)? as usize,
                arcsize: read_u32(record, 0x14)? as usize,
                filesize: read_u32(record, 0x18)? as usize,
            });
            at += 0x20;
        }
        Ok(Self { data, members })
    }

    /// Member names in record order.
    pub fn member_names(&self) -> impl Iterator<Item = &[u8]> {
        self.members.iter().map(|m| m.name.as_slice())
    }

    /// Decompresses one member by name.
    pub fn member_bytes(&self, name: &[u8]) -> Result<Vec<u8>> {
        let member = self
            .members
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| {
                Error::InvalidArchive(format!(
                    "no member `{}`",
                    String::from_utf8_lossy(name)
                ))
            })?;
        let raw = self
            .data
            .get(member.offset..member.offset + member.arcsize)
            .ok_or_else(|| Error::InvalidArchive("member extends past the data".into()))?;
        if member.arcsize == member.filesize {
            return Ok(raw.to_vec());
        }
        compression::decompress_pacl(raw, member.filesize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_archive, ScenarioBuilder};

    struct TempDir(std::path::PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "reallive-test-{tag}-{}",
                std::process::id()
            ));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn simple_scenario() -> Vec<u8> {
        let mut builder = ScenarioBuilder::new();
        builder.add_line(1);
        builder.build()
    }

    #[test]
    fn short_file_is_not_an_archive() {
        let dir = TempDir::new("short");
        let path = dir.path().join("seen.txt");
        std::fs::write(&path, b"way too short").unwrap();
        assert!(matches!(
            Archive::open(&path),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[test]
    fn toc_enumerates_populated_slots() {
        let dir = TempDir::new("toc");
        let path = dir.path().join("seen.txt");
        let image = build_archive(&[(3, simple_scenario()), (1500, simple_scenario())]);
        std::fs::write(&path, image).unwrap();

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.scenario_ids().collect::<Vec<_>>(), vec![3, 1500]);
        assert!(archive.has_scenario(3));
        assert!(!archive.has_scenario(4));
    }

    #[test]
    fn scenario_parses_and_caches() {
        let dir = TempDir::new("cache");
        let path = dir.path().join("seen.txt");
        std::fs::write(&path, build_archive(&[(7, simple_scenario())])).unwrap();

        let mut archive = Archive::open(&path).unwrap();
        let first = archive.scenario(7).unwrap();
        let second = archive.scenario(7).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(archive.scenario(8).is_err());
    }

    #[test]
    fn scenario_bytes_returns_header_and_inflated_payload() {
        let dir = TempDir::new("bytes");
        let path = dir.path().join("seen.txt");
        std::fs::write(&path, build_archive(&[(0, simple_scenario())])).unwrap();

        let archive = Archive::open(&path).unwrap();
        let bytes = archive.scenario_bytes(0).unwrap();
        // Header, no kidoku entries, then the three payload bytes.
        assert_eq!(&bytes[bytes.len() - 3..], &[b'\n', 0x01, 0x00]);
    }

    #[test]
    fn loose_seen_file_overrides_toc_slot() {
        let dir = TempDir::new("override");
        let path = dir.path().join("seen.txt");
        std::fs::write(&path, build_archive(&[(42, simple_scenario())])).unwrap();

        let mut replacement = ScenarioBuilder::new();
        replacement.add_line(9);
        replacement.add_line(10);
        std::fs::write(dir.path().join("SEEN0042.TXT"), replacement.build()).unwrap();

        let mut archive = Archive::open(&path).unwrap();
        let scenario = archive.scenario(42).unwrap();
        assert_eq!(scenario.script().len(), 2);
    }

    #[test]
    fn probable_encoding_scans_headers() {
        let dir = TempDir::new("encoding");
        let path = dir.path().join("seen.txt");
        let tagged = ScenarioBuilder::new().rldev_encoding(3).build();
        let image = build_archive(&[(0, simple_scenario()), (1, tagged)]);
        std::fs::write(&path, image).unwrap();
        assert_eq!(Archive::open(&path).unwrap().probable_encoding(), 3);

        let plain = build_archive(&[(0, simple_scenario())]);
        std::fs::write(&path, plain).unwrap();
        assert_eq!(Archive::open(&path).unwrap().probable_encoding(), 0);
    }

    #[test]
    fn override_pattern_is_strict() {
        assert_eq!(override_index("seen0042.txt"), Some(42));
        assert_eq!(override_index("SEEN0042.TXT"), Some(42));
        assert_eq!(override_index("seen42.txt"), None);
        assert_eq!(override_index("seenabcd.txt"), None);
        assert_eq!(override_index("seen0042.tx"), None);
        assert_eq!(override_index("notseen0042.txt"), None);
    }

    #[test]
    fn pacl_members_round_trip() {
        // One stored (uncompressed) member.
        let payload = b"member payload";
        let mut image = b"PACL\0\0\0\0\0\0\0\0\0\0\0\0".to_vec();
        image.extend(1u32.to_le_bytes());
        image.extend([0u8; 12]);
        let mut record = [0u8; 0x20];
        record[..5].copy_from_slice(b"A.DAT");
        record[0x10..0x14].copy_from_slice(&(0x40u32).to_le_bytes());
        record[0x14..0x18].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        record[0x18..0x1c].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        image.extend(record);
        image.extend(payload);

        let archive = PaclArchive::from_bytes(image).unwrap();
        assert_eq!(
            archive.member_names().collect::<Vec<_>>(),
            vec![&b"A.DAT"[..]]
        );
        assert_eq!(archive.member_bytes(b"A.DAT").unwrap(), payload);
    }
}
