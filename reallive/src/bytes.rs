//! Checked little-endian readers over raw scenario data.

use crate::error::{Error, Result};

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or(Error::UnexpectedEnd("u16 field"))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(Error::UnexpectedEnd("u32 field"))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_i32(data: &[u8], offset: usize) -> Result<i32> {
    read_u32(data, offset).map(|v| v as i32)
}

/// Reads past-the-end as zero, the way the reference scanner relied on the
/// terminating sentinel of a scenario buffer.
pub(crate) fn peek(data: &[u8], offset: usize) -> u8 {
    data.get(offset).copied().unwrap_or(0)
}

/// First byte of a two-byte Shift-JIS character.
pub(crate) fn is_lead_byte(c: u8) -> bool {
    (0x81..=0x9f).contains(&c) || (0xe0..=0xef).contains(&c)
}
