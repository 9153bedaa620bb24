//! Per-title obfuscation keys.
//!
//! Titles released around and after Little Busters! run a second XOR pass
//! over the compressed scenario region. The pass combines a per-title
//! 256-byte mask with a fixed table; titles are identified by the registry
//! string the game installs itself under. Unknown titles that demand the
//! second layer fail the load with `EncryptedUnsupported` instead of
//! producing garbage.

/// Fixed table combined with every per-title mask.
pub(crate) const SECOND_LAYER_KEY: [u8; 256] = [
    0xf6, 0x6d, 0x7c, 0x66, 0x87, 0x9b, 0xd3, 0x88, 0x0a, 0x0a, 0x6c, 0xe3,
    0x92, 0xa4, 0x14, 0xdf, 0xfd, 0xe9, 0x40, 0x09, 0x2a, 0xaf, 0x1f, 0x82,
    0xd7, 0xb0, 0xb5, 0x9c, 0x96, 0xe0, 0x8e, 0xc3, 0x0f, 0xb1, 0x56, 0x90,
    0x58, 0xa3, 0xe9, 0x77, 0x19, 0xcb, 0x49, 0xf6, 0x5c, 0xf9, 0x4f, 0xb3,
    0x42, 0xc5, 0x48, 0xdd, 0x25, 0x28, 0xc8, 0xa3, 0x0f, 0x11, 0x4e, 0xb5,
    0x94, 0xab, 0x55, 0x7b, 0x2c, 0x21, 0x92, 0x37, 0x04, 0x93, 0xd1, 0xc1,
    0xc1, 0x11, 0x4d, 0x72, 0xd9, 0xe9, 0xd1, 0xbe, 0x20, 0x39, 0xd9, 0xc6,
    0x47, 0x3d, 0x72, 0x90, 0xa0, 0x5b, 0xc7, 0xb3, 0x73, 0x72, 0x94, 0xb1,
    0xc0, 0x77, 0x67, 0xf2, 0x68, 0x18, 0x27, 0x46, 0x8e, 0x4f, 0x7b, 0xca,
    0xaa, 0xde, 0x21, 0xa5, 0x56, 0xd9, 0xaa, 0x6f, 0x49, 0x74, 0xb7, 0x67,
    0x70, 0x3a, 0x9f, 0x3b, 0xad, 0xe8, 0xd3, 0xd7, 0x8f, 0xb9, 0xb2, 0x3d,
    0x59, 0x5f, 0x81, 0x5f, 0x2e, 0x8a, 0x59, 0x96, 0x22, 0x29, 0x3d, 0xa0,
    0x9b, 0xd2, 0x36, 0x68, 0x85, 0x54, 0xb3, 0x38, 0xd3, 0xd0, 0x0b, 0xce,
    0x03, 0x35, 0x05, 0x6c, 0x5f, 0x61, 0xe9, 0x98, 0x46, 0x4d, 0xc3, 0xe8,
    0xae, 0x92, 0xef, 0xe9, 0x86, 0x4b, 0x0e, 0x56, 0xa2, 0x0c, 0xe3, 0xbf,
    0x13, 0xaa, 0x7a, 0xc5, 0x99, 0xe8, 0x65, 0xaa, 0x7c, 0x0e, 0x91, 0x11,
    0x16, 0x60, 0xba, 0x82, 0x73, 0xb0, 0x7b, 0xd1, 0xc5, 0xad, 0xe9, 0xe9,
    0xab, 0x15, 0x2f, 0xa6, 0x41, 0xcc, 0x83, 0x35, 0xf8, 0x21, 0x82, 0xed,
    0xde, 0x60, 0x4f, 0x92, 0x2f, 0xef, 0x57, 0x86, 0xde, 0xea, 0xec, 0x72,
    0x42, 0x46, 0x09, 0xe3, 0xf6, 0xec, 0x97, 0x3a, 0xe3, 0x49, 0x45, 0x42,
    0x81, 0x68, 0x1f, 0x6b, 0xee, 0xe5, 0x4c, 0xa8, 0x70, 0x94, 0xec, 0x58,
    0xe4, 0xf5, 0xa5, 0x41,
];

/// A per-title 256-byte mask for the second obfuscation layer.
#[derive(Debug, Clone)]
pub struct XorKey {
    mask: [u8; 256],
}

impl XorKey {
    /// Wraps a raw mask, e.g. one recovered by the host for a title this
    /// crate does not know.
    pub const fn new(mask: [u8; 256]) -> Self {
        Self { mask }
    }

    /// XORs a compressed region in place, combining the per-title mask
    /// with the fixed second-layer table. Applying twice restores the
    /// input.
    pub fn apply(&self, data: &mut [u8]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.mask[i & 0xff] ^ SECOND_LAYER_KEY[i & 0xff];
        }
    }
}

/// Mask for Clannad Full Voice Edition.
pub static CLANNAD_FULL_VOICE_XOR_MASK: XorKey = XorKey {
    mask: [
        0x76, 0x37, 0x2b, 0x1c, 0xdd, 0xdc, 0xfb, 0xc0, 0x8f, 0x61, 0xdf, 0x75,
        0x22, 0xfe, 0xaf, 0x9b, 0xc3, 0xc8, 0xd3, 0x5c, 0x12, 0x9b, 0xba, 0xcf,
        0x94, 0xa1, 0x42, 0xb7, 0x12, 0xe9, 0x77, 0xed, 0xd6, 0x6f, 0x2d, 0x70,
        0x77, 0x01, 0xba, 0x13, 0x16, 0x8d, 0x9f, 0x44, 0x6d, 0xe9, 0x8b, 0xa4,
        0xb1, 0xda, 0x75, 0x80, 0x46, 0x98, 0x36, 0xb4, 0xfc, 0xa0, 0x07, 0x90,
        0x5b, 0x65, 0x98, 0xd1, 0x93, 0xba, 0xc0, 0x02, 0x0e, 0x43, 0x48, 0xa4,
        0x48, 0x79, 0x6b, 0x51, 0xdb, 0xda, 0x69, 0x6a, 0x28, 0x2e, 0x74, 0x68,
        0x26, 0xcd, 0xaf, 0x13, 0x14, 0x65, 0x32, 0xb4, 0x27, 0x5d, 0x89, 0xb6,
        0x92, 0x1f, 0x8e, 0x1a, 0xdf, 0xea, 0x57, 0x81, 0x3a, 0x31, 0xe1, 0x15,
        0x98, 0x4d, 0xd2, 0xb4, 0xa5, 0x46, 0xca, 0xe5, 0xff, 0x76, 0xdf, 0x32,
        0xe3, 0x31, 0x2b, 0x87, 0xaf, 0x51, 0x8d, 0x1c, 0xd8, 0x07, 0x79, 0xfe,
        0x76, 0x2e, 0x34, 0x82, 0xe4, 0xfd, 0x1b, 0x90, 0x49, 0x62, 0xc3, 0x79,
        0xd7, 0x99, 0x59, 0x11, 0x7a, 0x97, 0x15, 0x59, 0x94, 0xd4, 0x59, 0x28,
        0x13, 0x59, 0x7a, 0xc2, 0x0d, 0x4b, 0x66, 0x31, 0x02, 0x20, 0x59, 0xa1,
        0xa1, 0x76, 0x4f, 0x10, 0xdd, 0x71, 0x8b, 0x23, 0x55, 0x12, 0x7e, 0xe1,
        0x00, 0x83, 0x1b, 0x01, 0x4c, 0xc9, 0xf6, 0x16, 0x54, 0x27, 0x18, 0xc3,
        0x7d, 0x11, 0xed, 0xc0, 0xcb, 0x58, 0xdf, 0xd6, 0xc1, 0x81, 0x32, 0x55,
        0xe6, 0x1c, 0x4d, 0x15, 0xea, 0x13, 0x36, 0x3d, 0xe1, 0x3a, 0xbf, 0x70,
        0xb8, 0x95, 0xd5, 0x85, 0x1e, 0xb9, 0x0a, 0xc0, 0x8d, 0x72, 0x8a, 0xda,
        0x59, 0xd7, 0xcf, 0xe7, 0x3c, 0xc5, 0xd1, 0x88, 0x3b, 0xbe, 0x01, 0xaa,
        0xa5, 0xda, 0xf6, 0x9d, 0xac, 0x87, 0x8d, 0x71, 0xac, 0xb6, 0x99, 0x0c,
        0x19, 0x6f, 0x43, 0x54,
    ],
};

/// Mask for Little Busters!.
pub static LITTLE_BUSTERS_XOR_MASK: XorKey = XorKey {
    mask: [
        0x12, 0x51, 0x62, 0x64, 0xd0, 0x33, 0x53, 0x00, 0xef, 0x44, 0xfd, 0x70,
        0x31, 0x19, 0x7b, 0x17, 0x6a, 0xdb, 0x77, 0x63, 0x19, 0x2b, 0x68, 0xa0,
        0xb8, 0xaa, 0xf4, 0xca, 0x12, 0xfa, 0x60, 0x22, 0x1f, 0xb1, 0x3b, 0xb5,
        0xda, 0xe5, 0xca, 0x75, 0xf3, 0xf6, 0x4c, 0xaf, 0x64, 0xd8, 0x0d, 0x99,
        0x28, 0x8a, 0xf4, 0x0d, 0x57, 0xd4, 0x09, 0xf6, 0x1d, 0x05, 0x99, 0x07,
        0xb9, 0x3a, 0x8b, 0xdc, 0xa7, 0x60, 0x3e, 0x8d, 0x51, 0x7c, 0xee, 0xb3,
        0xa1, 0x67, 0xef, 0xca, 0x49, 0xf7, 0x8b, 0xb6, 0xc7, 0x50, 0x44, 0xcf,
        0x45, 0x28, 0x9a, 0x3a, 0x33, 0x79, 0x0f, 0x79, 0x9d, 0xb9, 0x29, 0x11,
        0x4b, 0xfe, 0x93, 0xeb, 0x89, 0x82, 0x3b, 0xb0, 0x35, 0xbf, 0xa8, 0x3d,
        0xf8, 0xf2, 0x67, 0xa3, 0xaf, 0xf5, 0x56, 0xe0, 0x7e, 0x4b, 0x60, 0x6a,
        0xc3, 0x1a, 0x0c, 0x00, 0x13, 0x46, 0x97, 0x10, 0xe9, 0x68, 0x18, 0xc3,
        0x1f, 0xd2, 0x6d, 0x46, 0x5a, 0xbb, 0x48, 0x94, 0x7c, 0x3e, 0x46, 0xdc,
        0xb3, 0xe2, 0x42, 0xf8, 0x7e, 0x82, 0xb2, 0x40, 0xb7, 0xd2, 0x09, 0x17,
        0x32, 0xe3, 0xd6, 0xa4, 0x50, 0xd9, 0x60, 0xd4, 0x5d, 0x24, 0xe7, 0x10,
        0x3a, 0x18, 0x77, 0x40, 0x6e, 0x55, 0x75, 0x5c, 0x53, 0x8c, 0x1c, 0x30,
        0x03, 0x50, 0x6d, 0x9d, 0xc4, 0x5d, 0x3a, 0xb4, 0xfa, 0x2c, 0xe3, 0xe8,
        0xec, 0xc6, 0x70, 0xda, 0x52, 0xe2, 0x07, 0x27, 0x67, 0xdc, 0x4e, 0x92,
        0x94, 0xd7, 0x82, 0x2c, 0x4d, 0xbe, 0x4b, 0x87, 0x0c, 0x6c, 0x8c, 0x71,
        0x58, 0x11, 0x3a, 0xf9, 0x6f, 0xc1, 0x32, 0xac, 0xa7, 0x81, 0x4c, 0x2a,
        0x2d, 0x3d, 0xea, 0x52, 0x78, 0x67, 0x13, 0x8d, 0xd6, 0x54, 0x5c, 0x77,
        0x8c, 0x9c, 0x5c, 0xed, 0x8c, 0x30, 0x4b, 0x46, 0xf0, 0xf5, 0x40, 0x0f,
        0x6a, 0x23, 0x52, 0x62,
    ],
};

/// Mask for Little Busters! Ecstasy.
pub static LITTLE_BUSTERS_EX_XOR_MASK: XorKey = XorKey {
    mask: [
        0x69, 0x96, 0x26, 0x83, 0x56, 0x42, 0xac, 0xfe, 0x30, 0xba, 0x90, 0xa1,
        0x3c, 0x89, 0x31, 0x96, 0x64, 0x70, 0xd7, 0x69, 0x55, 0x51, 0xf1, 0xf8,
        0x64, 0x49, 0x19, 0x27, 0x4f, 0xe9, 0x72, 0x73, 0x59, 0x3e, 0xe3, 0x1d,
        0x06, 0x03, 0x77, 0x7b, 0xf7, 0xfe, 0x7c, 0x74, 0x9f, 0x4f, 0xc7, 0x8a,
        0x55, 0xcd, 0x28, 0x2d, 0xa4, 0xe9, 0x36, 0xc4, 0x86, 0x25, 0x88, 0x38,
        0xbc, 0x5b, 0xb2, 0x3f, 0x62, 0xa6, 0x31, 0x37, 0x6e, 0x40, 0xb3, 0x00,
        0x3d, 0x3b, 0xee, 0x6b, 0x20, 0x5b, 0xa1, 0x6c, 0x35, 0x93, 0x40, 0x83,
        0x08, 0xdb, 0x82, 0xde, 0x49, 0xc9, 0xa6, 0x28, 0x08, 0x83, 0x00, 0xee,
        0x97, 0x7c, 0x40, 0xec, 0xcb, 0x25, 0x05, 0x66, 0xdd, 0xad, 0x0b, 0xd3,
        0xde, 0xc2, 0xc8, 0x0f, 0xb6, 0x45, 0xcc, 0xea, 0xb7, 0x3d, 0x91, 0x27,
        0x5b, 0x49, 0x2c, 0x67, 0x90, 0xd6, 0x95, 0x23, 0x2f, 0xcd, 0x48, 0xd1,
        0x00, 0xcf, 0x85, 0xa4, 0xc7, 0x6f, 0x17, 0xaa, 0x36, 0xe1, 0x6b, 0x88,
        0x20, 0xb5, 0xcc, 0x23, 0x14, 0xe0, 0x8e, 0x77, 0xaf, 0xa5, 0xe9, 0x04,
        0x8c, 0xf3, 0x05, 0xb6, 0x3d, 0x1d, 0x12, 0x52, 0x30, 0x1e, 0xc1, 0xac,
        0x2d, 0x25, 0x73, 0x68, 0xc8, 0x38, 0x23, 0x9f, 0x15, 0xef, 0x75, 0x37,
        0x4f, 0x50, 0xfb, 0x3a, 0x1e, 0x67, 0xe1, 0x7e, 0x9a, 0x44, 0x8e, 0xfc,
        0x6a, 0xfe, 0x92, 0xb9, 0xd0, 0x4d, 0x66, 0x67, 0x11, 0x35, 0x60, 0xcd,
        0x7e, 0x48, 0x6b, 0xdb, 0xb8, 0x44, 0x87, 0x3a, 0x79, 0x62, 0x06, 0x67,
        0x88, 0x5c, 0x64, 0x5e, 0xc4, 0x5d, 0xe6, 0x5c, 0x1c, 0x08, 0x24, 0xd7,
        0xa1, 0xb2, 0x78, 0x72, 0xfe, 0x4a, 0xba, 0x0b, 0x56, 0x7d, 0xf4, 0x01,
        0xed, 0x66, 0x89, 0x11, 0xca, 0x49, 0xd5, 0x85, 0x4f, 0xd0, 0x97, 0x0a,
        0x52, 0x5f, 0xee, 0xee,
    ],
};

/// Mask for Snow Standard Edition.
pub static SNOW_STANDARD_EDITION_XOR_MASK: XorKey = XorKey {
    mask: [
        0xa8, 0x0a, 0x52, 0xa5, 0x0b, 0xc6, 0xda, 0x7a, 0xe8, 0x34, 0xd5, 0xa0,
        0xe6, 0x66, 0xdc, 0x9d, 0x95, 0x4e, 0xab, 0xdf, 0x04, 0xa2, 0xfe, 0xec,
        0x7a, 0xf3, 0x53, 0x86, 0x63, 0x76, 0xc0, 0x66, 0x33, 0x4e, 0x9e, 0x9a,
        0xdd, 0x45, 0x5c, 0x3a, 0x14, 0x21, 0xe5, 0x5b, 0xe9, 0x86, 0xd1, 0xcc,
        0x0d, 0x92, 0xb1, 0x90, 0xd8, 0x04, 0xb9, 0xb0, 0xef, 0xf1, 0xea, 0xcb,
        0xa1, 0x63, 0x6c, 0x79, 0xed, 0xa8, 0x6a, 0x65, 0x0a, 0x0d, 0x21, 0xf5,
        0xda, 0x6d, 0x86, 0x2f, 0xa1, 0x91, 0xcb, 0x82, 0xa4, 0x3d, 0xc8, 0x5b,
        0x80, 0xed, 0x80, 0x3d, 0x26, 0x7d, 0x26, 0x76, 0x63, 0xe8, 0x32, 0x61,
        0x37, 0x5c, 0xfb, 0x69, 0xdb, 0x5a, 0xea, 0xe0, 0x27, 0x48, 0x21, 0xd3,
        0x55, 0x79, 0xc5, 0x53, 0xd9, 0x14, 0x5f, 0x72, 0xcb, 0xe6, 0x59, 0x1f,
        0x32, 0x12, 0x67, 0xee, 0xfc, 0x00, 0x09, 0x75, 0x4b, 0x4e, 0xce, 0x77,
        0xfc, 0x6e, 0x4d, 0x07, 0x3e, 0x87, 0x57, 0x26, 0xef, 0x36, 0xa4, 0x08,
        0x3a, 0xa2, 0xb9, 0xcd, 0x81, 0xa8, 0x55, 0xc5, 0x7d, 0xe1, 0x6f, 0x39,
        0xee, 0xc3, 0x90, 0x79, 0x6f, 0x8d, 0x21, 0x9c, 0x83, 0xea, 0x80, 0xfb,
        0xcf, 0x45, 0x47, 0x57, 0x0d, 0xc7, 0xbb, 0x49, 0x26, 0x9b, 0x5d, 0xa4,
        0x6e, 0x47, 0xab, 0xfd, 0xe4, 0xa8, 0x04, 0xb2, 0x18, 0xdf, 0x49, 0xc1,
        0x75, 0xbe, 0x5b, 0xd6, 0xe8, 0x72, 0x36, 0x14, 0xd2, 0x15, 0xcc, 0x92,
        0x52, 0x87, 0x34, 0x91, 0x3d, 0x2e, 0x92, 0x9b, 0x5f, 0x7a, 0x47, 0x1a,
        0xe5, 0xaa, 0x6b, 0xfa, 0x54, 0x09, 0x1f, 0xd4, 0x0e, 0xaf, 0x9a, 0xe3,
        0x60, 0xf6, 0x15, 0x7f, 0x88, 0xbd, 0x44, 0xc4, 0x52, 0x48, 0x86, 0xf9,
        0xa2, 0xbf, 0x11, 0x14, 0x05, 0xce, 0x9a, 0xc6, 0xcb, 0xd7, 0xaf, 0x17,
        0x2e, 0xc2, 0xec, 0xfc,
    ],
};

// "KEY\<little busters in katakana>!", with the EX variant appending
// fullwidth "EX".
const LITTLE_BUSTERS_REGNAME: &[u8] =
    b"KEY\\\x83\x8a\x83\x67\x83\x8b\x83\x6f\x83\x58\x83\x5e\x81\x5b\x83\x59\x81\x49";
const LITTLE_BUSTERS_EX_REGNAME: &[u8] =
    b"KEY\\\x83\x8a\x83\x67\x83\x8b\x83\x6f\x83\x58\x83\x5e\x81\x5b\x83\x59\x81\x49\x82\x64\x82\x77";

/// Looks up the built-in key for a game registry string. Registry names
/// are raw bytes; several titles register themselves under CP932 names.
pub fn key_for_game(regname: &[u8]) -> Option<&'static XorKey> {
    if regname == b"KEY\\CLANNAD_FV" {
        Some(&CLANNAD_FULL_VOICE_XOR_MASK)
    } else if regname == LITTLE_BUSTERS_REGNAME {
        Some(&LITTLE_BUSTERS_XOR_MASK)
    } else if regname == LITTLE_BUSTERS_EX_REGNAME {
        Some(&LITTLE_BUSTERS_EX_XOR_MASK)
    } else if regname == b"StudioMebius\\SNOWSE" {
        Some(&SNOW_STANDARD_EDITION_XOR_MASK)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_is_an_involution() {
        let original: Vec<u8> = (0..=255u8).chain(0..=255u8).collect();
        let mut data = original.clone();
        LITTLE_BUSTERS_XOR_MASK.apply(&mut data);
        assert_ne!(data, original);
        LITTLE_BUSTERS_XOR_MASK.apply(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn known_titles_resolve() {
        assert!(key_for_game(b"KEY\\CLANNAD_FV").is_some());
        assert!(key_for_game(LITTLE_BUSTERS_REGNAME).is_some());
        assert!(key_for_game(LITTLE_BUSTERS_EX_REGNAME).is_some());
        assert!(key_for_game(b"StudioMebius\\SNOWSE").is_some());
        assert!(key_for_game(b"KEY\\SOMETHING_ELSE").is_none());
    }
}
