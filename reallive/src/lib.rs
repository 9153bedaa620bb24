//! Loader and bytecode model for RealLive scenario archives.
//!
//! A `SEEN.TXT` archive bundles up to 10,000 compiled scenarios behind a
//! fixed-size table of contents. Each scenario carries a plaintext header
//! followed by an LZ-compressed (and, for later titles, XOR-obfuscated)
//! bytecode payload. This crate maps the container ([`archive`]), inflates
//! the payload ([`compression`]), parses the element stream ([`bytecode`])
//! and provides the embedded expression sub-language ([`expression`]) that
//! both expression elements and command parameters are written in.
//!
//! Execution lives in the `rlvm` crate; everything here is immutable after
//! parsing and safe to share between stack frames.

#![warn(missing_docs)]

pub mod archive;
pub mod bytecode;
pub mod compression;
pub mod error;
pub mod expression;
pub mod intmemref;
pub mod scenario;
pub mod xor_key;

mod bytes;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use archive::{Archive, PaclArchive};
pub use bytecode::{BytecodeElement, CommandElement, CommandInfo, CommandVariant, ElementHandle};
pub use error::{Error, Result};
pub use expression::{ExpressionPiece, ExpressionValueType, MemoryServices};
pub use intmemref::IntMemRef;
pub use scenario::{Header, SavepointPolicy, Scenario, Script};
pub use xor_key::XorKey;
