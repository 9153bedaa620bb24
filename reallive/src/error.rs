//! Load- and parse-time error variants for RealLive data.

use thiserror::Error;

/// Errors raised while loading an archive or parsing a scenario.
#[derive(Debug, Error)]
pub enum Error {
    /// The archive file failed a structural check.
    #[error("not a RealLive archive: {0}")]
    InvalidArchive(String),
    /// The scenario data failed a structural check.
    #[error("not a RealLive bytecode file: {0}")]
    InvalidScenario(String),
    /// The per-scenario header names a compiler this crate does not know.
    #[error("unsupported compiler version: {0}")]
    UnsupportedCompilerVersion(u32),
    /// The scenario needs a second-level XOR key and none is registered for
    /// the game. Carries the registry name for reporting.
    #[error("no second-level xor key registered for game `{regname}`")]
    EncryptedUnsupported {
        /// Game registry string, lossily decoded for display.
        regname: String,
    },
    /// A `goto`-family target offset did not land on an element boundary.
    #[error("jump target 0x{offset:08x} does not land on an element boundary")]
    InvalidTarget {
        /// The byte offset encoded in the bytecode.
        offset: u32,
    },
    /// Entry point lookup failed.
    #[error("unknown entrypoint {0}")]
    UnknownEntrypoint(i32),
    /// The archive has no scenario under this id.
    #[error("unknown scenario {0}")]
    UnknownScenario(i32),
    /// An element did not have the shape its kind requires.
    #[error("malformed {element} element: expected `{expected}`")]
    MalformedElement {
        /// Element kind under construction.
        element: &'static str,
        /// The byte the parser was looking for.
        expected: char,
    },
    /// A byte the expression grammar has no rule for.
    #[error("unexpected byte 0x{found:02x} in {context}")]
    UnexpectedByte {
        /// The offending byte.
        found: u8,
        /// Which grammar production was running.
        context: &'static str,
    },
    /// The data ended inside a multi-byte construct.
    #[error("unexpected end of data in {0}")]
    UnexpectedEnd(&'static str),
    /// An operator byte outside the defined operator table.
    #[error("invalid operator 0x{0:02x} in expression")]
    InvalidOperator(u8),
    /// A memory access outside the bank's addressable range.
    #[error("access to {bank}[{location}] is out of range")]
    OutOfRange {
        /// Bank display name.
        bank: String,
        /// The requested element index.
        location: i32,
    },
    /// An operation was applied to a value of the wrong type, e.g. taking
    /// the string value of an integer expression.
    #[error("type error: {0}")]
    TypeError(&'static str),
    /// Filesystem failure while reading the archive or an override.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;
