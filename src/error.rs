//! Crate-wide error type. One enum covers every fallible operation; there is
//! no retry policy at this layer (see SPEC_FULL.md §7).

use std::fmt;

/// Error surfaced by the transport port. The simulator does not interpret
/// these; they are passed through unchanged to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Address above the 0x05000000 sanity ceiling.
    AddressOutOfRange { address: u32 },
    /// `op_<mnemonic>` has no registered factory.
    UnknownMnemonic { op: String },
    /// The operand string did not match the expected grammar for its position.
    OperandParse { args: String, reason: &'static str },
    /// Propagated from the `Transport` port unchanged.
    Transport(TransportError),
    /// An HLE tag refers to a handler name never registered via `hle_init`.
    HleNotCompiled { name: String },
    /// A `.core`/`.addr`/`.data` stream failed to parse on `load_state`.
    StateFormat { reason: &'static str },
    /// The external assembler/HLE compiler rejected source text.
    CompileFailed(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::AddressOutOfRange { address } => {
                write!(f, "address {address:#010x} exceeds sanity ceiling")
            }
            SimError::UnknownMnemonic { op } => write!(f, "unknown mnemonic `{op}`"),
            SimError::OperandParse { args, reason } => {
                write!(f, "could not parse operands `{args}`: {reason}")
            }
            SimError::Transport(e) => write!(f, "{e}"),
            SimError::HleNotCompiled { name } => {
                write!(f, "HLE handler `{name}` was never compiled")
            }
            SimError::StateFormat { reason } => write!(f, "malformed state snapshot: {reason}"),
            SimError::CompileFailed(msg) => write!(f, "compile failed: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

impl From<TransportError> for SimError {
    fn from(e: TransportError) -> Self {
        SimError::Transport(e)
    }
}

pub type SimResult<T> = Result<T, SimError>;
