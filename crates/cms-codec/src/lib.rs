//! Versioned binary codec for every value that crosses the consensus log or
//! the client/server boundary.
//!
//! Each structure starts with a one-byte version tag; only
//! [`CURRENT_VERSION`](cms_types::CURRENT_VERSION) is implemented. Commands
//! and results additionally travel as base64 text (see [`raft`]).

pub mod list;
pub mod property;
pub mod query;
pub mod raft;
mod wire;

pub use list::{decode_list, encode_list};
pub use property::{
    decode_entries, decode_entry, decode_key, decode_value, encode_entries, encode_entry,
    encode_key, encode_value,
};
pub use query::{decode_filter, encode_filter};
pub use raft::{
    command_from_text, command_to_text, decode_command, decode_result, encode_command,
    encode_result, result_from_text, result_to_text,
};

use cms_types::CmsError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown operation code {0}")]
    UnknownOperation(u8),
    #[error("unknown result status code {0}")]
    UnknownStatus(u8),
    #[error("invalid base64 framing: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("length {0} does not fit a 4-byte prefix")]
    TooLarge(usize),
}

impl From<CodecError> for CmsError {
    fn from(e: CodecError) -> Self {
        CmsError::Codec(e.to_string())
    }
}
