//! `RaftCommand` / `RaftResult` framing.
//!
//! The binary form is what gets versioned; the text form is standard base64
//! of the binary form and is what the consensus log and the client facade
//! carry.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use cms_types::{RaftCommand, RaftOp, RaftResult, RaftResultStatus, CURRENT_VERSION};

use crate::property::{decode_key, encode_key};
use crate::wire::{Reader, Writer};
use crate::CodecError;

// ---------------------------------------------------------------------------
// RaftCommand: version ++ op ++ bytes(key | empty) ++ bytes(value)
// ---------------------------------------------------------------------------

pub fn encode_command(cmd: &RaftCommand) -> Result<Vec<u8>, CodecError> {
    if cmd.version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(cmd.version));
    }
    let key = match &cmd.key {
        Some(k) => encode_key(k)?,
        None => Vec::new(),
    };
    let mut w = Writer::with_capacity(2 + 8 + key.len() + cmd.value.len());
    w.put_u8(CURRENT_VERSION);
    w.put_u8(cmd.operation.code());
    w.put_bytes(&key)?;
    w.put_bytes(&cmd.value)?;
    Ok(w.finish())
}

pub fn decode_command(bytes: &[u8]) -> Result<RaftCommand, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.get_u8()?;
    if version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let code = r.get_u8()?;
    let operation = RaftOp::from_code(code).ok_or(CodecError::UnknownOperation(code))?;
    let key = match r.get_bytes()? {
        [] => None,
        raw => Some(decode_key(raw)?),
    };
    let value = r.get_bytes()?.to_vec();
    r.finish()?;
    Ok(RaftCommand { version, operation, key, value })
}

// ---------------------------------------------------------------------------
// RaftResult: version ++ status ++ bytes(result)
// ---------------------------------------------------------------------------

pub fn encode_result(result: &RaftResult) -> Result<Vec<u8>, CodecError> {
    if result.version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(result.version));
    }
    let mut w = Writer::with_capacity(2 + 4 + result.result.len());
    w.put_u8(CURRENT_VERSION);
    w.put_u8(result.status.code());
    w.put_bytes(&result.result)?;
    Ok(w.finish())
}

pub fn decode_result(bytes: &[u8]) -> Result<RaftResult, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.get_u8()?;
    if version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let code = r.get_u8()?;
    let status = RaftResultStatus::from_code(code).ok_or(CodecError::UnknownStatus(code))?;
    let result = r.get_bytes()?.to_vec();
    r.finish()?;
    Ok(RaftResult { version, status, result })
}

// ---------------------------------------------------------------------------
// Text framing
// ---------------------------------------------------------------------------

pub fn command_to_text(cmd: &RaftCommand) -> Result<String, CodecError> {
    Ok(BASE64_STANDARD.encode(encode_command(cmd)?))
}

pub fn command_from_text(text: impl AsRef<[u8]>) -> Result<RaftCommand, CodecError> {
    decode_command(&BASE64_STANDARD.decode(text)?)
}

pub fn result_to_text(result: &RaftResult) -> Result<String, CodecError> {
    Ok(BASE64_STANDARD.encode(encode_result(result)?))
}

pub fn result_from_text(text: impl AsRef<[u8]>) -> Result<RaftResult, CodecError> {
    decode_result(&BASE64_STANDARD.decode(text)?)
}
