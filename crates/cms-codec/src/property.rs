use cms_types::{PropertyEntry, PropertyKey, PropertyValue, CURRENT_VERSION};

use crate::list::{decode_list, encode_list};
use crate::wire::{Reader, Writer};
use crate::CodecError;

// ---------------------------------------------------------------------------
// PropertyKey: version ++ namespace ++ service ++ app_id ++ key
// ---------------------------------------------------------------------------

pub fn encode_key(key: &PropertyKey) -> Result<Vec<u8>, CodecError> {
    match key.version {
        CURRENT_VERSION => encode_key_v1(key),
        v => Err(CodecError::UnsupportedVersion(v)),
    }
}

pub fn decode_key(bytes: &[u8]) -> Result<PropertyKey, CodecError> {
    let mut r = Reader::new(bytes);
    let key = match r.get_u8()? {
        CURRENT_VERSION => decode_key_v1(&mut r)?,
        v => return Err(CodecError::UnsupportedVersion(v)),
    };
    r.finish()?;
    Ok(key)
}

fn encode_key_v1(key: &PropertyKey) -> Result<Vec<u8>, CodecError> {
    let len = key.namespace.len() + key.service.len() + key.app_id.len() + key.key.len();
    let mut w = Writer::with_capacity(1 + 16 + len);
    w.put_u8(CURRENT_VERSION);
    w.put_str(&key.namespace)?;
    w.put_str(&key.service)?;
    w.put_str(&key.app_id)?;
    w.put_str(&key.key)?;
    Ok(w.finish())
}

fn decode_key_v1(r: &mut Reader<'_>) -> Result<PropertyKey, CodecError> {
    Ok(PropertyKey {
        version: CURRENT_VERSION,
        namespace: r.get_string()?,
        service: r.get_string()?,
        app_id: r.get_string()?,
        key: r.get_string()?,
    })
}

// ---------------------------------------------------------------------------
// PropertyValue: version ++ last_modified_ms(i64) ++ value
// ---------------------------------------------------------------------------

pub fn encode_value(value: &PropertyValue) -> Result<Vec<u8>, CodecError> {
    if value.version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(value.version));
    }
    let mut w = Writer::with_capacity(1 + 8 + 4 + value.value.len());
    w.put_u8(CURRENT_VERSION);
    w.put_i64(value.last_modified_ms);
    w.put_bytes(&value.value)?;
    Ok(w.finish())
}

pub fn decode_value(bytes: &[u8]) -> Result<PropertyValue, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.get_u8()?;
    if version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let last_modified_ms = r.get_i64()?;
    let value = r.get_bytes()?.to_vec();
    r.finish()?;
    Ok(PropertyValue { version, value, last_modified_ms })
}

// ---------------------------------------------------------------------------
// PropertyEntry: bytes(key) ++ bytes(value)
// ---------------------------------------------------------------------------

pub fn encode_entry(entry: &PropertyEntry) -> Result<Vec<u8>, CodecError> {
    let key = encode_key(&entry.key)?;
    let value = encode_value(&entry.value)?;
    let mut w = Writer::with_capacity(8 + key.len() + value.len());
    w.put_bytes(&key)?;
    w.put_bytes(&value)?;
    Ok(w.finish())
}

pub fn decode_entry(bytes: &[u8]) -> Result<PropertyEntry, CodecError> {
    let mut r = Reader::new(bytes);
    let key = decode_key(r.get_bytes()?)?;
    let value = decode_value(r.get_bytes()?)?;
    r.finish()?;
    Ok(PropertyEntry { key, value })
}

/// QUERY result payload.
pub fn encode_entries(entries: &[PropertyEntry]) -> Result<Vec<u8>, CodecError> {
    encode_list(entries, encode_entry)
}

pub fn decode_entries(bytes: &[u8]) -> Result<Vec<PropertyEntry>, CodecError> {
    decode_list(bytes, decode_entry)
}
