use cms_types::{PropertyQueryFilter, CURRENT_VERSION};

use crate::wire::{Reader, Writer};
use crate::CodecError;

/// `version ++ 5 × optional string ++ limit(i32)`. Regex order is namespace,
/// service, app_id, key, value.
pub fn encode_filter(filter: &PropertyQueryFilter) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::with_capacity(1 + 5 * 4 + 4 + 64);
    w.put_u8(CURRENT_VERSION);
    w.put_opt_str(filter.namespace_regex.as_deref())?;
    w.put_opt_str(filter.service_regex.as_deref())?;
    w.put_opt_str(filter.app_id_regex.as_deref())?;
    w.put_opt_str(filter.key_regex.as_deref())?;
    w.put_opt_str(filter.value_regex.as_deref())?;
    w.put_i32(filter.limit);
    Ok(w.finish())
}

pub fn decode_filter(bytes: &[u8]) -> Result<PropertyQueryFilter, CodecError> {
    let mut r = Reader::new(bytes);
    let version = r.get_u8()?;
    if version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let filter = PropertyQueryFilter {
        namespace_regex: r.get_opt_string()?,
        service_regex: r.get_opt_string()?,
        app_id_regex: r.get_opt_string()?,
        key_regex: r.get_opt_string()?,
        value_regex: r.get_opt_string()?,
        limit: r.get_i32()?,
    };
    r.finish()?;
    Ok(filter)
}
