use crate::wire::{Reader, Writer};
use crate::CodecError;

/// `u32 count ++ count × (u32 len ++ element)`, with the element bytes
/// produced by `encode_item`.
pub fn encode_list<T, F>(items: &[T], encode_item: F) -> Result<Vec<u8>, CodecError>
where
    F: Fn(&T) -> Result<Vec<u8>, CodecError>,
{
    let mut w = Writer::with_capacity(4 + items.len() * 32);
    w.put_len(items.len())?;
    for item in items {
        w.put_bytes(&encode_item(item)?)?;
    }
    Ok(w.finish())
}

pub fn decode_list<T, F>(bytes: &[u8], decode_item: F) -> Result<Vec<T>, CodecError>
where
    F: Fn(&[u8]) -> Result<T, CodecError>,
{
    let mut r = Reader::new(bytes);
    let count = r.get_u32()? as usize;
    // Each element needs at least its 4-byte prefix; don't trust `count` for
    // the allocation.
    let mut items = Vec::with_capacity(count.min(bytes.len() / 4));
    for _ in 0..count {
        items.push(decode_item(r.get_bytes()?)?);
    }
    r.finish()?;
    Ok(items)
}
