//! Bucket padding with a self-describing end marker.
//!
//! Layout: `body || 0x80 || 0x00*`, total length a multiple of the bucket.
//! The marker is always present, so a bucket-aligned body grows by a full
//! bucket and the empty body pads to exactly one bucket.

use super::TransportError;

/// Default bucket size in bytes.
pub const DEFAULT_BUCKET_SIZE: usize = 16;

/// Byte that terminates the real body.
pub const PADDING_MARKER: u8 = 0x80;

/// Pads `body` to the next multiple of `bucket_size`.
pub fn pad(body: &[u8], bucket_size: usize) -> Vec<u8> {
    let bucket_size = bucket_size.max(1);
    let padded_len = (body.len() / bucket_size + 1) * bucket_size;

    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(body);
    padded.push(PADDING_MARKER);
    padded.resize(padded_len, 0);
    padded
}

/// Strips padding produced by [`pad`].
pub fn strip_padding(padded: &[u8], bucket_size: usize) -> Result<Vec<u8>, TransportError> {
    let bucket_size = bucket_size.max(1);

    if padded.is_empty() {
        return Err(TransportError::MalformedPadding("empty body".into()));
    }
    if padded.len() % bucket_size != 0 {
        return Err(TransportError::MalformedPadding(format!(
            "length {} is not a multiple of {}",
            padded.len(),
            bucket_size
        )));
    }

    let marker_index = padded
        .iter()
        .rposition(|&b| b != 0)
        .ok_or_else(|| TransportError::MalformedPadding("no padding marker".into()))?;

    if padded[marker_index] != PADDING_MARKER {
        return Err(TransportError::MalformedPadding(format!(
            "unexpected byte 0x{:02x} before padding",
            padded[marker_index]
        )));
    }

    // The marker must sit in the last bucket, otherwise whole zero buckets
    // were appended after the real padding.
    if padded.len() - marker_index > bucket_size {
        return Err(TransportError::MalformedPadding(
            "padding longer than one bucket".into(),
        ));
    }

    Ok(padded[..marker_index].to_vec())
}
