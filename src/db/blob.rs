// Vector blob codec: a JSON float array stored as UTF-8 bytes.
//
// JSON keeps the stored rows inspectable with the sqlite3 shell and readable
// by other tooling. Decode failures are surfaced as CacheDecodeError so the
// cache backends can turn them into misses.

use thiserror::Error;

/// A stored vector could not be turned back into floats.
#[derive(Debug, Error)]
pub enum CacheDecodeError {
    #[error("stored vector is not a JSON float array: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored vector is empty")]
    Empty,
}

/// Encode a vector for storage.
pub fn encode_vector(vector: &[f64]) -> Vec<u8> {
    // Serializing a slice of f64 only fails on non-finite values, which
    // serde_json writes as null; they are rejected again on decode.
    serde_json::to_vec(vector).unwrap_or_default()
}

/// Decode a stored vector.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f64>, CacheDecodeError> {
    let vector: Vec<f64> = serde_json::from_slice(bytes)?;
    if vector.is_empty() {
        return Err(CacheDecodeError::Empty);
    }
    Ok(vector)
}
