//! Vector blob encoding and validation.
//!
//! Vectors are stored as little-endian `f32` bytes in a plain BLOB column;
//! the dimensionality lives in its own column so corrupt rows are detectable.

use zerocopy::IntoBytes;

use crate::error::ConsistencyError;
use crate::types::DocumentId;

/// Allowed deviation of a stored vector's L2 norm from 1.0.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// View a vector as raw bytes for storage.
pub fn encode_vector(vector: &[f32]) -> &[u8] {
    vector.as_bytes()
}

/// Rebuild a vector from stored bytes, checking them against `dim`.
///
/// `dim` comes straight from the `dim` column; negative or oversized values
/// are reported as corruption.
pub fn decode_vector(
    doc_id: DocumentId,
    dim: i64,
    bytes: &[u8],
) -> std::result::Result<Vec<f32>, ConsistencyError> {
    let corrupt = || ConsistencyError::CorruptVector {
        doc_id,
        dim,
        bytes: bytes.len(),
    };
    let len = usize::try_from(dim).map_err(|_| corrupt())?;
    let expected = len
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(corrupt)?;
    if bytes.len() != expected {
        return Err(corrupt());
    }

    let mut vector = vec![0.0f32; len];
    vector.as_mut_bytes().copy_from_slice(bytes);
    Ok(vector)
}

/// Check that a vector is non-empty, finite and unit length.
pub fn validate_vector(vector: &[f32]) -> std::result::Result<(), ConsistencyError> {
    if vector.is_empty() {
        return Err(ConsistencyError::InvalidValues("vector is empty".to_string()));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(ConsistencyError::InvalidValues(format!(
            "component {pos} is not finite"
        )));
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if (norm - 1.0).abs() > NORM_TOLERANCE {
        return Err(ConsistencyError::InvalidValues(format!(
            "vector norm is {norm}, expected unit length"
        )));
    }
    Ok(())
}
