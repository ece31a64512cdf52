//! Column encodings: embeddings as little-endian f32 blobs, timestamps as
//! Unix milliseconds.
//!
//! Decoding runs inside row-mapping closures, so failures travel as
//! `FromSqlConversionFailure` carrying a [`CodecError`]; `StoreError`
//! unwraps them again.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("embedding blob length {len} is not a multiple of 4")]
    EmbeddingBlob { len: usize },
    #[error("timestamp {millis} ms is out of range")]
    Timestamp { millis: i64 },
}

fn conversion(column: usize, ty: Type, err: CodecError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

pub fn embedding_to_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_embedding(blob: &[u8], column: usize) -> rusqlite::Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(conversion(
            column,
            Type::Blob,
            CodecError::EmbeddingBlob { len: blob.len() },
        ));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn millis_to_utc(ms: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| conversion(column, Type::Integer, CodecError::Timestamp { millis: ms }))
}
