// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Binary snapshot format for sorted series.
//!
//! Little-endian layout, bit-exact:
//!
//! ```text
//! offset 0   total_size: i32        bytes of the whole payload
//! offset 4   format_version: u8     == 1
//! offset 5   flags: u8              reserved, 0
//! offset 6   reserved: i16          0
//! offset 8   size: i32              number of entries
//! offset 12  version: i64           series version at snapshot time
//! offset 20  is_regular: u8
//! offset 21  is_sealed: u8
//! offset 22  keys block             i32 length prefix + compressed block
//! ...        values block           i32 length prefix + compressed block
//! ```
//!
//! Regular series persist exactly the two descriptor keys; the reader
//! rebuilds the rest from `first + i * step` via the comparer.

pub mod block;
pub mod scalar;

use series_core::{KeyComparer, SortedSeries};
use thiserror::Error;

pub use block::{compress_block, decompress_block, BlockScalar, CompressionMethod};
pub use scalar::Scalar;

pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 22;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload truncated near byte {0}")]
    Truncated(usize),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown compression method {0}")]
    UnknownMethod(u8),
    #[error("compression method unsupported for this element type")]
    UnsupportedMethod,
    #[error("length mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("invalid header field: {0}")]
    InvalidHeader(&'static str),
    #[error("payload exceeds the format's size limits")]
    Oversized,
    #[error("decoded keys violate the strict key order")]
    KeyOrder,
}

/// Per-block compression choices. The default delta-encodes keys (the
/// common timestamp case) and stores values raw; float keys need an
/// explicit `Raw` key method.
#[derive(Clone, Copy, Debug)]
pub struct SerializeOptions {
    pub key_method: CompressionMethod,
    pub value_method: CompressionMethod,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            key_method: CompressionMethod::DeltaVarint,
            value_method: CompressionMethod::Raw,
        }
    }
}

/// Writes one consistent snapshot of `series`.
pub fn serialize<K, V, C>(
    series: &SortedSeries<K, V, C>,
    options: SerializeOptions,
) -> Result<Vec<u8>, CodecError>
where
    K: BlockScalar,
    V: BlockScalar,
    C: KeyComparer<K>,
{
    let snapshot = series.snapshot();
    let keys_block = compress_block(&snapshot.keys, options.key_method)?;
    let values_block = compress_block(&snapshot.values, options.value_method)?;

    let total = HEADER_LEN + 4 + keys_block.len() + 4 + values_block.len();
    if total > i32::MAX as usize {
        return Err(CodecError::Oversized);
    }
    let mut out = Vec::with_capacity(total);
    (total as i32).write_le(&mut out);
    out.push(FORMAT_VERSION);
    out.push(0); // flags
    out.extend_from_slice(&0i16.to_le_bytes()); // reserved
    (snapshot.size as i32).write_le(&mut out);
    (snapshot.version as i64).write_le(&mut out);
    out.push(snapshot.regular as u8);
    out.push(snapshot.sealed as u8);
    (keys_block.len() as i32).write_le(&mut out);
    out.extend_from_slice(&keys_block);
    (values_block.len() as i32).write_le(&mut out);
    out.extend_from_slice(&values_block);
    Ok(out)
}

/// Reads a payload produced by [`serialize`], restoring entry order,
/// `version`, and the sealed flag.
pub fn deserialize<K, V, C>(bytes: &[u8], comparer: C) -> Result<SortedSeries<K, V, C>, CodecError>
where
    K: BlockScalar,
    V: BlockScalar,
    C: KeyComparer<K>,
{
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    let total = i32::read_le(&bytes[0..4]);
    if total < 0 || total as usize != bytes.len() {
        return Err(CodecError::InvalidHeader("total_size"));
    }
    let format_version = bytes[4];
    if format_version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(format_version));
    }
    let size = i32::read_le(&bytes[8..12]);
    if size < 0 {
        return Err(CodecError::InvalidHeader("size"));
    }
    let size = size as usize;
    let version = i64::read_le(&bytes[12..20]) as u64;
    let regular = match bytes[20] {
        0 => false,
        1 => true,
        _ => return Err(CodecError::InvalidHeader("is_regular")),
    };
    let sealed = match bytes[21] {
        0 => false,
        1 => true,
        _ => return Err(CodecError::InvalidHeader("is_sealed")),
    };

    let (keys_block, offset) = length_prefixed(bytes, HEADER_LEN)?;
    let (values_block, offset) = length_prefixed(bytes, offset)?;
    if offset != bytes.len() {
        return Err(CodecError::CountMismatch {
            expected: bytes.len(),
            actual: offset,
        });
    }

    let stored_keys: Vec<K> = decompress_block(keys_block)?;
    let values: Vec<V> = decompress_block(values_block)?;
    if values.len() != size {
        return Err(CodecError::CountMismatch {
            expected: size,
            actual: values.len(),
        });
    }

    let keys = if regular {
        if stored_keys.len() != 2 {
            return Err(CodecError::CountMismatch {
                expected: 2,
                actual: stored_keys.len(),
            });
        }
        expand_regular(&stored_keys, size, &comparer)?
    } else {
        if stored_keys.len() != size {
            return Err(CodecError::CountMismatch {
                expected: size,
                actual: stored_keys.len(),
            });
        }
        stored_keys
    };

    let pairs = keys.into_iter().zip(values).collect();
    SortedSeries::from_parts(pairs, version, sealed, comparer).map_err(|_| CodecError::KeyOrder)
}

fn expand_regular<K: Copy, C: KeyComparer<K>>(
    descriptor: &[K],
    size: usize,
    comparer: &C,
) -> Result<Vec<K>, CodecError> {
    let first = descriptor[0];
    let step = comparer
        .diff(&descriptor[1], &first)
        .ok_or(CodecError::InvalidHeader("regular keys need a diffable comparer"))?;
    let mut keys = Vec::with_capacity(size);
    for index in 0..size {
        let key = if index == 0 {
            first
        } else if index == 1 {
            descriptor[1]
        } else {
            let delta = step
                .checked_mul(index as i64)
                .ok_or(CodecError::KeyOrder)?;
            comparer.add(&first, delta).ok_or(CodecError::KeyOrder)?
        };
        keys.push(key);
    }
    Ok(keys)
}

fn length_prefixed(bytes: &[u8], offset: usize) -> Result<(&[u8], usize), CodecError> {
    let end = offset.checked_add(4).ok_or(CodecError::Oversized)?;
    let prefix = bytes
        .get(offset..end)
        .ok_or(CodecError::Truncated(offset))?;
    let len = i32::read_le(prefix);
    if len < 0 {
        return Err(CodecError::InvalidHeader("block length"));
    }
    let body_end = end.checked_add(len as usize).ok_or(CodecError::Oversized)?;
    let body = bytes
        .get(end..body_end)
        .ok_or(CodecError::Truncated(end))?;
    Ok((body, body_end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use series_core::{I64Comparer, SeriesError};

    type Series = SortedSeries<i64, f64, I64Comparer>;

    fn series_with(entries: &[(i64, f64)]) -> Series {
        let series = Series::new(I64Comparer);
        for (k, v) in entries {
            series.set(*k, *v).unwrap();
        }
        series
    }

    #[test]
    fn regular_series_roundtrip() {
        let series = series_with(&[(10, 1.0), (20, 2.0), (30, 3.0), (40, 4.0)]);
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();

        let restored: Series = deserialize(&bytes, I64Comparer).unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.version(), series.version());
        assert!(!restored.is_sealed());
        assert!(restored.is_regular());
        assert_eq!(restored.to_vec(), series.to_vec());
    }

    #[test]
    fn dense_series_roundtrip() {
        let series = series_with(&[(10, 1.0), (20, 2.0), (25, 2.5), (40, 4.0)]);
        assert!(!series.is_regular());
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();

        let restored: Series = deserialize(&bytes, I64Comparer).unwrap();
        assert!(!restored.is_regular());
        assert_eq!(restored.to_vec(), series.to_vec());
    }

    #[test]
    fn sealed_flag_survives() {
        let series = series_with(&[(10, 1.0), (20, 2.0)]);
        series.complete();
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();

        let restored: Series = deserialize(&bytes, I64Comparer).unwrap();
        assert!(restored.is_sealed());
        assert_eq!(restored.set(30, 3.0), Err(SeriesError::Sealed));
    }

    #[test]
    fn empty_series_roundtrip() {
        let series = Series::new(I64Comparer);
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();
        let restored: Series = deserialize(&bytes, I64Comparer).unwrap();
        assert!(restored.is_empty());
        assert!(!restored.is_sealed());
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let series = series_with(&[(10, 1.0), (20, 2.0), (30, 3.0)]);
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();

        assert_eq!(i32::read_le(&bytes[0..4]) as usize, bytes.len());
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert_eq!(bytes[5], 0);
        assert_eq!(i32::read_le(&bytes[8..12]), 3);
        assert_eq!(i64::read_le(&bytes[12..20]) as u64, series.version());
        assert_eq!(bytes[20], 1, "regular progression");
        assert_eq!(bytes[21], 0, "not sealed");
        // Regular keys block carries exactly the two descriptor elements.
        let keys_len = i32::read_le(&bytes[22..26]) as usize;
        let keys: Vec<i64> = decompress_block(&bytes[26..26 + keys_len]).unwrap();
        assert_eq!(keys, vec![10, 20]);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let series = series_with(&[(10, 1.0)]);
        let mut bytes = serialize(&series, SerializeOptions::default()).unwrap();
        bytes[4] = 2;
        assert!(matches!(
            deserialize::<i64, f64, _>(&bytes, I64Comparer),
            Err(CodecError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn truncation_is_rejected() {
        let series = series_with(&[(10, 1.0), (20, 2.0)]);
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();
        for cut in [4usize, HEADER_LEN, bytes.len() - 1] {
            assert!(
                deserialize::<i64, f64, _>(&bytes[..cut], I64Comparer).is_err(),
                "cut at {cut} must fail"
            );
        }
    }

    #[test]
    fn corrupted_key_order_is_rejected() {
        let series = series_with(&[(10, 1.0), (20, 2.0)]);
        let mut bytes = serialize(
            &series,
            SerializeOptions {
                key_method: CompressionMethod::Raw,
                value_method: CompressionMethod::Raw,
            },
        )
        .unwrap();
        // Overwrite the second raw key (block header is 5 bytes past the
        // length prefix) with a key below the first.
        let keys_body = 22 + 4 + 5;
        bytes[keys_body + 8..keys_body + 16].copy_from_slice(&1i64.to_le_bytes());
        assert!(matches!(
            deserialize::<i64, f64, _>(&bytes, I64Comparer),
            Err(CodecError::KeyOrder)
        ));
    }

    #[test]
    fn u64_keys_and_f32_values_roundtrip() {
        let series = SortedSeries::<u64, f32, _>::new(series_core::U64Comparer);
        series.set(1, 1.0).unwrap();
        series.set(5, 5.0).unwrap();
        let bytes = serialize(&series, SerializeOptions::default()).unwrap();
        let restored: SortedSeries<u64, f32, _> =
            deserialize(&bytes, series_core::U64Comparer).unwrap();
        assert_eq!(restored.to_vec(), vec![(1u64, 1.0f32), (5, 5.0)]);
    }
}
