// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Compressed-array block codec.
//!
//! A block is `method: u8`, `count: u32` little-endian, then the payload.
//! `Raw` stores elements verbatim; `DeltaVarint` stores the first element
//! verbatim and every following element as a zigzag + LEB128 varint of its
//! first-order delta, which collapses regular timestamp runs to one or two
//! bytes per entry.

use crate::{
    scalar::{Scalar, WideInt},
    CodecError,
};

const BLOCK_HEADER: usize = 5;
const MAX_VARINT_BYTES: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    Raw,
    DeltaVarint,
}

impl CompressionMethod {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            CompressionMethod::Raw => 0,
            CompressionMethod::DeltaVarint => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            0 => Ok(CompressionMethod::Raw),
            1 => Ok(CompressionMethod::DeltaVarint),
            other => Err(CodecError::UnknownMethod(other)),
        }
    }
}

/// Element types the block codec can carry. Integers support both methods;
/// floats reject `DeltaVarint`.
pub trait BlockScalar: Scalar {
    fn compress(data: &[Self], method: CompressionMethod) -> Result<Vec<u8>, CodecError>;
    fn decompress(block: &[u8]) -> Result<Vec<Self>, CodecError>;
}

macro_rules! impl_int_block {
    ($($ty:ty),* $(,)?) => {$(
        impl BlockScalar for $ty {
            fn compress(data: &[Self], method: CompressionMethod) -> Result<Vec<u8>, CodecError> {
                match method {
                    CompressionMethod::Raw => Ok(raw_compress(data)),
                    CompressionMethod::DeltaVarint => delta_compress(data),
                }
            }

            fn decompress(block: &[u8]) -> Result<Vec<Self>, CodecError> {
                let (method, count, payload) = split_block(block)?;
                match method {
                    CompressionMethod::Raw => raw_decompress(count, payload),
                    CompressionMethod::DeltaVarint => delta_decompress(count, payload),
                }
            }
        }
    )*};
}

macro_rules! impl_float_block {
    ($($ty:ty),* $(,)?) => {$(
        impl BlockScalar for $ty {
            fn compress(data: &[Self], method: CompressionMethod) -> Result<Vec<u8>, CodecError> {
                match method {
                    CompressionMethod::Raw => Ok(raw_compress(data)),
                    CompressionMethod::DeltaVarint => Err(CodecError::UnsupportedMethod),
                }
            }

            fn decompress(block: &[u8]) -> Result<Vec<Self>, CodecError> {
                let (method, count, payload) = split_block(block)?;
                match method {
                    CompressionMethod::Raw => raw_decompress(count, payload),
                    CompressionMethod::DeltaVarint => Err(CodecError::UnsupportedMethod),
                }
            }
        }
    )*};
}

impl_int_block!(i32, u32, i64, u64);
impl_float_block!(f32, f64);

pub fn compress_block<T: BlockScalar>(
    data: &[T],
    method: CompressionMethod,
) -> Result<Vec<u8>, CodecError> {
    if data.len() > u32::MAX as usize {
        return Err(CodecError::Oversized);
    }
    T::compress(data, method)
}

pub fn decompress_block<T: BlockScalar>(block: &[u8]) -> Result<Vec<T>, CodecError> {
    T::decompress(block)
}

fn block_header<T: Scalar>(method: CompressionMethod, data: &[T], payload_hint: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOCK_HEADER + payload_hint);
    out.push(method.as_byte());
    (data.len() as u32).write_le(&mut out);
    out
}

fn split_block(block: &[u8]) -> Result<(CompressionMethod, usize, &[u8]), CodecError> {
    if block.len() < BLOCK_HEADER {
        return Err(CodecError::Truncated(block.len()));
    }
    let method = CompressionMethod::from_byte(block[0])?;
    let count = u32::read_le(&block[1..5]) as usize;
    Ok((method, count, &block[BLOCK_HEADER..]))
}

fn raw_compress<T: Scalar>(data: &[T]) -> Vec<u8> {
    let mut out = block_header(CompressionMethod::Raw, data, data.len() * T::WIDTH);
    for element in data {
        element.write_le(&mut out);
    }
    out
}

fn raw_decompress<T: Scalar>(count: usize, payload: &[u8]) -> Result<Vec<T>, CodecError> {
    let expected = count
        .checked_mul(T::WIDTH)
        .ok_or(CodecError::Oversized)?;
    if payload.len() != expected {
        return Err(CodecError::CountMismatch {
            expected,
            actual: payload.len(),
        });
    }
    Ok(payload
        .chunks_exact(T::WIDTH)
        .map(T::read_le)
        .collect())
}

fn delta_compress<T: WideInt>(data: &[T]) -> Result<Vec<u8>, CodecError> {
    let mut out = block_header(CompressionMethod::DeltaVarint, data, data.len() * 2);
    let Some(first) = data.first() else {
        return Ok(out);
    };
    first.write_le(&mut out);
    let mut previous = first.widen();
    for element in &data[1..] {
        let wide = element.widen();
        write_varint(zigzag(wide.wrapping_sub(previous)), &mut out);
        previous = wide;
    }
    Ok(out)
}

fn delta_decompress<T: WideInt>(count: usize, payload: &[u8]) -> Result<Vec<T>, CodecError> {
    if count == 0 {
        if !payload.is_empty() {
            return Err(CodecError::CountMismatch {
                expected: 0,
                actual: payload.len(),
            });
        }
        return Ok(Vec::new());
    }
    // Bound the header's count against the payload before sizing any
    // allocation from it: the first element is stored raw and every
    // further element occupies at least one varint byte, so a corrupted
    // count larger than the payload can never be legitimate.
    let min_len = T::WIDTH
        .checked_add(count - 1)
        .ok_or(CodecError::Oversized)?;
    if payload.len() < min_len {
        return Err(CodecError::Truncated(payload.len()));
    }
    let mut out = Vec::with_capacity(count);
    let first = T::read_le(payload);
    out.push(first);
    let mut previous = first.widen();
    let mut offset = T::WIDTH;
    for _ in 1..count {
        let (delta, read) = read_varint(&payload[offset..])
            .map_err(|_| CodecError::Truncated(offset))?;
        offset += read;
        previous = previous.wrapping_add(unzigzag(delta));
        out.push(T::narrow(previous));
    }
    if offset != payload.len() {
        return Err(CodecError::CountMismatch {
            expected: offset,
            actual: payload.len(),
        });
    }
    Ok(out)
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(encoded: u64) -> i64 {
    ((encoded >> 1) as i64) ^ -((encoded & 1) as i64)
}

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8]) -> Result<(u64, usize), ()> {
    let mut value = 0u64;
    for (index, byte) in bytes.iter().take(MAX_VARINT_BYTES).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    Err(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        let data = vec![1.5f64, -2.25, 0.0];
        let block = compress_block(&data, CompressionMethod::Raw).unwrap();
        assert_eq!(decompress_block::<f64>(&block).unwrap(), data);
    }

    #[test]
    fn delta_roundtrip_with_negative_steps() {
        let data = vec![100i64, 160, 220, 40, -5, i64::MAX, i64::MIN];
        let block = compress_block(&data, CompressionMethod::DeltaVarint).unwrap();
        assert_eq!(decompress_block::<i64>(&block).unwrap(), data);
    }

    #[test]
    fn delta_collapses_regular_runs() {
        let data: Vec<i64> = (0..1_000).map(|i| 1_600_000_000_000 + i * 60).collect();
        let block = compress_block(&data, CompressionMethod::DeltaVarint).unwrap();
        let raw = compress_block(&data, CompressionMethod::Raw).unwrap();
        assert!(block.len() * 3 < raw.len(), "{} vs {}", block.len(), raw.len());
        assert_eq!(decompress_block::<i64>(&block).unwrap(), data);
    }

    #[test]
    fn delta_rejected_for_floats() {
        assert!(matches!(
            compress_block(&[1.0f64], CompressionMethod::DeltaVarint),
            Err(CodecError::UnsupportedMethod)
        ));
    }

    #[test]
    fn empty_blocks_roundtrip() {
        for method in [CompressionMethod::Raw, CompressionMethod::DeltaVarint] {
            let block = compress_block::<i64>(&[], method).unwrap();
            assert_eq!(decompress_block::<i64>(&block).unwrap(), Vec::<i64>::new());
        }
    }

    #[test]
    fn truncated_block_is_detected() {
        let data = vec![10i64, 20, 30];
        let block = compress_block(&data, CompressionMethod::DeltaVarint).unwrap();
        assert!(matches!(
            decompress_block::<i64>(&block[..block.len() - 1]),
            Err(CodecError::Truncated(_) | CodecError::CountMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_delta_count_is_rejected_before_allocating() {
        let mut block = compress_block(&[10i64, 20], CompressionMethod::DeltaVarint).unwrap();
        block[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decompress_block::<i64>(&block),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn corrupt_raw_count_is_rejected() {
        let mut block = compress_block(&[10i64, 20], CompressionMethod::Raw).unwrap();
        block[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decompress_block::<i64>(&block),
            Err(CodecError::CountMismatch { .. } | CodecError::Oversized)
        ));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let mut block = compress_block(&[1i64], CompressionMethod::Raw).unwrap();
        block[0] = 9;
        assert!(matches!(
            decompress_block::<i64>(&block),
            Err(CodecError::UnknownMethod(9))
        ));
    }

    #[test]
    fn u64_values_beyond_i64_survive_delta() {
        let data = vec![u64::MAX - 2, u64::MAX - 1, u64::MAX];
        let block = compress_block(&data, CompressionMethod::DeltaVarint).unwrap();
        assert_eq!(decompress_block::<u64>(&block).unwrap(), data);
    }
}
