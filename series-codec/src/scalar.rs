// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Fixed-width little-endian element encoding.

/// An element with a fixed little-endian wire width.
pub trait Scalar: Copy {
    const WIDTH: usize;

    fn write_le(&self, out: &mut Vec<u8>);

    /// Reads one element; the caller guarantees `bytes.len() >= WIDTH`.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn write_le(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                Self::from_le_bytes(raw)
            }
        }
    )*};
}

impl_scalar!(i32, u32, i64, u64, f32, f64);

/// Integer widening into a common signed space for delta encoding. All
/// conversions are wrapping, so round-trips are exact for every value.
pub(crate) trait WideInt: Scalar {
    fn widen(self) -> i64;
    fn narrow(wide: i64) -> Self;
}

impl WideInt for i64 {
    fn widen(self) -> i64 {
        self
    }

    fn narrow(wide: i64) -> Self {
        wide
    }
}

impl WideInt for u64 {
    fn widen(self) -> i64 {
        self as i64
    }

    fn narrow(wide: i64) -> Self {
        wide as u64
    }
}

impl WideInt for i32 {
    fn widen(self) -> i64 {
        self as i64
    }

    fn narrow(wide: i64) -> Self {
        wide as i32
    }
}

impl WideInt for u32 {
    fn widen(self) -> i64 {
        self as u32 as i64
    }

    fn narrow(wide: i64) -> Self {
        wide as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let mut out = Vec::new();
        (-5i64).write_le(&mut out);
        7.5f64.write_le(&mut out);
        assert_eq!(out.len(), 16);
        assert_eq!(i64::read_le(&out[..8]), -5);
        assert_eq!(f64::read_le(&out[8..]), 7.5);
    }

    #[test]
    fn widen_narrow_is_lossless() {
        for value in [0u64, 1, u64::MAX, u64::MAX / 2 + 1] {
            assert_eq!(u64::narrow(value.widen()), value);
        }
        for value in [i32::MIN, -1, 0, i32::MAX] {
            assert_eq!(i32::narrow(value.widen()), value);
        }
    }
}
