//! Row-major N-dimensional arrays.
//!
//! Arrays whose shape is fixed by the schema are plain nested Rust arrays
//! (`[[T; 3]; 2]`) and need no type of their own. The two types here cover the
//! remaining cases:
//!
//! - [`NdArray<T, D>`]: rank fixed at `D`, dimensions stored in the data as
//!   `D` varints followed by the elements.
//! - [`DynamicNdArray<T>`]: rank stored too, as a varint before the dimensions.

use std::io::{Read, Write};

use super::BinaryCodec;
use super::collections::read_count;
use crate::error::{Result, StepcodeError};
use crate::io::{CodedInputStream, CodedOutputStream};

fn element_count(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim)
            .ok_or_else(|| StepcodeError::Format(format!("array shape {shape:?} overflows")))
    })
}

fn check_shape(shape: &[usize], len: usize) -> Result<()> {
    let expected = element_count(shape)?;
    if expected == len {
        Ok(())
    } else {
        Err(StepcodeError::Format(format!(
            "array shape {shape:?} needs {expected} elements, found {len}"
        )))
    }
}

/// An array of fixed rank `D` and runtime dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray<T, const D: usize> {
    shape: [usize; D],
    data: Vec<T>,
}

impl<T, const D: usize> NdArray<T, D> {
    /// Builds an array from row-major `data`, checking it fills `shape` exactly.
    pub fn new(shape: [usize; D], data: Vec<T>) -> Result<Self> {
        check_shape(&shape, data.len())?;
        Ok(Self { shape, data })
    }

    /// Dimensions, outermost first.
    pub fn shape(&self) -> &[usize; D] {
        &self.shape
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Element at the given coordinates, or `None` if out of bounds.
    pub fn get(&self, index: [usize; D]) -> Option<&T> {
        let mut flat = 0;
        for (i, dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        self.data.get(flat)
    }

    /// Consumes the array, returning its elements.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

impl<T: BinaryCodec, const D: usize> BinaryCodec for NdArray<T, D> {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        for &dim in &self.shape {
            stream.write_varint_u64(dim as u64)?;
        }
        T::write_slice(&self.data, stream)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let mut shape = [0usize; D];
        for dim in &mut shape {
            *dim = read_count(stream)?;
        }
        let data = T::read_vec(element_count(&shape)?, stream)?;
        Ok(Self { shape, data })
    }
}

/// An array whose rank is only known at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicNdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> DynamicNdArray<T> {
    /// Builds an array from row-major `data`, checking it fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        check_shape(&shape, data.len())?;
        Ok(Self { shape, data })
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Dimensions, outermost first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[T] {
        &self.data
    }
}

impl<T: BinaryCodec> BinaryCodec for DynamicNdArray<T> {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_varint_u64(self.shape.len() as u64)?;
        for &dim in &self.shape {
            stream.write_varint_u64(dim as u64)?;
        }
        T::write_slice(&self.data, stream)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let rank = read_count(stream)?;
        let mut shape = Vec::with_capacity(rank.min(64));
        for _ in 0..rank {
            shape.push(read_count(stream)?);
        }
        let data = T::read_vec(element_count(&shape)?, stream)?;
        Ok(Self { shape, data })
    }
}
