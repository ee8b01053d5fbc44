//! Owned byte buffers for cell values and validity bytemaps.
//!
//! Both types have a single owner and no `Clone` impl: any duplication of
//! value or validity bytes must be an explicit relocation through
//! [`OwnedBuffer::into_vec`], [`OwnedBuffer::take`] or
//! [`ValidityVector::take_bytemap`]. Growth is fallible and surfaces
//! [`ArrayError::Allocation`] instead of aborting the process.

use crate::error::{ArrayError, Result};

/// An owned, growable byte buffer with explicit, fallible resizing.
#[derive(Debug, Default)]
pub struct OwnedBuffer {
    data: Vec<u8>,
}

impl OwnedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with at least `capacity` bytes reserved.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if the reservation fails.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buf = Self::new();
        buf.reserve(capacity)?;
        Ok(buf)
    }

    /// Creates a buffer owning `data` without copying.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Reserves space for at least `additional` more bytes.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if the reservation fails.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.data
            .try_reserve_exact(additional)
            .map_err(|_| ArrayError::Allocation(additional))
    }

    /// Resizes the buffer to `new_len` bytes, zero-filling any growth.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if growth fails.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.data.len() {
            self.reserve(new_len - self.data.len())?;
        }
        self.data.resize(new_len, 0);
        Ok(())
    }

    /// Appends `bytes` to the buffer.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if growth fails.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read access to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Write access to the buffer contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer, relocating its bytes to the caller.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Relocates the contents into a new buffer, leaving this one empty.
    pub fn take(&mut self) -> OwnedBuffer {
        OwnedBuffer {
            data: std::mem::take(&mut self.data),
        }
    }
}

/// A validity bytemap for one nullable attribute buffer.
///
/// One byte per cell; non-zero means the cell holds a valid (non-null)
/// value. The vector is owned exclusively by the attribute buffer it
/// describes and is never implicitly duplicated.
#[derive(Debug, Default)]
pub struct ValidityVector {
    bytes: Vec<u8>,
}

impl ValidityVector {
    /// Creates an empty validity vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vector of `len` cells, all set to `valid`.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if the allocation fails.
    pub fn with_len(len: usize, valid: bool) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| ArrayError::Allocation(len))?;
        bytes.resize(len, u8::from(valid));
        Ok(Self { bytes })
    }

    /// Creates a vector owning an existing bytemap without copying.
    pub fn from_bytemap(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Number of cells tracked.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if no cells are tracked.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns true if cell `idx` holds a valid value.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.bytes[idx] != 0
    }

    /// Sets the validity of cell `idx`.
    pub fn set(&mut self, idx: usize, valid: bool) {
        self.bytes[idx] = u8::from(valid);
    }

    /// Appends one cell's validity.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if growth fails.
    pub fn push(&mut self, valid: bool) -> Result<()> {
        if self.bytes.len() == self.bytes.capacity() {
            self.bytes
                .try_reserve(1)
                .map_err(|_| ArrayError::Allocation(1))?;
        }
        self.bytes.push(u8::from(valid));
        Ok(())
    }

    /// Read access to the raw bytemap.
    pub fn as_bytemap(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the vector, relocating the bytemap to the caller.
    pub fn take_bytemap(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_buffer_resize_zero_fills() {
        let mut buf = OwnedBuffer::new();
        buf.extend_from_slice(&[1, 2, 3]).unwrap();
        buf.resize(5).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3, 0, 0]);
        buf.resize(2).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_owned_buffer_take_relocates() {
        let mut buf = OwnedBuffer::from_vec(vec![7, 8]);
        let moved = buf.take();
        assert!(buf.is_empty());
        assert_eq!(moved.as_slice(), &[7, 8]);
    }

    #[test]
    fn test_validity_vector_roundtrip() {
        let mut v = ValidityVector::with_len(3, true).unwrap();
        v.set(1, false);
        assert!(v.is_valid(0));
        assert!(!v.is_valid(1));
        assert!(v.is_valid(2));
        assert_eq!(v.take_bytemap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_validity_vector_push() {
        let mut v = ValidityVector::new();
        v.push(true).unwrap();
        v.push(false).unwrap();
        assert_eq!(v.as_bytemap(), &[1, 0]);
    }
}
