//! Launch argument arena.
//!
//! Kernel launches take an array of pointers, one per parameter, each
//! pointing at that parameter's bytes. [`ParameterBuffer`] packs heterogeneous
//! values into one region with natural alignment and hands out that pointer
//! array once packing is done.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use bytemuck::{Pod, Zeroable};

/// Largest alignment a pushed value may require.
pub const MAX_ALIGN: usize = 16;

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy)]
struct Chunk([u8; MAX_ALIGN]);

unsafe impl Zeroable for Chunk {}
unsafe impl Pod for Chunk {}

#[derive(Debug, Default)]
pub struct ParameterBuffer {
    storage: Vec<Chunk>,
    cursor: usize,
    offsets: Vec<usize>,
}

impl ParameterBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coarse pre-sizing: assume 8 bytes per argument.
    pub fn with_capacity(num_args: usize) -> Self {
        Self {
            storage: Vec::with_capacity((num_args * 8).div_ceil(MAX_ALIGN)),
            cursor: 0,
            offsets: Vec::with_capacity(num_args),
        }
    }

    /// Append `value` at the next offset aligned for `T`.
    ///
    /// Zero-sized values still take a slot so the pointer array keeps one
    /// entry per launch-visible parameter.
    pub fn push<T: Pod>(&mut self, value: T) {
        const { assert!(align_of::<T>() <= MAX_ALIGN) };

        let offset = self.cursor.next_multiple_of(align_of::<T>());
        let end = offset + size_of::<T>();
        let chunks = end.div_ceil(MAX_ALIGN);
        if self.storage.len() < chunks {
            self.storage.resize(chunks, Chunk::zeroed());
        }
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.storage);
        bytes[offset..end].copy_from_slice(bytemuck::bytes_of(&value));

        self.offsets.push(offset);
        self.cursor = end;
    }

    /// Append a null device pointer.
    pub fn push_null(&mut self) {
        self.push(0usize);
    }

    /// Number of packed values.
    pub fn size(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Bytes in use, including alignment padding.
    pub fn byte_len(&self) -> usize {
        self.cursor
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Copy the `index`-th packed value back out.
    pub fn read<T: Pod>(&self, index: usize) -> Option<T> {
        let offset = *self.offsets.get(index)?;
        let bytes: &[u8] = bytemuck::cast_slice(&self.storage);
        let end = offset + size_of::<T>();
        if end > self.cursor {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(&bytes[offset..end]))
    }

    /// Pointer array for a launch, in push order.
    ///
    /// The returned value borrows the buffer mutably, so nothing can be
    /// pushed (and the storage cannot move) while the pointers are alive.
    pub fn get_ptrs(&mut self) -> LaunchArgs<'_> {
        let base = self.storage.as_mut_ptr() as *mut u8;
        let ptrs = self
            .offsets
            .iter()
            .map(|&offset| base.wrapping_add(offset) as *mut c_void)
            .collect();
        LaunchArgs {
            ptrs,
            _buffer: PhantomData,
        }
    }
}

/// Pointers into a [`ParameterBuffer`], valid for as long as this value is.
#[derive(Debug)]
pub struct LaunchArgs<'a> {
    ptrs: Vec<*mut c_void>,
    _buffer: PhantomData<&'a mut ParameterBuffer>,
}

impl LaunchArgs<'_> {
    pub fn as_mut_slice(&mut self) -> &mut [*mut c_void] {
        &mut self.ptrs
    }

    pub fn as_slice(&self) -> &[*mut c_void] {
        &self.ptrs
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }
}
