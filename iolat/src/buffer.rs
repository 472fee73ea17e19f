//! The block buffer shared by every benchmark.
use anyhow::{Result, bail, ensure};
use libc::{c_void, free, posix_memalign};
use log::debug;
use std::{
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    slice,
};

/// A heap buffer with a caller-chosen alignment, suitable for O_DIRECT transfers.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuf {
    /// Allocate `len` bytes aligned to `align`, which must be a power of two.
    pub fn new(len: usize, align: usize) -> Result<Self> {
        ensure!(len > 0, "cannot allocate an empty buffer");
        ensure!(
            align.is_power_of_two() && align >= size_of::<*mut c_void>(),
            "invalid buffer alignment {align}"
        );

        let mut p: *mut c_void = ptr::null_mut();
        // SAFETY: `p` is a valid out pointer and `align` was checked above.
        let ret = unsafe { posix_memalign(&mut p, align, len) };
        if ret != 0 {
            bail!(
                "posix_memalign({align}, {len}) failed: {}",
                std::io::Error::from_raw_os_error(ret)
            );
        }

        match NonNull::new(p.cast::<u8>()) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => bail!("posix_memalign({align}, {len}) returned null"),
        }
    }

    /// Allocate a buffer for `block_size` byte transfers.
    ///
    /// Power-of-two blocks are aligned to their own size. Anything else falls back to the page
    /// size, which still satisfies O_DIRECT.
    pub fn for_block(block_size: usize, page_size: usize) -> Result<Self> {
        let align = if block_size.is_power_of_two() {
            block_size.max(size_of::<*mut c_void>())
        } else {
            page_size
        };
        debug!("allocating a {block_size} byte buffer aligned to {align}");
        Self::new(block_size, align)
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the allocation is `len` bytes and lives as long as `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: allocated by posix_memalign and never freed elsewhere.
        unsafe { free(self.ptr.as_ptr().cast()) }
    }
}

/// The byte expected at offset `j` of every block.
pub fn pattern_byte(j: usize) -> u8 {
    b'a' + (j % 26) as u8
}

/// Fill `buf` with `abc...xyzabc...`.
pub fn fill_pattern(buf: &mut [u8]) {
    for (j, b) in buf.iter_mut().enumerate() {
        *b = pattern_byte(j);
    }
}

/// Check that `buf` still holds the pattern written by [`fill_pattern`].
pub fn verify_pattern(buf: &[u8]) -> Result<()> {
    if let Some((j, b)) = buf
        .iter()
        .enumerate()
        .find(|(j, b)| **b != pattern_byte(*j))
    {
        bail!(
            "buffer mismatch at offset {j}: expected {:?}, found {:?}",
            pattern_byte(j) as char,
            *b as char
        );
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pattern() {
        let mut buf = vec![0u8; 30];
        fill_pattern(&mut buf);
        assert_eq!(&buf, b"abcdefghijklmnopqrstuvwxyzabcd");
        assert!(verify_pattern(&buf).is_ok());

        buf[27] = b'z';
        let err = verify_pattern(&buf).unwrap_err();
        assert_eq!(
            err.to_string(),
            "buffer mismatch at offset 27: expected 'b', found 'z'"
        );
    }

    #[test]
    fn power_of_two_blocks_are_self_aligned() {
        for size in [512, 4096, 65536] {
            let buf = AlignedBuf::for_block(size, 4096).unwrap();
            assert_eq!(buf.len(), size);
            assert_eq!(buf.as_ptr() as usize % size, 0);
        }
    }

    #[test]
    fn other_blocks_are_page_aligned() {
        let buf = AlignedBuf::for_block(1536, 4096).unwrap();
        assert_eq!(buf.len(), 1536);
        assert_eq!(buf.as_ptr() as usize % 4096, 0);

        let buf = AlignedBuf::for_block(1, 4096).unwrap();
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn writable() {
        let mut buf = AlignedBuf::for_block(100, 4096).unwrap();
        fill_pattern(&mut buf);
        assert!(verify_pattern(&buf).is_ok());
        assert_eq!(buf[99], b'v');
    }

    #[test]
    fn bad_alignment() {
        assert!(AlignedBuf::new(64, 3).is_err());
        assert!(AlignedBuf::new(0, 4096).is_err());
    }
}
