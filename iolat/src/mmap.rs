//! A shared, writable mapping of a file region.
use anyhow::{Context, Result, ensure};
use colored::Colorize;
use libc::{
    MADV_SEQUENTIAL, MAP_FAILED, MAP_SHARED, MS_SYNC, PROT_READ, PROT_WRITE, c_void, madvise,
    mmap64, msync, munmap,
};
use log::debug;
use std::{
    fs::File,
    mem::ManuallyDrop,
    os::fd::{AsFd, AsRawFd},
    ptr, slice,
};

macro_rules! cvt {
    ($expr:expr) => {{
        let ret = $expr;
        if ret == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }};
}

pub struct FileMapping {
    addr: *mut c_void,
    len: usize,
}

impl FileMapping {
    /// Map the first `len` bytes of `file` read/write and shared, so stores reach the file.
    pub fn new(file: &File, len: usize) -> Result<Self> {
        ensure!(len > 0, "cannot map an empty region");

        // SAFETY: a fresh mapping chosen by the kernel, nothing else aliases it.
        let addr = unsafe {
            mmap64(
                ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                file.as_fd().as_raw_fd(),
                0,
            )
        };

        if addr == MAP_FAILED {
            return Err(std::io::Error::last_os_error())
                .context(format!("mmap(2) of {len} bytes failed"));
        }

        debug!(
            "mapped {} bytes of fd {} at {:p}",
            len.to_string().bold(),
            file.as_raw_fd(),
            addr
        );

        Ok(Self { addr, len })
    }

    /// Tell the kernel the mapping will be walked front to back.
    pub fn advise_sequential(&self) -> Result<()> {
        cvt!(unsafe { madvise(self.addr, self.len, MADV_SEQUENTIAL) })
            .context("madvise(2) failed on the mapped region")
    }

    /// Synchronously write back `len` bytes starting at `offset`.
    ///
    /// `offset` must be page aligned.
    pub fn flush_range(&self, offset: usize, len: usize) -> Result<()> {
        ensure!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "flush of {len} bytes at {offset} is outside the {} byte mapping",
            self.len
        );
        // SAFETY: the range was checked to lie within the mapping.
        cvt!(unsafe { msync(self.addr.cast::<u8>().add(offset).cast(), len, MS_SYNC) })
            .context(format!("msync(2) failed for {len} bytes at offset {offset}"))
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is `len` bytes and lives as long as `self`.
        unsafe { slice::from_raw_parts(self.addr.cast(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.addr.cast(), self.len) }
    }

    /// Unmap, reporting a failed `munmap(2)`.
    pub fn unmap(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: we are unmapping a region we own and no longer use.
        cvt!(unsafe { munmap(this.addr, this.len) })
            .context(format!("munmap(2) of {} bytes failed", this.len))
    }
}

impl Drop for FileMapping {
    fn drop(&mut self) {
        // SAFETY: as in `unmap`, errors are ignored since we can't report them here.
        let _ = unsafe { munmap(self.addr, self.len) };
    }
}
