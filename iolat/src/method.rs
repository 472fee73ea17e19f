use anyhow::{Result, anyhow, ensure};
use std::{fmt, str::FromStr};

use crate::bench::{self, BenchFn};

/// O_DIRECT transfers must be a multiple of the logical sector size.
pub const DIRECT_IO_ALIGN: usize = 512;

/// How the benchmark talks to the scratch file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// `write(2)`/`read(2)` at the file offset.
    Simple,
    /// `pwrite(2)`/`pread(2)` at explicit offsets.
    Positional,
    /// Like `Simple`, on a descriptor opened with O_DIRECT.
    Direct,
    /// `memcpy` through a shared mapping of the file.
    Mmap,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::Simple,
        Method::Positional,
        Method::Direct,
        Method::Mmap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Simple => "simple",
            Method::Positional => "p",
            Method::Direct => "direct",
            Method::Mmap => "mmap",
        }
    }

    /// Extra `open(2)` flags for the benchmarked descriptor.
    pub fn open_flags(&self) -> libc::c_int {
        match self {
            Method::Direct => libc::O_DIRECT,
            Method::Simple | Method::Positional | Method::Mmap => libc::O_SYNC,
        }
    }

    /// Reject block sizes the method cannot transfer.
    pub fn check_block_size(&self, size: usize, page_size: usize) -> Result<()> {
        match self {
            Method::Direct => ensure!(
                size % DIRECT_IO_ALIGN == 0,
                "block size {size} is not a multiple of {DIRECT_IO_ALIGN} bytes, \
                 which direct I/O requires"
            ),
            Method::Mmap => ensure!(
                size % page_size == 0,
                "block size {size} is not a multiple of the page size ({page_size} bytes), \
                 which mmap requires"
            ),
            Method::Simple | Method::Positional => {}
        }
        Ok(())
    }

    /// The `(write, read)` benchmark pair for this method.
    pub fn benchmarks(&self) -> (BenchFn, BenchFn) {
        match self {
            Method::Simple => (bench::simple_write, bench::simple_read),
            Method::Positional => (bench::positional_write, bench::positional_read),
            Method::Direct => (bench::direct_write, bench::direct_read),
            Method::Mmap => (bench::mmap_write, bench::mmap_read),
        }
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Method::ALL.iter().map(Method::name).collect();
                anyhow!(
                    "unknown I/O method `{s}` (expected one of: {})",
                    names.join(", ")
                )
            })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
