use anyhow::{Context, Result};
use nix::unistd::{SysconfVar, sysconf};
use std::time::Duration;

pub mod args;
pub mod bench;
pub mod buffer;
pub mod file;
pub mod method;
pub mod mmap;

/// The scratch file used when no path is given.
pub const DEFAULT_TEST_FILE: &str = "test_file.tmp";

const SEC_TO_USEC: f64 = 1_000_000.0;

/// Mean latency of one operation in microseconds, given the wall-clock time for `ops`
/// operations.
///
/// ```rust
/// use std::time::Duration;
/// use iolat::mean_latency_us;
///
/// assert_eq!(mean_latency_us(Duration::from_millis(1), 10), 100.0);
/// ```
pub fn mean_latency_us(elapsed: Duration, ops: u64) -> f64 {
    elapsed.as_secs_f64() * SEC_TO_USEC / ops as f64
}

pub fn vm_page_size() -> Result<usize> {
    Ok(sysconf(SysconfVar::PAGE_SIZE)
        .context("failed to get sys page size")?
        .expect("page_size should be a supported option") as usize)
}
