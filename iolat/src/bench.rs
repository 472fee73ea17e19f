//! Timed write and read loops, one pair per [`Method`](crate::method::Method).
//!
//! Every function performs `count` transfers of `buf.len()` bytes against the prepared scratch
//! file and returns the mean latency of one transfer in microseconds. Setup that isn't part of
//! the transfer (seeking back to the start, mapping the file) happens outside the timed region.
//!
//! Nothing is retried. The first failing call ends the benchmark with an error naming the
//! benchmark, the call and where it was made.
use anyhow::{Context, Result, ensure};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    os::unix::fs::FileExt,
    time::Instant,
};

use crate::{mean_latency_us, mmap::FileMapping};

/// A benchmark: `(file, buf, count) -> mean latency in microseconds`.
pub type BenchFn = fn(&File, &mut [u8], u64) -> Result<f64>;

macro_rules! failed {
    ($bench:expr, $call:expr) => {
        || format!("{}: {} failed at {}:{}", $bench, $call, file!(), line!())
    };
}

/// Run `op` for every iteration in `0..count` and return the mean latency.
fn timed<F>(count: u64, mut op: F) -> Result<f64>
where
    F: FnMut(u64) -> Result<()>,
{
    let start = Instant::now();
    for i in 0..count {
        op(i)?;
    }
    Ok(mean_latency_us(start.elapsed(), count))
}

fn sequential_write(bench: &str, mut file: &File, buf: &[u8], count: u64) -> Result<f64> {
    timed(count, |_| {
        let n = file.write(buf).with_context(failed!(bench, "write(2)"))?;
        ensure!(n == buf.len(), "{bench}: short write(2), {n} of {} bytes", buf.len());
        Ok(())
    })
}

fn sequential_read(bench: &str, mut file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    file.seek(SeekFrom::Start(0))
        .with_context(failed!(bench, "lseek(2)"))?;

    let len = buf.len();
    timed(count, |_| {
        let n = file.read(buf).with_context(failed!(bench, "read(2)"))?;
        ensure!(n == len, "{bench}: short read(2), {n} of {len} bytes");
        Ok(())
    })
}

/// Byte offset of block `i`.
fn block_offset(i: u64, block: usize) -> u64 {
    i * block as u64
}

pub fn simple_write(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    sequential_write("simple_write", file, buf, count)
}

pub fn simple_read(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    sequential_read("simple_read", file, buf, count)
}

/// `pwrite(2)` block `i` at `i * buf.len()`, leaving the file offset alone.
pub fn positional_write(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    let buf = &*buf;
    timed(count, |i| {
        let n = file
            .write_at(buf, block_offset(i, buf.len()))
            .with_context(failed!("positional_write", "pwrite(2)"))?;
        ensure!(
            n == buf.len(),
            "positional_write: short pwrite(2), {n} of {} bytes",
            buf.len()
        );
        Ok(())
    })
}

pub fn positional_read(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    let len = buf.len();
    timed(count, |i| {
        let n = file
            .read_at(buf, block_offset(i, len))
            .with_context(failed!("positional_read", "pread(2)"))?;
        ensure!(n == len, "positional_read: short pread(2), {n} of {len} bytes");
        Ok(())
    })
}

/// Same loop as [`simple_write`]; the descriptor is expected to carry O_DIRECT, so this hits
/// the device rather than the page cache.
pub fn direct_write(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    sequential_write("direct_write", file, buf, count)
}

pub fn direct_read(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    sequential_read("direct_read", file, buf, count)
}

/// Map the `buf.len() * count` bytes the benchmark covers.
fn map_blocks(bench: &str, file: &File, block: usize, count: u64) -> Result<FileMapping> {
    let len = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(block))
        .context(format!(
            "{bench}: {count} blocks of {block} bytes do not fit in the address space"
        ))?;

    let map = FileMapping::new(file, len).context(format!("{bench}: mmap(2) failed"))?;
    map.advise_sequential()
        .context(format!("{bench}: madvise(2) failed"))?;
    Ok(map)
}

/// Copy the buffer into each mapped block and `msync(2)` it.
///
/// Mapping and unmapping the file is not timed.
pub fn mmap_write(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    let buf = &*buf;
    let block = buf.len();
    let mut map = map_blocks("mmap_write", file, block, count)?;

    let latency = timed(count, |i| {
        let off = block_offset(i, block) as usize;
        map.as_mut_slice()[off..off + block].copy_from_slice(buf);
        map.flush_range(off, block)
            .with_context(failed!("mmap_write", "msync(2)"))
    })?;

    map.unmap().context("mmap_write: munmap(2) failed")?;
    Ok(latency)
}

/// Copy each mapped block into the buffer. Reads need no flush.
pub fn mmap_read(file: &File, buf: &mut [u8], count: u64) -> Result<f64> {
    let block = buf.len();
    let map = map_blocks("mmap_read", file, block, count)?;

    let latency = timed(count, |i| {
        let off = block_offset(i, block) as usize;
        buf.copy_from_slice(&map.as_slice()[off..off + block]);
        Ok(())
    })?;

    map.unmap().context("mmap_read: munmap(2) failed")?;
    Ok(latency)
}
