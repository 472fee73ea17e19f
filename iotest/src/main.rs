//! Measure per-operation file I/O latency.
//!
//! A scratch file of `count` blocks is written, then `count` blocks are written over it and read
//! back with the chosen method. The mean latency of one block transfer is printed for both.
//!
//! # Examples
//! iotest simple 4096 100 # write(2)/read(2) at the file offset, file opened with O_SYNC
//! iotest p 4096 100 # pwrite(2)/pread(2) at explicit offsets
//! iotest direct 4096 100 # like `simple` on an O_DIRECT descriptor, size must be a multiple of 512
//! iotest mmap 4096 100 # memcpy + msync(2) through a shared mapping, size must be page aligned
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, error::ErrorKind};
use colored::Colorize;
use humansize::{BINARY, format_size};
use iolat::{
    DEFAULT_TEST_FILE,
    args::{parse_block_size, parse_count, parse_method},
    buffer::{AlignedBuf, fill_pattern, verify_pattern},
    file::prepare_file,
    method::Method,
    vm_page_size,
};
use log::{LevelFilter, debug, warn};
use std::{io::Write, path::PathBuf};

const RULE: &str = "=============================================";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// I/O method: simple, p, direct or mmap
    method: String,
    /// block size in bytes
    #[arg(allow_negative_numbers = true)]
    size: String,
    /// number of blocks to write, then read
    #[arg(allow_negative_numbers = true)]
    count: String,
    /// scratch file, created or truncated and left behind
    #[arg(short = 'f', long, default_value = DEFAULT_TEST_FILE)]
    file: PathBuf,
    /// Verbose output.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,
    /// check that the read benchmark returned the written pattern
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// don't pin to the first CPU core
    #[arg(long, default_value_t = false)]
    no_pin: bool,
}

impl Args {
    /// Parse the method, block size and count, in that order.
    ///
    /// Clap only checks that all three are present, so a missing argument is reported before a
    /// bad value.
    fn benchmark(&self) -> Result<(Method, usize, u64)> {
        Ok((
            parse_method(&self.method)?,
            parse_block_size(&self.size)?,
            parse_count(&self.count)?,
        ))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (method, size, count) = match args.benchmark() {
        Ok(benchmark) => benchmark,
        Err(e) => Args::command().error(ErrorKind::ValueValidation, e).exit(),
    };
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: {}",
                record.level().to_string().blue(),
                record.args()
            )
        })
        .filter(
            None,
            if args.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
        )
        .init();

    let page_size = vm_page_size()?;
    debug!("vm page size: {}", page_size);
    method.check_block_size(size, page_size)?;

    // migrations between cores show up as latency spikes
    if !args.no_pin {
        match core_affinity::get_core_ids().and_then(|cores| cores.first().copied()) {
            Some(core) if core_affinity::set_for_current(core) => {
                debug!("pinned to core {}", core.id)
            }
            _ => warn!("unable to pin to a CPU core, results may be noisier"),
        }
    }

    println!();
    println!("{RULE}");
    println!("Testing I/O latency with {method}");
    println!("Buffer size: {size}");
    println!("Number of repeats: {count}");
    println!("{RULE}");

    debug!(
        "scratch file: {} ({})",
        args.file.display(),
        format_size((size as u64).saturating_mul(count), BINARY)
    );

    let mut buf = AlignedBuf::for_block(size, page_size)
        .context("failed to allocate the I/O buffer")?;
    fill_pattern(&mut buf);

    let file = prepare_file(&args.file, method, &buf, count)?;
    let (write, read) = method.benchmarks();

    let write_us = write(&file, &mut buf, count)?;
    println!("Write: {write_us:.6}us");
    let read_us = read(&file, &mut buf, count)?;
    println!("Read: {read_us:.6}us");
    println!("{RULE}");
    println!();

    if args.verify {
        verify_pattern(&buf).context("the read benchmark returned unexpected data")?;
        debug!("read buffer matches the written pattern");
    }

    Ok(())
}
