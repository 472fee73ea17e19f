//! Value parsers for the command line.
//!
//! These are plain `&str -> Result<T>` functions so clap can use them as `value_parser`s.
use anyhow::{Context, Result, ensure};

use crate::method::Method;

/// Parse an I/O method name.
///
/// # Examples
/// ```rust
/// use iolat::{args::parse_method, method::Method};
///
/// assert_eq!(parse_method("p").unwrap(), Method::Positional);
/// assert!(parse_method("bogus").is_err());
/// ```
pub fn parse_method(method: &str) -> Result<Method> {
    method.parse()
}

/// Parse the I/O block size in bytes.
pub fn parse_block_size(size: &str) -> Result<usize> {
    let size = parse_positive(size)?;
    usize::try_from(size).context(format!(
        "invalid argument `{size}`: block size does not fit in memory"
    ))
}

/// Parse the number of blocks to write and then read.
pub fn parse_count(count: &str) -> Result<u64> {
    parse_positive(count)
}

fn parse_positive(arg: &str) -> Result<u64> {
    let n = arg.parse::<u64>().context(format!(
        "invalid argument `{arg}`: expected a positive integer"
    ))?;
    ensure!(n > 0, "invalid argument `{arg}`: must be greater than zero");
    Ok(n)
}
