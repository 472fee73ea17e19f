use anyhow::{Context, Result, ensure};
use indicatif::ProgressBar;
use log::{debug, info};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    os::{fd::IntoRawFd, unix::fs::OpenOptionsExt},
    path::Path,
};

use crate::method::Method;

/// Create `path` holding `count` copies of `block`, then reopen it for `method`.
///
/// The file is populated with a plain descriptor and synced, so read benchmarks have data to
/// read and none of this shows up in the measurements. The returned descriptor carries
/// [`Method::open_flags`].
pub fn prepare_file<P: AsRef<Path>>(
    path: P,
    method: Method,
    block: &[u8],
    count: u64,
) -> Result<File> {
    let path = path.as_ref();
    info!("=> preparing {} ({count} x {} bytes)", path.display(), block.len());

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o664)
        .open(path)
        .context(format!("open(2) failed for {}", path.display()))?;

    let pb = ProgressBar::new(count);
    for _ in 0..count {
        let written = file
            .write(block)
            .context(format!("write(2) failed while preparing {}", path.display()))?;
        ensure!(
            written == block.len(),
            "only {} of {} bytes were written while preparing {}",
            written,
            block.len(),
            path.display()
        );
        pb.inc(1);
    }
    pb.finish_and_clear();

    file.sync_all()
        .context(format!("fsync(2) failed for {}", path.display()))?;
    close(file).context(format!("close(2) failed for {}", path.display()))?;

    debug!("reopening {} with flags {:#o}", path.display(), method.open_flags());
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(method.open_flags())
        .open(path)
        .context(format!(
            "open(2) failed for {} with {method} flags",
            path.display()
        ))
}

/// Close `file`, reporting errors that dropping it would swallow.
fn close(file: File) -> std::io::Result<()> {
    // SAFETY: the descriptor is moved out of `file`, so it is closed exactly once.
    if unsafe { libc::close(file.into_raw_fd()) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
