//! Full and partial content digests.
//!
//! `full_hash` is an MD5 of the whole stream, used to content-address
//! backup blobs and as the final confirmation stage of change detection.
//! `partial_hash` inspects three 4 KiB windows so the tracking manager can
//! reject "same mtime, same size" false negatives without paying for a full
//! read on every change notification.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::thread;
use std::time::Duration;

const WINDOW: usize = 4096;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum HashError {
    Io(std::io::Error),
}

impl std::fmt::Display for HashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error while hashing: {e}"),
        }
    }
}

impl std::error::Error for HashError {}

impl From<std::io::Error> for HashError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// MD5 digest of the entire file, retried up to 3 times with a 100 ms
/// linear backoff on transient I/O errors. Opened for shared read so a
/// concurrent writer does not block this read.
pub fn full_hash(path: &Path) -> Result<String, HashError> {
    with_retries(|| {
        let mut file = File::open(path)?;
        let mut context = md5::Context::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            context.consume(&buf[..n]);
        }
        Ok(format!("{:x}", context.compute()))
    })
}

/// Digest of up to three 4 KiB windows (start, middle, end), concatenated
/// and hashed together. The middle window is included only if the file is
/// larger than 8 KiB; the end window only if larger than 4 KiB. Two files
/// with equal size and equal partial hash are *likely* identical but are
/// not proven so — callers that need certainty fall back to `full_hash` or
/// a byte-by-byte compare.
pub fn partial_hash(path: &Path) -> Result<String, HashError> {
    with_retries(|| {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut context = md5::Context::new();
        context.consume(read_window(&mut file, 0, WINDOW)?);

        if size > 8192 {
            let mid = size / 2 - (WINDOW as u64 / 2).min(size / 2);
            context.consume(read_window(&mut file, mid, WINDOW)?);
        }

        if size > 4096 {
            let tail_start = size.saturating_sub(WINDOW as u64);
            context.consume(read_window(&mut file, tail_start, WINDOW)?);
        }

        Ok(format!("{:x}", context.compute()))
    })
}

fn read_window(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, std::io::Error> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(buf)
}

fn with_retries<F>(mut op: F) -> Result<String, HashError>
where
    F: FnMut() -> Result<String, std::io::Error>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_transient(&e) && attempt + 1 < RETRY_ATTEMPTS => {
                attempt += 1;
                thread::sleep(RETRY_BACKOFF * attempt);
            }
            Err(e) => return Err(HashError::Io(e)),
        }
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
