use crate::core::error::AndroshError;
use sha2::{Digest, Sha512};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const USER_AGENT: &str = concat!("androsh/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);
const DOWNLOAD_ATTEMPTS: usize = 3;

/// Network side of provisioning. Every call blocks until the transfer is done.
pub trait Downloader {
    fn fetch_text(&self, url: &str) -> Result<String, AndroshError>;

    fn download(&self, url: &str, dest: &Path) -> Result<(), AndroshError>;

    fn download_many(&self, urls: &[String], dests: &[PathBuf]) -> Result<(), AndroshError> {
        if urls.len() != dests.len() {
            return Err(AndroshError::Configuration(format!(
                "download_many: {} urls for {} destinations",
                urls.len(),
                dests.len()
            )));
        }
        for (url, dest) in urls.iter().zip(dests) {
            self.download(url, dest)?;
        }
        Ok(())
    }
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, AndroshError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    fn download_once(&self, url: &str, dest: &Path) -> Result<u64, AndroshError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut response = self.client.get(url).send()?.error_for_status()?;
        stream_to_file(&mut response, dest)
    }
}

/// Stream `reader` into a sibling `.part` file, then rename it over `dest`.
/// A failed transfer removes the part file and leaves `dest` untouched.
fn stream_to_file(reader: &mut impl Read, dest: &Path) -> Result<u64, AndroshError> {
    let part = dest.with_extension("part");
    let result = (|| -> Result<u64, AndroshError> {
        let mut out = File::create(&part)?;
        let mut buffer = vec![0_u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            out.write_all(&buffer[..read])?;
            written += read as u64;
        }
        out.sync_all()?;
        drop(out);
        fs::rename(&part, dest)?;
        Ok(written)
    })();

    if result.is_err()
        && let Err(e) = fs::remove_file(&part)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!(path = %part.display(), error = %e, "could not remove partial download");
    }
    result
}

impl Downloader for HttpDownloader {
    fn fetch_text(&self, url: &str) -> Result<String, AndroshError> {
        tracing::debug!(url, "fetching");
        Ok(self.client.get(url).send()?.error_for_status()?.text()?)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), AndroshError> {
        let mut last_err = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.download_once(url, dest) {
                Ok(bytes) => {
                    tracing::info!(url, dest = %dest.display(), bytes, "downloaded");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(url, attempt, error = %err, "download failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AndroshError::Configuration(format!("failed to download {}; no attempts left", url))
        }))
    }
}

/// Lowercase hex SHA-512 of a file, streamed.
pub fn compute_sha512(path: &Path) -> Result<String, AndroshError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0_u8; 32 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whether `path` hashes to `expected` (hex, any case).
pub fn checksum_matches(path: &Path, expected: &str) -> Result<bool, AndroshError> {
    Ok(compute_sha512(path)?.eq_ignore_ascii_case(expected.trim()))
}
