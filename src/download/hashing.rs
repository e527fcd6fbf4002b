//! Streamed checksums of downloaded files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use sha2::Sha256;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Fast and strong checksum of one file, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    /// MD5 digest.
    pub md5: String,
    /// SHA-256 digest.
    pub sha256: String,
}

/// Hashes `path` with MD5 and SHA-256 in a single pass, constant memory.
///
/// Runs on the blocking pool.
///
/// # Errors
///
/// Returns the IO error if the file cannot be read.
pub async fn hash_file(path: &Path) -> std::io::Result<FileHashes> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn hash_file_blocking(path: &Path) -> std::io::Result<FileHashes> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0_u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        md5.update(&buffer[..read]);
        sha256.update(&buffer[..read]);
    }

    Ok(FileHashes {
        md5: format!("{:x}", md5.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}
