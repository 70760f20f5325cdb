/// File handling utilities
///
/// This module provides helpers for reading the dataset, fingerprinting it,
/// and placing report files.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use memmap2::Mmap;
use sha2::{Digest, Sha256};

/// Inputs above this size are memory-mapped instead of read into memory
pub const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Raw bytes of a dataset file
pub enum DatasetBytes {
    /// Memory-mapped contents of a large file
    Mapped(Mmap),
    /// Contents read into memory
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for DatasetBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            DatasetBytes::Mapped(mmap) => mmap,
            DatasetBytes::Owned(bytes) => bytes,
        }
    }
}

/// Read a dataset file, memory-mapping it when it is large.
///
/// # Arguments
///
/// * `file_path` - Path to the file
///
/// # Returns
///
/// The file contents
pub fn read_dataset(file_path: &Path) -> io::Result<DatasetBytes> {
    let size = fs::metadata(file_path)?.len();

    if size > MMAP_THRESHOLD {
        info!("Using memory-mapped read for large file ({} bytes)", size);
        let file = File::open(file_path)?;
        // The map is read-only and dropped before the loader returns
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(DatasetBytes::Mapped(mmap))
    } else {
        debug!("Reading {} bytes from {}", size, file_path.display());
        Ok(DatasetBytes::Owned(fs::read(file_path)?))
    }
}

/// SHA-256 of a file's contents, hex encoded
pub fn sha256_file(file_path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(file_path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Place a requested output file inside the output directory, if one is set.
///
/// Absolute paths are kept as given.
pub fn resolve_output_path(requested: &str, output_dir: Option<&Path>) -> PathBuf {
    let requested = PathBuf::from(requested);
    match output_dir {
        Some(dir) if requested.is_relative() => dir.join(requested),
        _ => requested,
    }
}

/// Default report path derived from the input file name, e.g. `imr_trends_analysis.json`
pub fn generate_output_path(output_dir: Option<&Path>, input: &Path, extension: &str) -> PathBuf {
    let file_stem = input.file_stem().unwrap_or_default();
    let output_filename = format!("{}_analysis{}", file_stem.to_string_lossy(), extension);
    match output_dir {
        Some(dir) => dir.join(output_filename),
        None => PathBuf::from(output_filename),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_small_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        let bytes = read_dataset(&path).unwrap();
        assert!(matches!(bytes, DatasetBytes::Owned(_)));
        assert_eq!(bytes.as_ref(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, "abc").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_output_paths() {
        let out = Path::new("reports");
        assert_eq!(
            resolve_output_path("summary.json", Some(out)),
            PathBuf::from("reports/summary.json")
        );
        assert_eq!(
            resolve_output_path("summary.json", None),
            PathBuf::from("summary.json")
        );
        assert_eq!(
            generate_output_path(Some(out), Path::new("data/imr_trends.csv"), ".html"),
            PathBuf::from("reports/imr_trends_analysis.html")
        );
    }
}
