//! ZIP bundling of rendered reports.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
}

/// Write every file into a new ZIP archive at `archive`.
///
/// Entries are stored flat under their file names.
pub fn bundle(files: &[PathBuf], archive: &Path) -> Result<(), ArchiveError> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArchiveError::NoFileName(path.clone()))?;
        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    let mut out = zip.finish()?;
    io::Write::flush(&mut out)?;
    tracing::debug!("Wrote {} files to {}", files.len(), archive.display());
    Ok(())
}

/// Bundle every regular file in `dir` into `<dir>.zip`, then remove `dir`.
pub fn bundle_directory(dir: &Path) -> Result<PathBuf, ArchiveError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut archive_name = dir
        .file_name()
        .ok_or_else(|| ArchiveError::NoFileName(dir.to_path_buf()))?
        .to_os_string();
    archive_name.push(".zip");
    let archive = dir.with_file_name(archive_name);
    bundle(&files, &archive)?;

    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!("Failed to remove staging directory {}: {}", dir.display(), e);
    }
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_bundle_directory() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("2024-01-08_01-00-00_Weekly-report");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("a.txt"), "alpha").unwrap();
        fs::write(staging.join("b.json"), "{}").unwrap();

        let archive = bundle_directory(&staging).unwrap();
        assert_eq!(archive, tmp.path().join("2024-01-08_01-00-00_Weekly-report.zip"));
        assert!(!staging.exists());

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut text = String::new();
        zip.by_name("a.txt").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "alpha");
        assert!(zip.by_name("b.json").is_ok());
    }

    #[test]
    fn test_bundle_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        let result = bundle(&[tmp.path().join("missing.txt")], &tmp.path().join("out.zip"));
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }
}
