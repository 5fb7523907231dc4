//! Persisting rendered configuration and certificate bundles.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to write {path}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Destination for rendered artifacts.
pub trait ArtifactWriter: Send + Sync {
    /// Absolute path of the proxy configuration file.
    fn config_path(&self) -> &Path;

    /// Absolute directory holding certificate bundles.
    fn ssl_dir(&self) -> &Path;

    fn write_config(&self, contents: &str) -> Result<(), WriteError>;

    /// Write `<ssl_dir>/<name>.pem`.
    fn write_certificate(&self, name: &str, bundle: &[u8]) -> Result<(), WriteError>;
}

/// Writes artifacts to the local filesystem.
///
/// Each file is written to a sibling temporary file and renamed into place,
/// so the proxy never reads a partially written file.
#[derive(Debug, Clone)]
pub struct FsWriter {
    config_path: PathBuf,
    ssl_dir: PathBuf,
}

impl FsWriter {
    /// Relative paths are resolved against the current directory.
    pub fn new(config_path: impl AsRef<Path>, ssl_dir: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            config_path: absolute(config_path.as_ref())?,
            ssl_dir: absolute(ssl_dir.as_ref())?,
        })
    }

    pub fn certificate_path(&self, name: &str) -> PathBuf {
        self.ssl_dir.join(format!("{}.pem", name))
    }
}

impl ArtifactWriter for FsWriter {
    fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn ssl_dir(&self) -> &Path {
        &self.ssl_dir
    }

    fn write_config(&self, contents: &str) -> Result<(), WriteError> {
        replace_file(&self.config_path, contents.as_bytes())
    }

    fn write_certificate(&self, name: &str, bundle: &[u8]) -> Result<(), WriteError> {
        fs::create_dir_all(&self.ssl_dir).map_err(|source| WriteError {
            path: self.ssl_dir.clone(),
            source,
        })?;
        replace_file(&self.certificate_path(name), bundle)
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|source| {
            let _ = fs::remove_file(&tmp);
            WriteError {
                path: path.to_path_buf(),
                source,
            }
        })
}

/// Certificate names become file names; refuse anything that could escape
/// the ssl directory.
pub fn is_safe_certificate_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}
