use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Request-scoped scratch directory holding the upload and its derivative.
///
/// Removed with everything in it when dropped, whether the run succeeded or not.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn create_in(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("ingest-").tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the client's file is written. Only the extension of the client
    /// name is kept, so the name itself cannot escape the directory.
    pub fn original_path(&self, client_file_name: &str) -> PathBuf {
        self.dir.path().join(staged_name("original", client_file_name))
    }

    /// Where the engine writes its output; same extension so the muxer matches.
    pub fn watermarked_path(&self, client_file_name: &str) -> PathBuf {
        self.dir
            .path()
            .join(staged_name("watermarked", client_file_name))
    }
}

fn staged_name(stem: &str, client_file_name: &str) -> String {
    let extension = Path::new(client_file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}
