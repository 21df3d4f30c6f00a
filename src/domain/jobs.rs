use super::keys::AssetKeys;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which half of an ingested pair a job or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFile {
    Original,
    Watermarked,
}

impl fmt::Display for AssetFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetFile::Original => f.write_str("original"),
            AssetFile::Watermarked => f.write_str("watermarked"),
        }
    }
}

/// One local file headed for one object-storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    pub file: AssetFile,
    pub source_path: PathBuf,
    pub folder: String,
    pub filename: String,
    pub content_type: String,
}

impl UploadJob {
    pub fn new(file: AssetFile, source_path: &Path, keys: &AssetKeys) -> Self {
        let filename = match file {
            AssetFile::Original => keys.original_key(),
            AssetFile::Watermarked => keys.watermarked_key(),
        };
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        Self {
            file,
            source_path: source_path.to_path_buf(),
            folder: keys.folder(),
            filename,
            content_type,
        }
    }

    /// Full object key, `folder/filename`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.folder, self.filename)
    }
}

/// The two jobs produced by one ingest, original first.
pub fn upload_jobs(original: &Path, watermarked: &Path, keys: &AssetKeys) -> [UploadJob; 2] {
    [
        UploadJob::new(AssetFile::Original, original, keys),
        UploadJob::new(AssetFile::Watermarked, watermarked, keys),
    ]
}
