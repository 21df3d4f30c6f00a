//! Deterministic object-storage naming for ingested assets.
//!
//! Every object lives under `{uuid}/{media}/` so a product's assets can be
//! listed or swept by prefix. Keys recorded on the product are the bare file
//! names; the folder is implied by the product uuid.

use super::product::MediaType;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("uuid must not be empty")]
    EmptyUuid,
    #[error("uuid `{0}` contains characters not allowed in a storage key")]
    InvalidUuid(String),
    #[error("file `{0}` has no extension")]
    MissingExtension(String),
    #[error("extension `{0}` is not allowed")]
    InvalidExtension(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetKeys {
    uuid: String,
    extension: String,
    media_type: MediaType,
}

impl AssetKeys {
    pub fn new(uuid: &str, extension: &str) -> Result<Self, KeyError> {
        Self::for_media(uuid, extension, MediaType::Audio)
    }

    pub fn for_media(uuid: &str, extension: &str, media_type: MediaType) -> Result<Self, KeyError> {
        validate_uuid(uuid)?;
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(KeyError::InvalidExtension(extension.to_string()));
        }
        Ok(Self {
            uuid: uuid.to_string(),
            extension: extension.to_string(),
            media_type,
        })
    }

    /// Derive keys from the client-supplied file name, keeping its extension.
    pub fn from_file_name(uuid: &str, file_name: &str) -> Result<Self, KeyError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| KeyError::MissingExtension(file_name.to_string()))?;
        Self::new(uuid, extension)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `{uuid}/audio`
    pub fn folder(&self) -> String {
        format!("{}/{}", self.uuid, self.media_type)
    }

    /// `{uuid}-original.{ext}`
    pub fn original_key(&self) -> String {
        format!("{}-original.{}", self.uuid, self.extension)
    }

    /// `{uuid}-watermarked.{ext}`
    pub fn watermarked_key(&self) -> String {
        format!("{}-watermarked.{}", self.uuid, self.extension)
    }

    pub fn original_object(&self) -> String {
        format!("{}/{}", self.folder(), self.original_key())
    }

    pub fn watermarked_object(&self) -> String {
        format!("{}/{}", self.folder(), self.watermarked_key())
    }
}

fn validate_uuid(uuid: &str) -> Result<(), KeyError> {
    if uuid.is_empty() {
        return Err(KeyError::EmptyUuid);
    }
    let allowed = uuid
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !allowed {
        return Err(KeyError::InvalidUuid(uuid.to_string()));
    }
    Ok(())
}
