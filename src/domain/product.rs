use super::keys::AssetKeys;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label given to the variant that points at the untouched upload.
pub const ORIGINAL_VARIANT: &str = "Original";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "audio" => Ok(MediaType::Audio),
            other => Err(format!("unknown media type `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Published,
    Archived,
    Unavailable,
    #[default]
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(alias = "label")]
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub key: String,
}

/// Catalog entry as stored by the product subsystem.
///
/// Only `variants`, `public_key`, `thumbnail_key` and `revision` are ever
/// written by the ingestion pipeline; everything else passes through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub uuid: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub thumbnail_key: Option<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub status: ProductStatus,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Bumped by every successful save. Saves carrying a stale value are rejected.
    #[serde(default)]
    pub revision: u64,
}

impl Product {
    pub fn new(uuid: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            uuid: uuid.into(),
            slug: String::new(),
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            public_key: None,
            thumbnail_key: None,
            variants: Vec::new(),
            status: ProductStatus::default(),
            media_type,
            created_by: None,
            revision: 0,
        }
    }

    /// Point the product at a freshly published asset pair.
    ///
    /// Adds the `Original` variant (according to `policy`) and moves both
    /// public and thumbnail pointers to the watermarked derivative.
    pub fn attach_asset(&mut self, keys: &AssetKeys, policy: VariantPolicy) {
        let variant = Variant {
            size: ORIGINAL_VARIANT.to_string(),
            price: None,
            key: keys.original_key(),
        };

        match policy {
            VariantPolicy::Append => self.variants.push(variant),
            VariantPolicy::Upsert => {
                match self.variants.iter_mut().find(|v| v.key == variant.key) {
                    // keep whatever price the catalog already set
                    Some(existing) => existing.size = variant.size,
                    None => self.variants.push(variant),
                }
            }
        }

        let watermarked = keys.watermarked_key();
        self.public_key = Some(watermarked.clone());
        self.thumbnail_key = Some(watermarked);
    }

    /// Every storage key this product currently references.
    pub fn referenced_keys(&self) -> Vec<&str> {
        self.variants
            .iter()
            .map(|v| v.key.as_str())
            .chain(self.public_key.as_deref())
            .chain(self.thumbnail_key.as_deref())
            .collect()
    }
}

/// What to do when the product already carries a variant with the key being added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariantPolicy {
    /// Replace the existing entry in place; replays are idempotent.
    #[default]
    Upsert,
    /// Push unconditionally; replays produce duplicate entries.
    Append,
}

impl FromStr for VariantPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upsert" => Ok(VariantPolicy::Upsert),
            "append" => Ok(VariantPolicy::Append),
            other => Err(format!("unknown variant policy `{}`", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> AssetKeys {
        AssetKeys::new("abc123", "mp3").unwrap()
    }

    #[test]
    fn attach_asset_sets_pointers_and_original_variant() {
        let mut product = Product::new("abc123", MediaType::Audio);
        product.attach_asset(&keys(), VariantPolicy::Upsert);

        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.variants[0].size, "Original");
        assert_eq!(product.variants[0].key, "abc123-original.mp3");
        assert_eq!(product.public_key.as_deref(), Some("abc123-watermarked.mp3"));
        assert_eq!(product.thumbnail_key.as_deref(), Some("abc123-watermarked.mp3"));
    }

    #[test]
    fn upsert_replay_keeps_a_single_entry_and_its_price() {
        let mut product = Product::new("abc123", MediaType::Audio);
        product.attach_asset(&keys(), VariantPolicy::Upsert);
        product.variants[0].price = Some(12.5);
        product.attach_asset(&keys(), VariantPolicy::Upsert);

        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.variants[0].price, Some(12.5));
    }

    #[test]
    fn append_replay_duplicates_the_entry() {
        let mut product = Product::new("abc123", MediaType::Audio);
        product.attach_asset(&keys(), VariantPolicy::Append);
        product.attach_asset(&keys(), VariantPolicy::Append);

        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.variants[0].key, product.variants[1].key);
    }

    #[test]
    fn existing_variants_are_preserved() {
        let mut product = Product::new("abc123", MediaType::Audio);
        product.variants.push(Variant {
            size: "Preview".into(),
            price: Some(1.0),
            key: "abc123-preview.mp3".into(),
        });
        product.attach_asset(&keys(), VariantPolicy::Upsert);

        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.variants[0].size, "Preview");
    }

    #[test]
    fn deserializes_catalog_document() {
        let json = r#"{
            "uuid": "abc123",
            "title": "Rain",
            "mediaType": "audio",
            "status": "published",
            "variants": [{"label": "HD", "price": 10, "key": "k"}]
        }"#;
        let product: Product = serde_json::from_str(json).unwrap();

        assert_eq!(product.media_type, MediaType::Audio);
        assert_eq!(product.status, ProductStatus::Published);
        assert_eq!(product.variants[0].size, "HD");
        assert_eq!(product.revision, 0);
        assert!(product.public_key.is_none());
    }

    #[test]
    fn referenced_keys_lists_variants_then_pointers() {
        let mut product = Product::new("abc123", MediaType::Audio);
        product.attach_asset(&keys(), VariantPolicy::Upsert);

        assert_eq!(
            product.referenced_keys(),
            vec![
                "abc123-original.mp3",
                "abc123-watermarked.mp3",
                "abc123-watermarked.mp3"
            ]
        );
    }

    #[test]
    fn parses_media_type_and_policy() {
        assert_eq!("audio".parse::<MediaType>(), Ok(MediaType::Audio));
        assert!("Audio ".parse::<MediaType>().is_err());
        assert_eq!("APPEND".parse::<VariantPolicy>(), Ok(VariantPolicy::Append));
        assert!("merge".parse::<VariantPolicy>().is_err());
    }
}
