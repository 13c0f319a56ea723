//! Catalog record wire shape
//!
//! The same JSON shape is served by the catalog REST surface and carried as the
//! payload of realtime documents. Every field except `id`, `title` and
//! `authorName` is optional and may be `null`; `images` is either a single URL
//! string (legacy servers) or a list.

use serde::{Deserialize, Deserializer, Serialize};

use super::book::{
    BookDetail, DEFAULT_CURRENCY, DEFAULT_LANGUAGE, IMAGE_COVER, IMAGE_GALLERY, ImageInfo,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageEntry {
    Url(String),
    Tagged {
        url: String,
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagesField {
    Legacy(String),
    List(Vec<ImageEntry>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating_count: Option<i32>,
    #[serde(
        default,
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub pages: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<ImagesField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

// Document stores hand back whole numbers as floats. Anything that is not a
// whole number within i32 range is treated as absent.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v.as_i64() {
        Some(n) => i32::try_from(n).ok(),
        None => v
            .as_f64()
            .filter(|f| f.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(f))
            .map(|f| f as i32),
    }))
}

impl CatalogRecord {
    /// Record sent to the catalog when a book is added from the client.
    pub fn draft(title: &str, author_name: &str) -> Self {
        Self {
            title: title.to_string(),
            author_name: author_name.to_string(),
            description: Some("no description".to_string()),
            summary: Some(String::new()),
            price: Some(0.0),
            currency: Some(DEFAULT_CURRENCY.to_string()),
            rating: Some(0.0),
            rating_count: Some(0),
            pages: Some(0),
            language: Some(DEFAULT_LANGUAGE.to_string()),
            publisher: Some(String::new()),
            publish_date: Some(String::new()),
            images: None,
            categories: None,
            ..Default::default()
        }
    }

    /// Decode a realtime document; the document id becomes the record id.
    pub fn from_document(
        document_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let mut record: CatalogRecord = serde_json::from_value(payload.clone())?;
        record.id = document_id.to_string();
        Ok(record)
    }

    /// Build the embedded detail, applying defaults for missing fields.
    pub fn to_detail(&self) -> BookDetail {
        let description = self.description.clone().unwrap_or_default();
        let summary = self
            .summary
            .clone()
            .unwrap_or_else(|| description.clone());

        BookDetail {
            description,
            summary,
            language: self
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            rating: self.rating.unwrap_or(0.0),
            rating_count: self.rating_count.unwrap_or(0),
            publisher: self.publisher.clone().unwrap_or_default(),
            publish_date: self.publish_date.clone().unwrap_or_default(),
            pages: self.pages.unwrap_or(0),
            categories: self.categories.clone().unwrap_or_default(),
            price: self.price.unwrap_or(0.0),
            currency: self
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            images: self.image_list(),
        }
    }

    fn image_list(&self) -> Vec<ImageInfo> {
        match &self.images {
            None => Vec::new(),
            Some(ImagesField::Legacy(url)) if url.is_empty() => Vec::new(),
            Some(ImagesField::Legacy(url)) => vec![ImageInfo::cover(url.clone())],
            Some(ImagesField::List(entries)) => entries
                .iter()
                .map(|entry| match entry {
                    ImageEntry::Url(url) => (url, None),
                    ImageEntry::Tagged { url, kind } => (url, kind.as_ref()),
                })
                .filter(|(url, _)| !url.is_empty())
                .enumerate()
                .map(|(position, (url, kind))| ImageInfo {
                    url: url.clone(),
                    kind: match kind {
                        Some(kind) if !kind.is_empty() => kind.clone(),
                        _ if position == 0 => IMAGE_COVER.to_string(),
                        _ => IMAGE_GALLERY.to_string(),
                    },
                })
                .collect(),
        }
    }
}

/// Editable field set submitted by the client for an existing book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookEdit {
    pub title: String,
    pub author_name: String,
    pub description: String,
    pub summary: String,
    pub language: String,
    pub publisher: String,
    pub publish_date: String,
    pub pages: i32,
    pub rating: f64,
    pub rating_count: i32,
    pub price: f64,
    pub currency: String,
    pub categories: Vec<String>,
    pub images: Vec<String>,
}

impl BookEdit {
    pub fn into_record(self, remote_id: &str) -> CatalogRecord {
        CatalogRecord {
            id: remote_id.to_string(),
            title: self.title,
            author_name: self.author_name,
            description: Some(self.description),
            summary: Some(self.summary),
            price: Some(self.price),
            currency: Some(self.currency),
            rating: Some(self.rating),
            rating_count: Some(self.rating_count),
            pages: Some(self.pages),
            language: Some(self.language),
            publisher: Some(self.publisher),
            publish_date: Some(self.publish_date),
            images: Some(ImagesField::List(
                self.images.into_iter().map(ImageEntry::Url).collect(),
            )),
            categories: Some(self.categories),
        }
    }
}
