use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Image tag used for the primary image of a book
pub const IMAGE_COVER: &str = "cover";
/// Image tag for secondary images
pub const IMAGE_GALLERY: &str = "gallery";

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_CURRENCY: &str = "USD";

// BookDetail is embedded: its fields are columns of the book row, so it has no
// identity of its own and disappears with the row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub remote_id: String, // empty for drafts never synced
    pub title: String,
    pub author_id: Option<String>,
    pub author_position: i32,
    pub description: String,
    pub summary: String,
    #[sea_orm(default_value = "en")]
    pub language: String,
    pub rating: f64,
    pub rating_count: i32,
    pub publisher: String,
    pub publish_date: String,
    pub pages: i32,
    pub categories: String, // JSON array
    pub price: f64,
    #[sea_orm(default_value = "USD")]
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::author::Entity",
        from = "Column::AuthorId",
        to = "super::author::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Author,
    #[sea_orm(has_many = "super::book_image::Entity")]
    Images,
}

impl Related<super::author::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl Related<super::book_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ImageInfo {
    pub fn cover(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: IMAGE_COVER.to_string(),
        }
    }
}

/// Detail value owned by exactly one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetail {
    pub description: String,
    pub summary: String,
    pub language: String,
    pub rating: f64,
    pub rating_count: i32,
    pub publisher: String,
    pub publish_date: String,
    pub pages: i32,
    pub categories: Vec<String>,
    pub price: f64,
    pub currency: String,
    pub images: Vec<ImageInfo>,
}

impl Default for BookDetail {
    fn default() -> Self {
        Self {
            description: String::new(),
            summary: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            rating: 0.0,
            rating_count: 0,
            publisher: String::new(),
            publish_date: String::new(),
            pages: 0,
            categories: Vec::new(),
            price: 0.0,
            currency: DEFAULT_CURRENCY.to_string(),
            images: Vec::new(),
        }
    }
}

impl BookDetail {
    pub fn primary_image_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }

    pub fn categories_json(&self) -> String {
        serde_json::to_string(&self.categories).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Reference from a book to its author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: String,
    pub full_name: String,
}

// DTO assembled from the book row, its author and its image rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub remote_id: String,
    pub title: String,
    pub author: Option<AuthorRef>,
    pub detail: BookDetail,
}

impl Book {
    pub fn is_synced(&self) -> bool {
        !self.remote_id.is_empty()
    }

    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .map(|a| a.full_name.as_str())
            .unwrap_or_default()
    }

    pub fn from_parts(
        model: Model,
        author: Option<&super::author::Model>,
        images: Vec<super::book_image::Model>,
    ) -> Self {
        let categories: Vec<String> = serde_json::from_str(&model.categories).unwrap_or_default();

        Self {
            id: model.id,
            remote_id: model.remote_id,
            title: model.title,
            author: author.map(|a| AuthorRef {
                id: a.id.clone(),
                full_name: a.full_name.clone(),
            }),
            detail: BookDetail {
                description: model.description,
                summary: model.summary,
                language: model.language,
                rating: model.rating,
                rating_count: model.rating_count,
                publisher: model.publisher,
                publish_date: model.publish_date,
                pages: model.pages,
                categories,
                price: model.price,
                currency: model.currency,
                images: images
                    .into_iter()
                    .map(|i| ImageInfo {
                        url: i.url,
                        kind: i.kind,
                    })
                    .collect(),
            },
        }
    }
}
