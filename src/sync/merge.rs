//! Idempotent create-or-update of catalog records, keyed by remote id.
//!
//! Every function here takes the connection it runs on; the coordinator passes
//! the open write transaction so a whole batch commits or rolls back together.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::domain::StoreError;
use crate::models::CatalogRecord;
use crate::models::author::{self, Entity as AuthorEntity};
use crate::models::book::{self, BookDetail, Entity as BookEntity};
use crate::models::book_image::{self, Entity as BookImageEntity};

/// Result of merging one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub local_id: String,
    pub created: bool,
}

/// Create or update the book whose remote id is `record.id`.
///
/// An existing book keeps its local id; only title, author and detail change.
pub async fn upsert_merge<C: ConnectionTrait>(
    conn: &C,
    record: &CatalogRecord,
) -> Result<MergeOutcome, StoreError> {
    if record.id.is_empty() {
        return Err(StoreError::Constraint(format!(
            "record '{}' has no remote id",
            record.title
        )));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let author = resolve_author(conn, &record.author_name, &now).await?;
    let detail = record.to_detail();

    let existing = BookEntity::find()
        .filter(book::Column::RemoteId.eq(record.id.as_str()))
        .one(conn)
        .await?;

    let outcome = match existing {
        Some(model) => {
            let local_id = model.id.clone();
            let author_changed = model.author_id.as_deref() != Some(author.id.as_str());
            let mut active = model.into_active_model();

            active.title = Set(record.title.clone());
            if author_changed {
                active.author_id = Set(Some(author.id.clone()));
                active.author_position = Set(next_author_position(conn, &author.id).await?);
            }
            apply_detail(&mut active, &detail);
            active.updated_at = Set(now);
            active.update(conn).await?;

            tracing::debug!("Merged remote {} into existing book {}", record.id, local_id);
            MergeOutcome {
                local_id,
                created: false,
            }
        }
        None => {
            let local_id = Uuid::new_v4().to_string();
            let mut active = book::ActiveModel {
                id: Set(local_id.clone()),
                remote_id: Set(record.id.clone()),
                title: Set(record.title.clone()),
                author_id: Set(Some(author.id.clone())),
                author_position: Set(next_author_position(conn, &author.id).await?),
                created_at: Set(now.clone()),
                updated_at: Set(now),
                ..Default::default()
            };
            apply_detail(&mut active, &detail);
            active.insert(conn).await?;

            tracing::debug!("Created book {} for remote {}", local_id, record.id);
            MergeOutcome {
                local_id,
                created: true,
            }
        }
    };

    replace_images(conn, &outcome.local_id, &detail).await?;

    Ok(outcome)
}

/// Delete a book and everything it owns. Returns false if it did not exist.
pub async fn delete_book_cascade<C: ConnectionTrait>(
    conn: &C,
    local_id: &str,
) -> Result<bool, StoreError> {
    BookImageEntity::delete_many()
        .filter(book_image::Column::BookId.eq(local_id))
        .exec(conn)
        .await?;

    let result = BookEntity::delete_by_id(local_id.to_string())
        .exec(conn)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Delete the book carrying `remote_id`, if any. Returns its local id.
pub async fn delete_by_remote_id<C: ConnectionTrait>(
    conn: &C,
    remote_id: &str,
) -> Result<Option<String>, StoreError> {
    if remote_id.is_empty() {
        return Ok(None);
    }

    let Some(model) = BookEntity::find()
        .filter(book::Column::RemoteId.eq(remote_id))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    delete_book_cascade(conn, &model.id).await?;
    Ok(Some(model.id))
}

// Exact match on the full name: "Jane Doe" and "jane doe" are different authors.
async fn resolve_author<C: ConnectionTrait>(
    conn: &C,
    full_name: &str,
    now: &str,
) -> Result<author::Model, StoreError> {
    if let Some(existing) = AuthorEntity::find()
        .filter(author::Column::FullName.eq(full_name))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let new_author = author::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        full_name: Set(full_name.to_string()),
        dob: Set(String::new()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    };
    Ok(new_author.insert(conn).await?)
}

async fn next_author_position<C: ConnectionTrait>(
    conn: &C,
    author_id: &str,
) -> Result<i32, StoreError> {
    let last = BookEntity::find()
        .filter(book::Column::AuthorId.eq(author_id))
        .order_by_desc(book::Column::AuthorPosition)
        .one(conn)
        .await?;

    Ok(last.map(|b| b.author_position + 1).unwrap_or(0))
}

fn apply_detail(active: &mut book::ActiveModel, detail: &BookDetail) {
    active.description = Set(detail.description.clone());
    active.summary = Set(detail.summary.clone());
    active.language = Set(detail.language.clone());
    active.rating = Set(detail.rating);
    active.rating_count = Set(detail.rating_count);
    active.publisher = Set(detail.publisher.clone());
    active.publish_date = Set(detail.publish_date.clone());
    active.pages = Set(detail.pages);
    active.categories = Set(detail.categories_json());
    active.price = Set(detail.price);
    active.currency = Set(detail.currency.clone());
}

async fn replace_images<C: ConnectionTrait>(
    conn: &C,
    book_id: &str,
    detail: &BookDetail,
) -> Result<(), StoreError> {
    BookImageEntity::delete_many()
        .filter(book_image::Column::BookId.eq(book_id))
        .exec(conn)
        .await?;

    if detail.images.is_empty() {
        return Ok(());
    }

    let rows = detail
        .images
        .iter()
        .enumerate()
        .map(|(position, image)| book_image::ActiveModel {
            book_id: Set(book_id.to_string()),
            position: Set(position as i32),
            url: Set(image.url.clone()),
            kind: Set(image.kind.clone()),
        });
    BookImageEntity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}
