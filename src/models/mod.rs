pub mod author;
pub mod book;
pub mod book_image;
pub mod catalog_record;

pub use author::Author;
pub use book::{AuthorRef, Book, BookDetail, ImageInfo};
pub use catalog_record::{BookEdit, CatalogRecord, ImageEntry, ImagesField};
