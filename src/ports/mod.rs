//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the application core and an
//! external system. Implementations live in `src/adapters/`.

pub mod blob_store;
pub mod chat_completer;
pub mod image_generator;
pub mod search_index;

pub use blob_store::BlobStore;
pub use chat_completer::{ChatCompleter, ChatRequest};
pub use image_generator::{ImageGenerator, PredictionRequest};
pub use search_index::SearchIndex;
