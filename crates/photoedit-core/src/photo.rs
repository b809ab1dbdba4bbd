//! Boundary to the application's photo storage.
//!
//! The engine never stores anything itself; the embedding application
//! implements [`PhotoStore`] over its file system or content provider.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use crate::buffer::PixelBuffer;

/// A stored photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: String,
    /// Where the encoded image lives.
    pub locator: PathBuf,
    pub created: SystemTime,
}

/// Errors reported by a [`PhotoStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Photo not found: {0}")]
    NotFound(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode photo: {0}")]
    Encode(String),
}

pub trait PhotoStore {
    /// Every stored photo.
    fn list(&self) -> Result<Vec<Photo>, StoreError>;

    fn get(&self, id: &str) -> Result<Photo, StoreError>;

    /// Copy external content into the store under a fresh id.
    fn import(&mut self, source: &Path) -> Result<Photo, StoreError>;

    /// Replace the pixels of an existing photo.
    fn save(&mut self, id: &str, image: &PixelBuffer) -> Result<(), StoreError>;

    fn remove(&mut self, id: &str) -> Result<(), StoreError>;

    /// Remove several photos, stopping at the first failure.
    fn remove_many(&mut self, ids: &[&str]) -> Result<(), StoreError> {
        for id in ids {
            self.remove(id)?;
        }
        Ok(())
    }
}
