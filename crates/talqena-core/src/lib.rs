//! # talqena-core
//!
//! Keeps a personal prompt library consistent across its two stores.
//!
//! ## Key Types
//!
//! - [`Library`] - runs create/update/delete/import against the metadata
//!   and image stores and owns the in-memory collection
//! - [`RecordHandles`] - display handles for images in the working set
//! - [`PromptFilter`] - computes the visible subset of the collection
//! - [`PromptDraft`] - form data for create and update
//!
//! ## Consistency
//!
//! The stores share no transaction. Image writes for an operation are
//! awaited before the metadata write, so a crash in between can only leave
//! an orphaned image, which [`Library::reconcile`] reclaims.

mod draft;
mod error;
mod filter;
mod handles;
mod import;
mod library;

pub use draft::{ImageField, ImportOptions, PromptDraft};
pub use error::{LibraryError, Result};
pub use filter::{available_tags, filter_prompts, PromptFilter, Selection};
pub use handles::{HandleLifecycle, ImageHandle, RecordHandles};
pub use import::{build_import_batch, imported_title, parse_import_lines};
pub use library::{Library, LibraryConfig, MAX_IMAGE_SIZE_BYTES};

pub use talqena_db::{AiModel, BadgeColor, Category, CategoryStyle, PromptRecord};
