//! Epiphany Storage Library
//!
//! Object storage for generation outputs (S3 via `object_store`, or the local
//! filesystem) and the signing gateway that hands out time-limited URLs.
//!
//! # Storage keys
//!
//! Inference workers report outputs as URLs. A URL maps to a key only when it
//! points into the configured bucket or local base URL; keys must not contain
//! `..` segments or a leading `/`.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signer;
pub mod traits;

pub use epiphany_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use signer::UrlSigner;
pub use traits::{Storage, StorageError, StorageResult};
