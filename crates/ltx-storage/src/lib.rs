//! Supabase Storage access for generated videos.
//!
//! This crate provides:
//! - A REST client for uploads, public URLs and signed URLs
//! - The dated object key layout
//! - A video uploader that applies the bucket's URL policy

pub mod client;
pub mod error;
pub mod paths;
pub mod uploader;

pub use client::{SupabaseClient, SupabaseConfig};
pub use error::{StorageError, StorageResult};
pub use paths::object_key;
pub use uploader::{UploadOptions, UrlPolicy, VideoUploader, DEFAULT_SIGNED_URL_TTL_SECS};
