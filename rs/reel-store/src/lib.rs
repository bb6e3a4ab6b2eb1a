//! Content-addressable object store interface used by the reel origin.
//!
//! The origin never talks to a storage backend directly: every read and
//! write goes through [`ObjectStore`], so the fs-backed and HTTP-backed
//! implementations in this crate (and any other backend an operator wires
//! in) are interchangeable.

pub mod error;
pub mod fs;
pub mod http;

pub use error::{Error, Result};

use bytes::Bytes;

/// A content-addressable store keyed by `(bucket, key)`.
///
/// Implementations must be safe to share across tasks (`Send + Sync`) and
/// must not block the calling task's worker thread.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
	/// Read `length` bytes starting at `offset` from `bucket/key`.
	///
	/// Fails with [`Error::NotFound`] if the object doesn't exist, and
	/// [`Error::InvalidRange`] if the requested range exceeds the object's
	/// length.
	async fn read(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Bytes>;

	/// Write `bytes` as the full contents of `bucket/key`, replacing any
	/// existing object.
	async fn write(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<()>;

	/// The total length of `bucket/key`, in bytes.
	///
	/// Used to size a whole-object read (e.g. a sample-index metadata blob)
	/// without guessing a bound up front.
	async fn len(&self, bucket: &str, key: &str) -> Result<u64>;
}

/// Read the whole object, sizing the read from [`ObjectStore::len`].
pub async fn read_all(store: &(impl ObjectStore + ?Sized), bucket: &str, key: &str) -> Result<Bytes> {
	let len = store.len(bucket, key).await?;
	store.read(bucket, key, 0, len).await
}
