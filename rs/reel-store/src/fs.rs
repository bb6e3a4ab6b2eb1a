//! Filesystem-backed object store: one directory per bucket, one file per
//! key.

use std::io::SeekFrom;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::ObjectStore;

pub struct FsObjectStore {
	root: PathBuf,
}

impl FsObjectStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn path(&self, bucket: &str, key: &str) -> PathBuf {
		self.root.join(bucket).join(key)
	}
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
	async fn read(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Bytes> {
		let path = self.path(bucket, key);
		let mut file = fs::File::open(&path).await.map_err(|e| map_open_err(e, bucket, key))?;

		let object_len = file.metadata().await.map_err(|e| Error::Io(e.to_string()))?.len();
		if offset.checked_add(length).map(|end| end > object_len).unwrap_or(true) {
			return Err(Error::InvalidRange { offset, length, object_len });
		}

		file.seek(SeekFrom::Start(offset)).await.map_err(|e| Error::Io(e.to_string()))?;
		let mut buf = vec![0u8; length as usize];
		file.read_exact(&mut buf).await.map_err(|e| Error::Io(e.to_string()))?;
		Ok(Bytes::from(buf))
	}

	async fn write(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<()> {
		let dir = self.root.join(bucket);
		fs::create_dir_all(&dir).await.map_err(|e| Error::Io(e.to_string()))?;

		let path = self.path(bucket, key);
		let tmp = path.with_extension("tmp");
		let mut file = fs::File::create(&tmp).await.map_err(|e| Error::Io(e.to_string()))?;
		file.write_all(&bytes).await.map_err(|e| Error::Io(e.to_string()))?;
		file.flush().await.map_err(|e| Error::Io(e.to_string()))?;
		drop(file);
		fs::rename(&tmp, &path).await.map_err(|e| Error::Io(e.to_string()))?;
		Ok(())
	}

	async fn len(&self, bucket: &str, key: &str) -> Result<u64> {
		let path = self.path(bucket, key);
		let metadata = fs::metadata(&path).await.map_err(|e| map_open_err(e, bucket, key))?;
		Ok(metadata.len())
	}
}

fn map_open_err(err: std::io::Error, bucket: &str, key: &str) -> Error {
	if err.kind() == std::io::ErrorKind::NotFound {
		Error::NotFound { bucket: bucket.to_string(), key: key.to_string() }
	} else {
		Error::Io(err.to_string())
	}
}
