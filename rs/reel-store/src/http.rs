//! HTTP-backed object store: `bucket` and `key` are joined onto a base URL
//! and fetched with a byte-range request.

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::{Error, Result};
use crate::ObjectStore;

pub struct HttpObjectStore {
	base_url: Url,
	client: Client,
}

impl HttpObjectStore {
	pub fn new(base_url: Url) -> Self {
		Self::with_client(base_url, default_client())
	}

	pub fn with_client(base_url: Url, client: Client) -> Self {
		Self { base_url, client }
	}

	fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
		self.base_url
			.join(&format!("{bucket}/{key}"))
			.map_err(|e| Error::Backend(e.to_string()))
	}
}

fn default_client() -> Client {
	Client::builder()
		.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
		.build()
		.expect("default HTTP client configuration is valid")
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
	async fn read(&self, bucket: &str, key: &str, offset: u64, length: u64) -> Result<Bytes> {
		let url = self.object_url(bucket, key)?;
		let end = offset + length.saturating_sub(1);
		let range = format!("bytes={offset}-{end}");

		let response = self
			.client
			.get(url)
			.header(reqwest::header::RANGE, range)
			.send()
			.await
			.map_err(|e| Error::Backend(e.to_string()))?;

		match response.status() {
			StatusCode::NOT_FOUND => Err(Error::NotFound { bucket: bucket.to_string(), key: key.to_string() }),
			StatusCode::RANGE_NOT_SATISFIABLE => Err(Error::InvalidRange { offset, length, object_len: 0 }),
			_ => {
				let response = response.error_for_status().map_err(|e| Error::Backend(e.to_string()))?;
				response.bytes().await.map_err(|e| Error::Backend(e.to_string()))
			}
		}
	}

	async fn write(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<()> {
		let url = self.object_url(bucket, key)?;
		let response = self.client.put(url).body(bytes).send().await.map_err(|e| Error::Backend(e.to_string()))?;
		response.error_for_status().map_err(|e| Error::Backend(e.to_string()))?;
		Ok(())
	}

	async fn len(&self, bucket: &str, key: &str) -> Result<u64> {
		let url = self.object_url(bucket, key)?;
		let response = self.client.head(url).send().await.map_err(|e| Error::Backend(e.to_string()))?;

		if response.status() == StatusCode::NOT_FOUND {
			return Err(Error::NotFound { bucket: bucket.to_string(), key: key.to_string() });
		}
		let response = response.error_for_status().map_err(|e| Error::Backend(e.to_string()))?;
		response.content_length().ok_or_else(|| Error::Backend("missing content-length".to_string()))
	}
}
