#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	#[error("not found: {bucket}/{key}")]
	NotFound { bucket: String, key: String },

	#[error("invalid range: offset={offset} length={length} object_len={object_len}")]
	InvalidRange { offset: u64, length: u64, object_len: u64 },

	#[error("io error: {0}")]
	Io(String),

	#[error("timeout")]
	Timeout,

	#[error("backend error: {0}")]
	Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
