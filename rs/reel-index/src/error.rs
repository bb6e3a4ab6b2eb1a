#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	#[error("corrupt metadata")]
	CorruptMetadata,

	#[error("unsupported metadata version {0}")]
	UnsupportedMetadataVersion(u16),

	#[error("invalid asset: {0}")]
	InvalidAsset(String),

	#[error("mp4 atom error: {0}")]
	Atom(String),
}

pub type Result<T> = std::result::Result<T, Error>;
