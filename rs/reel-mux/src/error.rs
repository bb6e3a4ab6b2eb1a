#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
	#[error("requested dts is below the first sample")]
	OutOfRangeLow,

	#[error("requested dts is beyond the last sample")]
	OutOfRangeHigh,

	#[error("no preceding RAP found for the requested position")]
	NoRap,

	#[error("mp4 atom error: {0}")]
	Atom(String),

	#[error("mpeg-ts mux error: {0}")]
	Ts(String),

	#[error("unsupported codec for mpeg-ts remux: {0}")]
	UnsupportedCodec(String),

	#[error("object store error: {0}")]
	Store(#[from] reel_store::Error),

	#[error("scratch file error: {0}")]
	Scratch(String),
}

impl From<reel_index::timing::PositionError> for Error {
	fn from(e: reel_index::timing::PositionError) -> Self {
		match e {
			reel_index::timing::PositionError::OutOfRangeLow => Error::OutOfRangeLow,
			reel_index::timing::PositionError::OutOfRangeHigh => Error::OutOfRangeHigh,
			reel_index::timing::PositionError::NoRap => Error::NoRap,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
