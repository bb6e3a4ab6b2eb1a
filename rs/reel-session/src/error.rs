#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	#[error("request body is not valid JSON: {0}")]
	InvalidJson(String),

	#[error("manifest has no non-skipped representations")]
	NoRepresentations,

	#[error("manifest entry is not a JSON object")]
	NotAnObject,

	#[error("missing mandatory field: {0}")]
	MissingField(&'static str),

	#[error("start or duration must be >= 0")]
	NegativeBound,

	#[error("no such track: requested track number {0} not present in asset")]
	NoSuchTrack(u32),

	#[error("degenerate track: fewer than 2 samples")]
	DegenerateTrack,

	#[error("asset start is beyond its duration")]
	StartBeyondDuration,

	#[error("metadata blob is corrupt or of an unsupported version: {0}")]
	Metadata(String),

	#[error("object not found: {0}")]
	StoreNotFound(String),

	#[error("object store transient error: {0}")]
	StoreTransient(String),

	#[error("object store error: {0}")]
	Store(String),

	#[error("session not found")]
	NotFound,

	#[error("unknown representation: {0}")]
	UnknownRepresentation(String),

	#[error("session expired")]
	Expired,

	#[error("requested dts is below the first sample")]
	OutOfRangeLow,

	#[error("requested dts is beyond the last sample")]
	OutOfRangeHigh,

	#[error("no preceding RAP found for the requested position")]
	NoRap,

	#[error("planner task failed: {0}")]
	Join(String),
}

impl From<reel_index::Error> for Error {
	fn from(e: reel_index::Error) -> Self {
		Error::Metadata(e.to_string())
	}
}

impl From<reel_store::Error> for Error {
	fn from(e: reel_store::Error) -> Self {
		let message = e.to_string();
		match e {
			reel_store::Error::NotFound { bucket, key } => Error::StoreNotFound(format!("{bucket}/{key}")),
			reel_store::Error::Timeout => Error::StoreTransient(message),
			other => Error::Store(other.to_string()),
		}
	}
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
