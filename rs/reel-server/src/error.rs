//! HTTP error mapping — spec §7 "Error handling design".
//!
//! Every component's typed error converges here into one of the five
//! status codes the spec's policy table names; nothing upstream of this
//! module knows about HTTP.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("unknown session")]
	UnknownSession,

	#[error("unknown representation: {0}")]
	UnknownRepresentation(String),

	#[error("session expired")]
	Expired,

	#[error("not found: {0}")]
	NotFound(String),

	#[error("transient store error")]
	Transient,

	#[error("internal error: {0}")]
	Internal(String),
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		let status = match &self {
			AppError::BadRequest(_) | AppError::UnknownSession | AppError::UnknownRepresentation(_) => StatusCode::BAD_REQUEST,
			AppError::Expired => StatusCode::REQUEST_TIMEOUT,
			AppError::NotFound(_) => StatusCode::NOT_FOUND,
			AppError::Transient => StatusCode::SERVICE_UNAVAILABLE,
			AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		};
		tracing::warn!(error = %self, %status, "request failed");
		(status, self.to_string()).into_response()
	}
}

impl From<reel_session::Error> for AppError {
	fn from(e: reel_session::Error) -> Self {
		use reel_session::Error::*;
		match e {
			InvalidJson(_) | NoRepresentations | NotAnObject | MissingField(_) | NegativeBound | NoSuchTrack(_) | DegenerateTrack
			| StartBeyondDuration | Metadata(_) | UnknownRepresentation(_) | OutOfRangeLow | OutOfRangeHigh | NoRap => {
				AppError::BadRequest(e.to_string())
			}
			StoreNotFound(key) => AppError::NotFound(key),
			StoreTransient(_) => AppError::Transient,
			Store(msg) => AppError::Internal(msg),
			NotFound => AppError::UnknownSession,
			Expired => AppError::Expired,
			Join(msg) => AppError::Internal(msg),
		}
	}
}

impl From<reel_mux::Error> for AppError {
	fn from(e: reel_mux::Error) -> Self {
		use reel_mux::Error::*;
		match e {
			// The planner already validated these bounds at session-creation
			// time; a mismatch surfacing here means the assembler's own
			// chunk resolution broke, not a bad client request — spec §4.8
			// names this case explicitly as an assembler failure (500).
			OutOfRangeLow | OutOfRangeHigh | NoRap => AppError::Internal(e.to_string()),
			Store(reel_store::Error::NotFound { bucket, key }) => AppError::NotFound(format!("{bucket}/{key}")),
			Store(reel_store::Error::Timeout) => AppError::Transient,
			Store(other) => AppError::Internal(other.to_string()),
			Atom(_) | Ts(_) | UnsupportedCodec(_) | Scratch(_) => AppError::Internal(e.to_string()),
		}
	}
}

impl From<reel_store::Error> for AppError {
	fn from(e: reel_store::Error) -> Self {
		match e {
			reel_store::Error::NotFound { bucket, key } => AppError::NotFound(format!("{bucket}/{key}")),
			reel_store::Error::Timeout => AppError::Transient,
			other => AppError::Internal(other.to_string()),
		}
	}
}

impl From<reel_index::Error> for AppError {
	fn from(e: reel_index::Error) -> Self {
		AppError::BadRequest(e.to_string())
	}
}
