//! JSON manifest request parsing and validation — spec §4.4.
//!
//! Deserialization goes through `serde_json::Value` rather than a single
//! derived struct so that malformed shapes (a non-object array entry, a
//! negative `start`/`duration`) surface as the specific validation error
//! spec §4.4 calls for, instead of a generic parse failure.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::PlaylistType;

#[derive(Debug, Clone)]
pub struct TrackRequestInput {
	pub bucket: String,
	pub key: String,
	pub meta_key: String,
	pub start_ms: u64,
	pub duration_ms: u64,
	pub number: u32,
	pub skip: bool,
}

#[derive(Debug, Clone)]
pub struct RepresentationRequest {
	pub skip: bool,
	pub tracks: Vec<TrackRequestInput>,
}

#[derive(Debug, Clone)]
pub struct ManifestRequest {
	pub playlist_type: PlaylistType,
	pub timeout_sec: u64,
	pub chunk_duration_sec: u64,
	pub audio: Option<RepresentationRequest>,
	pub video: Option<RepresentationRequest>,
}

pub fn parse(bytes: &[u8]) -> Result<ManifestRequest> {
	let value: Value = serde_json::from_slice(bytes).map_err(|e| Error::InvalidJson(e.to_string()))?;
	let obj = value.as_object().ok_or(Error::NotAnObject)?;

	let playlist_type = match obj.get("type").and_then(Value::as_str) {
		None => PlaylistType::Dash,
		Some("dash") => PlaylistType::Dash,
		Some("hls") => PlaylistType::Hls,
		Some(other) => return Err(Error::InvalidJson(format!("unknown playlist type: {other}"))),
	};
	let timeout_sec = obj.get("timeout_sec").and_then(Value::as_u64).unwrap_or(10);
	let chunk_duration_sec = obj.get("chunk_duration_sec").and_then(Value::as_u64).unwrap_or(5);

	let audio = parse_representation(obj.get("audio"))?;
	let video = parse_representation(obj.get("video"))?;

	let has_representation = |r: &Option<RepresentationRequest>| r.as_ref().is_some_and(|r| !r.skip);
	if !has_representation(&audio) && !has_representation(&video) {
		return Err(Error::NoRepresentations);
	}

	Ok(ManifestRequest { playlist_type, timeout_sec, chunk_duration_sec, audio, video })
}

fn parse_representation(value: Option<&Value>) -> Result<Option<RepresentationRequest>> {
	let Some(value) = value else { return Ok(None) };
	let obj = value.as_object().ok_or(Error::NotAnObject)?;

	let skip = obj.get("skip").and_then(Value::as_bool).unwrap_or(false);
	let tracks_val = obj.get("tracks").and_then(Value::as_array).ok_or(Error::MissingField("tracks"))?;

	let mut tracks = Vec::with_capacity(tracks_val.len());
	for track_val in tracks_val {
		tracks.push(parse_track(track_val)?);
	}

	Ok(Some(RepresentationRequest { skip, tracks }))
}

fn parse_track(value: &Value) -> Result<TrackRequestInput> {
	let obj = value.as_object().ok_or(Error::NotAnObject)?;

	let get_str = |field: &'static str| -> Result<String> {
		obj.get(field).and_then(Value::as_str).map(str::to_string).ok_or(Error::MissingField(field))
	};
	let get_i64 = |field: &'static str, default: i64| -> Result<i64> {
		match obj.get(field) {
			None => Ok(default),
			Some(v) => v.as_i64().ok_or(Error::MissingField(field)),
		}
	};

	let bucket = get_str("bucket")?;
	let key = get_str("key")?;
	let meta_key = get_str("meta_key")?;

	let start = get_i64("start", 0)?;
	let duration = get_i64("duration", 0)?;
	if start < 0 || duration < 0 {
		return Err(Error::NegativeBound);
	}

	// spec §6: `number` is the track within the asset, default 1.
	let number = obj.get("number").and_then(Value::as_u64).unwrap_or(1) as u32;
	let skip = obj.get("skip").and_then(Value::as_bool).unwrap_or(false);

	Ok(TrackRequestInput {
		bucket,
		key,
		meta_key,
		start_ms: start as u64,
		duration_ms: duration as u64,
		number,
		skip,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_minimal_dash_manifest() {
		let body = br#"{
			"video": { "tracks": [{"bucket":"b","key":"k","meta_key":"m","start":0,"duration":10000,"number":1}] }
		}"#;
		let req = parse(body).unwrap();
		assert_eq!(req.playlist_type, PlaylistType::Dash);
		assert_eq!(req.timeout_sec, 10);
		assert_eq!(req.chunk_duration_sec, 5);
		assert!(req.audio.is_none());
		let video = req.video.unwrap();
		assert_eq!(video.tracks.len(), 1);
		assert_eq!(video.tracks[0].number, 1);
	}

	#[test]
	fn rejects_no_non_skipped_representations() {
		let body = br#"{ "video": { "skip": true, "tracks": [] } }"#;
		let err = parse(body).unwrap_err();
		assert!(matches!(err, Error::NoRepresentations));
	}

	#[test]
	fn rejects_missing_mandatory_field() {
		let body = br#"{ "video": { "tracks": [{"bucket":"b","key":"k","start":0,"duration":10000,"number":1}] } }"#;
		let err = parse(body).unwrap_err();
		assert!(matches!(err, Error::MissingField("meta_key")));
	}

	#[test]
	fn number_defaults_to_one() {
		let body = br#"{ "video": { "tracks": [{"bucket":"b","key":"k","meta_key":"m","start":0,"duration":10000}] } }"#;
		let req = parse(body).unwrap();
		assert_eq!(req.video.unwrap().tracks[0].number, 1);
	}

	#[test]
	fn rejects_negative_start() {
		let body = br#"{ "video": { "tracks": [{"bucket":"b","key":"k","meta_key":"m","start":-1,"duration":10000,"number":1}] } }"#;
		let err = parse(body).unwrap_err();
		assert!(matches!(err, Error::NegativeBound));
	}

	#[test]
	fn rejects_non_object_track_entry() {
		let body = br#"{ "video": { "tracks": ["not-an-object"] } }"#;
		let err = parse(body).unwrap_err();
		assert!(matches!(err, Error::NotAnObject));
	}

	#[test]
	fn rejects_unknown_playlist_type() {
		let body = br#"{ "type": "smooth", "video": { "tracks": [] } }"#;
		let err = parse(body).unwrap_err();
		assert!(matches!(err, Error::InvalidJson(_)));
	}
}
