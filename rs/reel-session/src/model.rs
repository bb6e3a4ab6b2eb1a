use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use reel_index::Track;

/// One contiguous span of one source asset contributing to a
/// [`Representation`].
#[derive(Debug, Clone)]
pub struct TrackRequest {
	pub bucket: String,
	pub data_key: String,
	pub meta_key: String,
	pub start_ms: u64,
	pub duration_ms: u64,
	pub requested_track_number: u32,

	/// Position in the asset's `Track` sequence. Filled in during metadata
	/// resolution.
	pub requested_track_index: Option<usize>,
	/// Sample DTS in the asset corresponding to `start_ms`, snapped to the
	/// nearest preceding RAP.
	pub dts_start: u64,
	/// `dts_start + duration_ms*timescale/1000`, snapped to the end of the
	/// current GOP (or the asset's last sample).
	pub dts_end: u64,
	/// Absolute DTS for the first sample within the representation's own
	/// timeline (i.e. the running accumulator across preceding TrackRequests).
	pub dts_first_sample_offset: u64,
	/// The representation-global chunk index at which this TrackRequest
	/// begins.
	pub start_chunk_number: u64,
	/// The asset track's own timescale, captured during planning so later
	/// chunk math doesn't need to re-decode metadata.
	pub timescale: u32,
	/// The resolved asset track (media parameters + samples), shared by
	/// reference with every handler reading this session — never mutated
	/// after planning completes.
	pub resolved_track: Option<Arc<Track>>,
}

impl TrackRequest {
	pub fn new(bucket: String, data_key: String, meta_key: String, start_ms: u64, duration_ms: u64, requested_track_number: u32) -> Self {
		Self {
			bucket,
			data_key,
			meta_key,
			start_ms,
			duration_ms,
			requested_track_number,
			requested_track_index: None,
			dts_start: 0,
			dts_end: 0,
			dts_first_sample_offset: 0,
			start_chunk_number: 0,
			timescale: 0,
			resolved_track: None,
		}
	}
}

/// One ABR ladder rung: an ordered concatenation of [`TrackRequest`]s.
#[derive(Debug, Clone)]
pub struct Representation {
	pub id: String,
	pub duration_ms: u64,
	pub tracks: Vec<TrackRequest>,

	/// Populated from the first TrackRequest's resolved track, used by the
	/// playlist renderers without re-touching the object store.
	pub mime_type: String,
	pub codec: String,
	pub bandwidth: u64,
	pub sample_rate: Option<u32>,
	pub channels: Option<u16>,
	pub width: Option<u32>,
	pub height: Option<u32>,
	pub fps_num: Option<u32>,
	pub fps_denum: Option<u32>,
	pub sar_w: Option<u32>,
	pub sar_h: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
	Dash,
	Hls,
}

/// The planner output, persisted in memory until expiry.
#[derive(Debug, Clone)]
pub struct Session {
	pub id: String,
	pub playlist_type: PlaylistType,
	pub base_url: String,
	pub chunk_duration_sec: u64,
	pub expires_at: Instant,
	pub duration_ms: u64,
	pub representations: BTreeMap<String, Representation>,

	/// HLS variant playlist bodies, rendered eagerly at master-playlist
	/// generation time so variant fetches are lock-free lookups.
	pub hls_variants: BTreeMap<String, String>,
}

impl Session {
	pub fn is_expired(&self, now: Instant) -> bool {
		now > self.expires_at
	}
}
