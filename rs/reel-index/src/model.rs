use std::fmt;

/// One elementary-stream access unit recorded at ingest time.
///
/// `dts` and `cts_offset` are in the owning track's `timescale` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
	pub length: u32,
	pub byte_offset: u64,
	pub dts: u64,
	pub cts_offset: i64,
	pub description_index: u32,
	pub is_rap: bool,
}

/// A FourCC-style subtype tag (e.g. `avc1`, `hev1`, `mp4a`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subtype(pub [u8; 4]);

impl Subtype {
	pub const ZERO: Subtype = Subtype([0; 4]);

	pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.0)
	}
}

impl fmt::Debug for Subtype {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Subtype({:?})", self.as_str())
	}
}

impl fmt::Display for Subtype {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl From<[u8; 4]> for Subtype {
	fn from(v: [u8; 4]) -> Self {
		Subtype(v)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
	Audio,
	Video,
	Other,
}

/// Elementary-stream descriptor: the decoder-specific-info blob plus the
/// bits an ABR ladder needs without touching the source container again.
#[derive(Debug, Clone, Default)]
pub struct Esd {
	pub object_type_indication: u8,
	pub stream_type: u8,
	pub max_bitrate: u32,
	pub avg_bitrate: u32,
	pub decoder_specific_info: Vec<u8>,
}

/// Audio-only track parameters. Versioned: `bits_per_sample` was added in
/// index format version 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioParams {
	pub sample_rate: u32,
	pub channels: u16,
	pub bits_per_sample: u16,
}

/// Video-only track parameters. `sar_w`/`sar_h` were added in index format
/// version 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoParams {
	pub width: u32,
	pub height: u32,
	pub fps_num: u32,
	pub fps_denum: u32,
	pub sar_w: u32,
	pub sar_h: u32,
}

/// One elementary stream within a source asset.
#[derive(Debug, Clone)]
pub struct Track {
	/// 1-based position within the asset, matching the source container's
	/// track numbering.
	pub number: u32,
	pub id: u32,
	pub media_kind: MediaKind,
	pub media_subtype: Subtype,
	pub mpeg4_subtype: Subtype,

	pub timescale: u32,
	pub duration: u64,
	pub media_timescale: u32,
	pub media_duration: u64,
	pub data_size: u64,
	pub bandwidth: u64,

	pub mime_type: String,
	/// RFC 6381 codec string (e.g. `avc1.640028`).
	pub codec: String,

	pub audio: Option<AudioParams>,
	pub video: Option<VideoParams>,
	pub esd: Esd,

	/// Strictly increasing by `dts`.
	pub samples: Vec<Sample>,
}

impl Track {
	/// Duration in milliseconds, preferring the track-local timescale and
	/// falling back to the media (mdhd) timescale when the track duration
	/// is unusable (zero timescale, e.g. an edit-list-only track).
	pub fn duration_ms(&self) -> u64 {
		if self.timescale > 0 {
			self.duration * 1000 / self.timescale as u64
		} else if self.media_timescale > 0 {
			self.media_duration * 1000 / self.media_timescale as u64
		} else {
			0
		}
	}
}

/// The persisted per-asset record: a version tag plus the decoded tracks.
/// Current on-disk version is 2; see `codec.rs`.
#[derive(Debug, Clone)]
pub struct MediaIndex {
	pub tracks: Vec<Track>,
}

impl MediaIndex {
	pub fn track_by_number(&self, number: u32) -> Option<(usize, &Track)> {
		self.tracks.iter().enumerate().find(|(_, t)| t.number == number)
	}
}
