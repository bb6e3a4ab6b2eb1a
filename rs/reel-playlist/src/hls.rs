//! HLS master/variant playlist renderer — spec §4.7.
//!
//! Grounded on the teacher's actual `m3u8-rs` dependency
//! (`moq-mux::import::hls` already pulls it in for the inverse, parsing
//! direction); here we build `MasterPlaylist`/`MediaPlaylist` values and
//! serialize with their own `write_to`, the same entry point
//! `moq-mux::import::hls::publish_playlist` uses.

use std::collections::BTreeMap;

use m3u8_rs::{MasterPlaylist, MediaPlaylist, MediaPlaylistType, MediaSegment, Resolution, VariantStream};

use reel_session::{Representation, Session};

/// The master playlist: one `#EXT-X-STREAM-INF` per representation,
/// pointing at that representation's own variant playlist.
pub fn render_master(session: &Session) -> Vec<u8> {
	let variants: Vec<VariantStream> = session
		.representations
		.values()
		.map(|repr| VariantStream {
			uri: format!("playlist/{}", repr.id),
			bandwidth: repr.bandwidth,
			codecs: Some(normalize_codecs(&repr.codec)),
			resolution: match (repr.width, repr.height) {
				(Some(w), Some(h)) => Some(Resolution { width: w as u64, height: h as u64 }),
				_ => None,
			},
			..Default::default()
		})
		.collect();

	let playlist = MasterPlaylist { version: Some(3), variants, ..Default::default() };
	let mut out = Vec::new();
	playlist.write_to(&mut out).expect("writing to an in-memory buffer never fails");
	out
}

/// Variant playlists for every representation, rendered eagerly so later
/// variant fetches are lock-free lookups into the session (spec §5
/// "Ordering guarantees").
pub fn render_variants(session: &Session) -> BTreeMap<String, Vec<u8>> {
	session.representations.values().map(|repr| (repr.id.clone(), render_variant(repr, session.chunk_duration_sec))).collect()
}

fn render_variant(repr: &Representation, chunk_duration_sec: u64) -> Vec<u8> {
	let mut segments = Vec::new();

	for tr in &repr.tracks {
		let track_duration_sec = tr.duration_ms as f64 / 1000.0;
		let chunk_count = tr.duration_ms.div_ceil(1000 * chunk_duration_sec).max(1);
		let mut accumulated = 0f64;

		for i in 0..chunk_count {
			let duration = if i + 1 == chunk_count { track_duration_sec - accumulated } else { chunk_duration_sec as f64 };
			segments.push(MediaSegment { uri: format!("play/{}/{}", repr.id, tr.start_chunk_number + i), duration: duration as f32, ..Default::default() });
			accumulated += duration;
		}
	}

	let playlist = MediaPlaylist {
		version: Some(3),
		target_duration: chunk_duration_sec as f32,
		media_sequence: 0,
		segments,
		playlist_type: Some(MediaPlaylistType::Vod),
		end_list: true,
		..Default::default()
	};
	let mut out = Vec::new();
	playlist.write_to(&mut out).expect("writing to an in-memory buffer never fails");
	out
}

/// HLS requires `avc1` in the CODECS token even for streams whose `stsd`
/// uses the `avc3` (inband-parameter-set) variant.
fn normalize_codecs(codec: &str) -> String {
	if let Some(rest) = codec.strip_prefix("avc3") {
		format!("avc1{rest}")
	} else {
		codec.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_session::{PlaylistType, TrackRequest};
	use std::collections::BTreeMap;
	use std::time::Instant;

	fn track_request(start_chunk_number: u64, duration_ms: u64) -> TrackRequest {
		let mut tr = TrackRequest::new("b".into(), "A".into(), "A.m".into(), 0, duration_ms, 1);
		tr.start_chunk_number = start_chunk_number;
		tr
	}

	fn repr(id: &str, tracks: Vec<TrackRequest>) -> Representation {
		let duration_ms = tracks.iter().map(|t| t.duration_ms).sum();
		Representation {
			id: id.to_string(),
			duration_ms,
			tracks,
			mime_type: "video/mp4".into(),
			codec: "avc1.640028".into(),
			bandwidth: 2_000_000,
			sample_rate: None,
			channels: None,
			width: Some(1280),
			height: Some(720),
			fps_num: Some(24),
			fps_denum: Some(1),
			sar_w: Some(1),
			sar_h: Some(1),
		}
	}

	fn session(representations: BTreeMap<String, Representation>) -> Session {
		let duration_ms = representations.values().map(|r| r.duration_ms).min().unwrap_or(0);
		Session {
			id: "abc".into(),
			playlist_type: PlaylistType::Hls,
			base_url: "http://localhost/stream/abc/".into(),
			chunk_duration_sec: 1,
			expires_at: Instant::now(),
			duration_ms,
			representations,
			hls_variants: BTreeMap::new(),
		}
	}

	#[test]
	fn s2_spliced_hls_variant_has_twelve_segments_summing_to_twelve_seconds() {
		// Two assets, 5s then 7s, chunk_duration_sec = 1.
		let video = repr("video", vec![track_request(0, 5_000), track_request(5, 7_000)]);
		let mut reprs = BTreeMap::new();
		reprs.insert("video".to_string(), video);
		let variants = render_variants(&session(reprs));
		let body = String::from_utf8(variants["video"].clone()).unwrap();

		assert_eq!(body.matches("#EXTINF").count(), 12);
		assert!(body.contains("#EXT-X-ENDLIST"));
	}

	#[test]
	fn master_playlist_has_one_stream_inf_per_representation() {
		let video = repr("video", vec![track_request(0, 10_000)]);
		let mut reprs = BTreeMap::new();
		reprs.insert("video".to_string(), video);
		let body = String::from_utf8(render_master(&session(reprs))).unwrap();

		assert_eq!(body.matches("#EXT-X-STREAM-INF").count(), 1);
		assert!(body.contains("playlist/video"));
	}

	#[test]
	fn avc3_is_normalized_to_avc1_in_codecs() {
		assert_eq!(normalize_codecs("avc3.640028"), "avc1.640028");
		assert_eq!(normalize_codecs("hev1.1.6.L93.B0"), "hev1.1.6.L93.B0");
	}
}
