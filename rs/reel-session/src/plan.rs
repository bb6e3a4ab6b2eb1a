//! Fan-out/fan-in session planner — spec §4.5.
//!
//! Metadata reads for every `TrackRequest` run concurrently on the tokio
//! runtime; each task owns a disjoint result slot, so there is no shared
//! mutable state to race on during the fan-out. Once every task has
//! returned, planning proceeds single-threaded: GOP-aligned slicing, DTS
//! rebasing and chunk numbering all depend on a representation's
//! TrackRequests being visited in order, which a concurrent phase can't
//! give you.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reel_index::timing::{sample_position_from_dts, PositionError};
use reel_index::{MediaIndex, Sample, Track};
use reel_store::ObjectStore;

use crate::error::{Error, Result};
use crate::model::{PlaylistType, Representation, Session, TrackRequest};
use crate::parse::{ManifestRequest, RepresentationRequest, TrackRequestInput};

/// Run the planner for a validated manifest request.
///
/// `base_url` is the origin's externally-visible URL prefix, used to
/// construct `playlist_url` in the session-creation response (assembled by
/// the caller, not here).
pub async fn plan(req: ManifestRequest, store: Arc<dyn ObjectStore>, base_url: String, id_mint: impl FnOnce() -> String) -> Result<Session> {
	let mut groups: Vec<(&'static str, Vec<TrackRequest>)> = Vec::new();
	if let Some(audio) = req.audio.as_ref().filter(|r| !r.skip) {
		groups.push(("audio", build_track_requests(audio)));
	}
	if let Some(video) = req.video.as_ref().filter(|r| !r.skip) {
		groups.push(("video", build_track_requests(video)));
	}
	if groups.is_empty() {
		return Err(Error::NoRepresentations);
	}

	// Chunk duration is shared, mutable state: any TrackRequest shorter than
	// the current value reduces it (spec §4.5 step 5). `fetch_min` gives
	// race-free convergence regardless of which task observes last.
	let chunk_duration_sec = Arc::new(AtomicU64::new(req.chunk_duration_sec.max(1)));

	let mut handles = Vec::new();
	for (group_index, (_, trs)) in groups.iter().enumerate() {
		for (slot_index, tr) in trs.iter().enumerate() {
			let tr = tr.clone();
			let store = store.clone();
			let chunk_duration_sec = chunk_duration_sec.clone();
			handles.push((group_index, slot_index, tokio::spawn(async move { resolve(tr, &*store, &chunk_duration_sec).await })));
		}
	}

	for (group_index, slot_index, handle) in handles {
		let resolved = handle.await.map_err(|e| Error::Join(e.to_string()))??;
		groups[group_index].1[slot_index] = resolved;
	}

	let chunk_duration_sec = chunk_duration_sec.load(Ordering::Acquire);

	let mut representations = std::collections::BTreeMap::new();
	for (id, tracks) in groups {
		representations.insert(id.to_string(), finalize_representation(id.to_string(), tracks, chunk_duration_sec)?);
	}

	let duration_ms = representations.values().map(|r| r.duration_ms).min().unwrap_or(0);
	for repr in representations.values_mut() {
		truncate_to(repr, duration_ms);
	}

	Ok(Session {
		id: id_mint(),
		playlist_type: req.playlist_type,
		base_url,
		chunk_duration_sec,
		expires_at: Instant::now() + Duration::from_secs(req.timeout_sec),
		duration_ms,
		representations,
		hls_variants: std::collections::BTreeMap::new(),
	})
}

fn build_track_requests(repr: &RepresentationRequest) -> Vec<TrackRequest> {
	repr.tracks
		.iter()
		.map(|t: &TrackRequestInput| TrackRequest::new(t.bucket.clone(), t.key.clone(), t.meta_key.clone(), t.start_ms, t.duration_ms, t.number))
		.collect()
}

/// Metadata-arrival phase for one `TrackRequest` — spec §4.5 "Per
/// TrackRequest metadata arrival".
async fn resolve(mut tr: TrackRequest, store: &dyn ObjectStore, chunk_duration_sec: &AtomicU64) -> Result<TrackRequest> {
	let bytes = reel_store::read_all(store, &tr.bucket, &tr.meta_key).await?;
	let index: MediaIndex = reel_index::codec::decode(bytes)?;
	let (track_index, track) = index.track_by_number(tr.requested_track_number).ok_or(Error::NoSuchTrack(tr.requested_track_number))?;

	let asset_duration_ms = track.duration_ms();
	if tr.start_ms >= asset_duration_ms {
		return Err(Error::StartBeyondDuration);
	}
	if track.samples.len() < 2 {
		return Err(Error::DegenerateTrack);
	}

	let remaining = asset_duration_ms - tr.start_ms;
	let duration_ms = if tr.duration_ms == 0 { remaining } else { tr.duration_ms.min(remaining) };

	if duration_ms / 1000 < chunk_duration_sec.load(Ordering::Acquire) {
		chunk_duration_sec.fetch_min((duration_ms / 1000).max(1), Ordering::AcqRel);
	}

	tr.duration_ms = duration_ms;
	tr.requested_track_index = Some(track_index);
	tr.timescale = track.timescale;
	tr.resolved_track = Some(Arc::new(track.clone()));
	Ok(tr)
}

/// Planning phase for one representation — spec §4.5 "When completed ==
/// N, enter planning".
fn finalize_representation(id: String, mut tracks: Vec<TrackRequest>, chunk_duration_sec: u64) -> Result<Representation> {
	let mut dts_accumulator = 0u64;
	let mut chunk_count = 0u64;
	let mut total_duration_ms = 0u64;

	for tr in &mut tracks {
		let track = tr.resolved_track.clone().expect("resolved during metadata phase");
		let samples = &track.samples;

		let requested_start_dts = tr.start_ms * tr.timescale as u64 / 1000;
		let start_pos = sample_position_from_dts(samples, requested_start_dts, true)?;
		let dts_start = samples[start_pos].dts;

		let requested_end_dts = dts_start + tr.duration_ms * tr.timescale as u64 / 1000;
		let end_pos = match sample_position_from_dts(samples, requested_end_dts, false) {
			Ok(pos) => pos,
			Err(PositionError::OutOfRangeHigh) => samples.len() - 1,
			Err(e) => return Err(e.into()),
		};

		let mut retained: Vec<Sample> = samples[start_pos..=end_pos].to_vec();
		for s in retained.iter_mut() {
			s.dts -= dts_start;
		}
		let last_delta = retained_last_delta(&retained);
		let span = retained.last().expect("at least one retained sample").dts + last_delta;

		tr.dts_start = dts_start;
		tr.dts_end = requested_end_dts;
		tr.dts_first_sample_offset = dts_accumulator;
		tr.start_chunk_number = chunk_count;

		let mut sliced = (*track).clone();
		sliced.samples = retained;
		tr.resolved_track = Some(Arc::new(sliced));

		let tr_chunks = tr.duration_ms.div_ceil(1000 * chunk_duration_sec).max(1);
		chunk_count += tr_chunks;
		dts_accumulator += span;
		total_duration_ms += tr.duration_ms;
	}

	let first = tracks[0].resolved_track.as_ref().expect("resolved");
	Ok(Representation {
		id,
		duration_ms: total_duration_ms,
		mime_type: first.mime_type.clone(),
		codec: first.codec.clone(),
		bandwidth: first.bandwidth,
		sample_rate: first.audio.map(|a| a.sample_rate),
		channels: first.audio.map(|a| a.channels),
		width: first.video.map(|v| v.width),
		height: first.video.map(|v| v.height),
		fps_num: first.video.map(|v| v.fps_num),
		fps_denum: first.video.map(|v| v.fps_denum),
		sar_w: first.video.map(|v| v.sar_w),
		sar_h: first.video.map(|v| v.sar_h),
		tracks,
	})
}

fn retained_last_delta(retained: &[Sample]) -> u64 {
	if retained.len() >= 2 {
		retained[retained.len() - 1].dts - retained[retained.len() - 2].dts
	} else {
		0
	}
}

/// Truncate every representation so all end at the same wall-clock time —
/// spec §4.5's final pass, required by DASH's single-mediaPresentationDuration
/// model. Only whole trailing TrackRequests are dropped; a representation
/// whose TrackRequest boundaries don't land exactly on `duration_ms` keeps
/// the smallest prefix that covers it, so its `duration_ms` may be
/// marginally longer than the session's rather than re-sliced mid-GOP.
fn truncate_to(repr: &mut Representation, duration_ms: u64) {
	if repr.duration_ms <= duration_ms {
		return;
	}

	let mut accumulated = 0u64;
	let mut keep = 0;
	for tr in &repr.tracks {
		if accumulated >= duration_ms {
			break;
		}
		accumulated += tr.duration_ms;
		keep += 1;
	}
	repr.tracks.truncate(keep.max(1));
	repr.duration_ms = repr.tracks.iter().map(|t| t.duration_ms).sum();
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use bytes::Bytes;
	use reel_index::{AudioParams, Esd, MediaKind, Subtype};
	use std::sync::Mutex;

	struct FakeStore {
		blobs: Mutex<std::collections::HashMap<(String, String), Bytes>>,
	}

	#[async_trait]
	impl ObjectStore for FakeStore {
		async fn read(&self, bucket: &str, key: &str, offset: u64, length: u64) -> reel_store::Result<Bytes> {
			let blobs = self.blobs.lock().unwrap();
			let blob = blobs.get(&(bucket.to_string(), key.to_string())).cloned().ok_or_else(|| reel_store::Error::NotFound {
				bucket: bucket.to_string(),
				key: key.to_string(),
			})?;
			Ok(blob.slice(offset as usize..(offset + length) as usize))
		}

		async fn write(&self, bucket: &str, key: &str, bytes: Bytes) -> reel_store::Result<()> {
			self.blobs.lock().unwrap().insert((bucket.to_string(), key.to_string()), bytes);
			Ok(())
		}

		async fn len(&self, bucket: &str, key: &str) -> reel_store::Result<u64> {
			let blobs = self.blobs.lock().unwrap();
			blobs
				.get(&(bucket.to_string(), key.to_string()))
				.map(|b| b.len() as u64)
				.ok_or_else(|| reel_store::Error::NotFound { bucket: bucket.to_string(), key: key.to_string() })
		}
	}

	fn asset(num_samples: u64, rap_every: u64, timescale: u32) -> MediaIndex {
		let samples = (0..num_samples)
			.map(|i| Sample {
				length: 100,
				byte_offset: i * 100,
				dts: i * 1000,
				cts_offset: 0,
				description_index: 1,
				is_rap: i % rap_every == 0,
			})
			.collect();
		MediaIndex {
			tracks: vec![Track {
				number: 1,
				id: 1,
				media_kind: MediaKind::Video,
				media_subtype: Subtype(*b"avc1"),
				mpeg4_subtype: Subtype::ZERO,
				timescale,
				duration: num_samples * 1000,
				media_timescale: timescale,
				media_duration: num_samples * 1000,
				data_size: num_samples * 100,
				bandwidth: 2_000_000,
				mime_type: "video/mp4".into(),
				codec: "avc1.640028".into(),
				audio: None,
				video: Some(reel_index::VideoParams { width: 1280, height: 720, fps_num: 24, fps_denum: 1, sar_w: 1, sar_h: 1 }),
				esd: Esd::default(),
				samples,
			}],
		}
	}

	#[tokio::test]
	async fn s1_single_asset_dash() {
		let index = asset(240, 12, 24000);
		let bytes = reel_index::codec::encode(&index);
		let store: Arc<dyn ObjectStore> = Arc::new(FakeStore { blobs: Mutex::new([(("b".to_string(), "A.m".to_string()), bytes)].into_iter().collect()) });

		let req = ManifestRequest {
			playlist_type: PlaylistType::Dash,
			timeout_sec: 10,
			chunk_duration_sec: 5,
			audio: None,
			video: Some(RepresentationRequest {
				skip: false,
				tracks: vec![TrackRequestInput {
					bucket: "b".into(),
					key: "A".into(),
					meta_key: "A.m".into(),
					start_ms: 0,
					duration_ms: 10_000,
					number: 1,
					skip: false,
				}],
			}),
		};

		let session = plan(req, store, "http://localhost".to_string(), || "fixed-id".to_string()).await.unwrap();
		assert_eq!(session.duration_ms, 10_000);
		let video = &session.representations["video"];
		assert_eq!(video.bandwidth, 2_000_000);
		assert_eq!(video.tracks.len(), 1);
		assert_eq!(video.tracks[0].start_chunk_number, 0);
	}

	#[tokio::test]
	async fn rejects_no_representations() {
		let store: Arc<dyn ObjectStore> = Arc::new(FakeStore { blobs: Mutex::new(Default::default()) });
		let req = ManifestRequest { playlist_type: PlaylistType::Dash, timeout_sec: 10, chunk_duration_sec: 5, audio: None, video: None };
		let err = plan(req, store, "http://localhost".to_string(), || "id".to_string()).await.unwrap_err();
		assert!(matches!(err, Error::NoRepresentations));
	}

	#[tokio::test]
	async fn propagates_no_such_track() {
		let index = asset(20, 1, 24000);
		let bytes = reel_index::codec::encode(&index);
		let store: Arc<dyn ObjectStore> = Arc::new(FakeStore { blobs: Mutex::new([(("b".to_string(), "A.m".to_string()), bytes)].into_iter().collect()) });

		let req = ManifestRequest {
			playlist_type: PlaylistType::Dash,
			timeout_sec: 10,
			chunk_duration_sec: 5,
			audio: None,
			video: Some(RepresentationRequest {
				skip: false,
				tracks: vec![TrackRequestInput { bucket: "b".into(), key: "A".into(), meta_key: "A.m".into(), start_ms: 0, duration_ms: 1000, number: 9, skip: false }],
			}),
		};

		let err = plan(req, store, "http://localhost".to_string(), || "id".to_string()).await.unwrap_err();
		assert!(matches!(err, Error::NoSuchTrack(9)));
	}
}
