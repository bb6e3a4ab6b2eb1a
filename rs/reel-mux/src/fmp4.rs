//! fMP4 segment assembler — spec §4.8, fMP4 path.
//!
//! Grounded on `hang::import::fmp4`'s atom handling (`rs/hang/src/import/fmp4.rs`,
//! in particular `create_per_track_init_segments`) for the `moov` shape, and
//! on the original `iso_writer.hpp` for the fragment-per-RAP-boundary loop
//! and the absolute `base_media_decode_time` convention. Where the original
//! walks a live encoder's samples, this assembler walks a slice already
//! resolved by the planner (`reel_session::TrackRequest`) and a single
//! object-store read already holding every sample's bytes contiguously.

use bytes::{Bytes, BytesMut};
use mp4_atom::{
	Atom, Av01, Av1C, Avc1, AvcC, Co64, Dinf, Dref, Ftyp, Hdlr, Hev1, HevcConfigurationRecord, Hvc1, Mdat, Mdhd, Mdia, Mehd, Mfhd, Minf, Moof, Moov, Mp4a, Mvex,
	Mvhd, Opus as OpusBox, Smhd, Stbl, Stsd, Tfdt, Tfhd, Tkhd, Traf, Trak, Trex, Trun, TrunEntry, Url, Vmhd, Vp08, Vp09, VpcC,
};

use reel_index::{AudioParams, Esd, MediaKind, Sample, Track, VideoParams};
use reel_session::TrackRequest;

use crate::error::{Error, Result};

const FRAGMENT_DURATION_SECONDS: u64 = 1;

fn atom_err(e: impl std::fmt::Display) -> Error {
	Error::Atom(e.to_string())
}

fn ftyp() -> Ftyp {
	Ftyp {
		major_brand: *b"isom",
		minor_version: 0,
		compatible_brands: vec![*b"isom".into(), *b"iso6".into(), *b"mp41".into()],
	}
}

/// Build the `ftyp`+`moov` prefix shared by init segments and media
/// fragments. One track, fragmented (`mvex`/`trex` present, style 2 per
/// spec §4.8).
pub fn build_init(track: &Track) -> Result<Bytes> {
	let mut out = BytesMut::new();
	ftyp().encode(&mut out).map_err(atom_err)?;
	build_moov(track)?.encode(&mut out).map_err(atom_err)?;
	Ok(out.freeze())
}

fn build_moov(track: &Track) -> Result<Moov> {
	let trak = build_trak(track)?;
	Ok(Moov {
		mvhd: Mvhd { timescale: track.timescale, duration: 0, next_track_id: 2, ..Default::default() },
		trak: vec![trak],
		mvex: Some(Mvex {
			mehd: Some(Mehd { fragment_duration: 0 }),
			trex: vec![Trex { track_id: 1, default_sample_description_index: 1, default_sample_duration: 0, default_sample_size: 0, default_sample_flags: 0 }],
		}),
		udta: None,
		meta: None,
	})
}

fn build_trak(track: &Track) -> Result<Trak> {
	let handler: [u8; 4] = if track.media_kind == MediaKind::Video { *b"vide" } else { *b"soun" };
	let stsd = build_stsd(track)?;

	Ok(Trak {
		tkhd: Tkhd {
			track_id: 1,
			duration: 0,
			width: track.video.map(|v| v.width).unwrap_or_default().into(),
			height: track.video.map(|v| v.height).unwrap_or_default().into(),
			..Default::default()
		},
		edts: None,
		mdia: Mdia {
			mdhd: Mdhd { timescale: track.timescale, duration: 0, language: *b"und", ..Default::default() },
			hdlr: Hdlr { handler: handler.into(), name: "reel".to_string() },
			minf: Minf {
				vmhd: (track.media_kind == MediaKind::Video).then(|| Default::default()),
				smhd: (track.media_kind == MediaKind::Audio).then(|| Default::default()),
				dinf: Dinf { dref: Dref { urls: vec![Url::default()] } },
				stbl: Stbl { stsd, stts: Default::default(), stsc: Default::default(), stsz: Default::default(), stco: Default::default(), ctts: None, stss: None },
			},
		},
	})
}

fn build_stsd(track: &Track) -> Result<Stsd> {
	let codec = match track.media_subtype.as_str().as_ref() {
		"avc1" | "avc3" => build_avc1(track.video.unwrap_or_default(), &track.esd)?,
		"hev1" | "hvc1" => build_hevc(track.media_subtype.as_str().as_ref() == "hev1", track.video.unwrap_or_default(), &track.esd)?,
		"vp08" => mp4_atom::Codec::Vp08(Vp08 { visual: visual(track.video.unwrap_or_default()), ..Default::default() }),
		"vp09" => build_vp09(track.video.unwrap_or_default(), &track.esd)?,
		"av01" => build_av01(track.video.unwrap_or_default(), &track.esd)?,
		"mp4a" => build_mp4a(track.audio.unwrap_or_default(), &track.esd)?,
		"Opus" | "opus" => mp4_atom::Codec::Opus(OpusBox { audio: audio(track.audio.unwrap_or_default()), ..Default::default() }),
		other => return Err(Error::Atom(format!("unsupported codec for fmp4 remux: {other}"))),
	};
	Ok(Stsd { codecs: vec![codec] })
}

fn visual(v: VideoParams) -> mp4_atom::Visual {
	mp4_atom::Visual { width: v.width as u16, height: v.height as u16, ..Default::default() }
}

fn audio(a: AudioParams) -> mp4_atom::Audio {
	mp4_atom::Audio { channel_count: a.channels, sample_rate: (a.sample_rate as u16).into(), ..Default::default() }
}

fn build_avc1(v: VideoParams, esd: &Esd) -> Result<mp4_atom::Codec> {
	let mut buf = Bytes::from(esd.decoder_specific_info.clone());
	let avcc = AvcC::decode_body(&mut buf).map_err(atom_err)?;
	Ok(mp4_atom::Codec::Avc1(Avc1 { visual: visual(v), avcc, ..Default::default() }))
}

fn build_hevc(in_band: bool, v: VideoParams, esd: &Esd) -> Result<mp4_atom::Codec> {
	let mut buf = Bytes::from(esd.decoder_specific_info.clone());
	let hvcc: HevcConfigurationRecord = mp4_atom::Decode::decode(&mut buf).map_err(atom_err)?;
	if in_band {
		Ok(mp4_atom::Codec::Hev1(Hev1 { visual: visual(v), hvcc, ..Default::default() }))
	} else {
		Ok(mp4_atom::Codec::Hvc1(Hvc1 { visual: visual(v), hvcc, ..Default::default() }))
	}
}

fn build_vp09(v: VideoParams, esd: &Esd) -> Result<mp4_atom::Codec> {
	let mut buf = Bytes::from(esd.decoder_specific_info.clone());
	let vpcc = VpcC::decode_body(&mut buf).map_err(atom_err)?;
	Ok(mp4_atom::Codec::Vp09(Vp09 { visual: visual(v), vpcc, ..Default::default() }))
}

fn build_av01(v: VideoParams, esd: &Esd) -> Result<mp4_atom::Codec> {
	let mut buf = Bytes::from(esd.decoder_specific_info.clone());
	let av1c = Av1C::decode_body(&mut buf).map_err(atom_err)?;
	Ok(mp4_atom::Codec::Av01(Av01 { visual: visual(v), av1c, ..Default::default() }))
}

fn build_mp4a(a: AudioParams, esd: &Esd) -> Result<mp4_atom::Codec> {
	let es_desc = mp4_atom::EsDescriptor {
		dec_config: mp4_atom::DecoderConfigDescriptor {
			object_type_indication: esd.object_type_indication,
			stream_type: esd.stream_type,
			max_bitrate: esd.max_bitrate,
			avg_bitrate: esd.avg_bitrate,
			dec_specific: mp4_atom::DecoderSpecificInfo { data: esd.decoder_specific_info.clone(), ..Default::default() },
			..Default::default()
		},
		..Default::default()
	};
	Ok(mp4_atom::Codec::Mp4a(Mp4a { audio: audio(a), esds: mp4_atom::Esds { es_desc }, ..Default::default() }))
}

/// Media segment: the fragment loop of spec §4.8. `samples` is the
/// already-rebased-to-0 slice `[pos_start..=pos_end]` of the resolved
/// track; `sample_bytes` is the one contiguous byte-range read covering
/// exactly those samples, indexed by `sample.byte_offset - byte_range_start`.
pub fn build_media_segment(track: &Track, tr: &TrackRequest, samples: &[Sample], sample_bytes: &Bytes, range_start: u64) -> Result<Bytes> {
	let mut out = BytesMut::new();
	let mut seq = 1u32;
	let mut fragment_start = 0usize;
	let mut fragment_duration = 0u64;

	for i in 0..samples.len() {
		let is_new_fragment = i == 0 || (fragment_duration > FRAGMENT_DURATION_SECONDS * track.timescale as u64 && samples[i].is_rap);
		if is_new_fragment && i != 0 {
			write_fragment(&mut out, track, tr, &samples[fragment_start..i], sample_bytes, range_start, seq)?;
			seq += 1;
			fragment_start = i;
			fragment_duration = 0;
		}
		if i + 1 < samples.len() {
			fragment_duration += samples[i + 1].dts - samples[i].dts;
		}
	}
	write_fragment(&mut out, track, tr, &samples[fragment_start..], sample_bytes, range_start, seq)?;

	Ok(out.freeze())
}

fn write_fragment(out: &mut BytesMut, track: &Track, tr: &TrackRequest, samples: &[Sample], sample_bytes: &Bytes, range_start: u64, seq: u32) -> Result<()> {
	let first = samples.first().ok_or_else(|| Error::Atom("empty fragment".into()))?;
	let base_media_decode_time = tr.dts_first_sample_offset + first.dts;

	let mut entries = Vec::with_capacity(samples.len());
	let mut mdat = BytesMut::new();
	for (i, sample) in samples.iter().enumerate() {
		let duration = if i + 1 < samples.len() {
			samples[i + 1].dts - sample.dts
		} else if samples.len() >= 2 {
			sample.dts - samples[i - 1].dts
		} else {
			0
		};

		let start = (sample.byte_offset - range_start) as usize;
		let end = start + sample.length as usize;
		mdat.extend_from_slice(&sample_bytes[start..end]);

		entries.push(TrunEntry {
			duration: Some(duration as u32),
			size: Some(sample.length),
			flags: Some(sample_flags(sample.is_rap)),
			cts: Some(sample.cts_offset as i32),
		});
	}

	let moof = Moof {
		mfhd: Mfhd { sequence_number: seq },
		traf: vec![Traf {
			tfhd: Tfhd {
				track_id: 1,
				base_data_offset: None,
				sample_description_index: None,
				default_sample_duration: None,
				default_sample_size: None,
				default_sample_flags: None,
			},
			tfdt: Some(Tfdt { base_media_decode_time }),
			trun: vec![Trun { data_offset: Some(0), entries }],
		}],
	};

	let mut moof_bytes = BytesMut::new();
	moof.encode(&mut moof_bytes).map_err(atom_err)?;

	let mut moof_with_offset = BytesMut::new();
	let data_offset = (moof_bytes.len() + 8) as i32;
	let moof = Moof {
		mfhd: moof.mfhd,
		traf: moof
			.traf
			.into_iter()
			.map(|mut traf| {
				traf.trun[0].data_offset = Some(data_offset);
				traf
			})
			.collect(),
	};
	moof.encode(&mut moof_with_offset).map_err(atom_err)?;

	out.extend_from_slice(&moof_with_offset);
	Mdat { data: mdat.freeze() }.encode(out).map_err(atom_err)?;
	Ok(())
}

fn sample_flags(is_rap: bool) -> u32 {
	if is_rap {
		0x0200_0000
	} else {
		0x0101_0000
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_index::{MediaKind, Subtype};

	fn video_track() -> Track {
		Track {
			number: 1,
			id: 1,
			media_kind: MediaKind::Video,
			media_subtype: Subtype(*b"avc1"),
			mpeg4_subtype: Subtype::ZERO,
			timescale: 24000,
			duration: 240_000,
			media_timescale: 24000,
			media_duration: 240_000,
			data_size: 0,
			bandwidth: 2_000_000,
			mime_type: "video/mp4".into(),
			codec: "avc1.640028".into(),
			audio: None,
			video: Some(VideoParams { width: 1280, height: 720, fps_num: 24, fps_denum: 1, sar_w: 1, sar_h: 1 }),
			esd: Esd::default(),
			samples: Vec::new(),
		}
	}

	#[test]
	fn unsupported_codec_errors_cleanly() {
		let mut track = video_track();
		track.media_subtype = Subtype(*b"xxxx");
		let err = build_stsd(&track).unwrap_err();
		assert!(matches!(err, Error::Atom(_)));
	}
}
