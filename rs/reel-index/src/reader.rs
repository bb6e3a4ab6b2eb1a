//! Progressive fMP4 ingest reader.
//!
//! Grounded on `hang::import::fmp4::Fmp4` (`rs/hang/src/import/fmp4.rs`): the
//! same `mp4_atom::Any::decode_maybe` progressive-feed loop over an
//! accumulating buffer, the same per-track lookup through `moov`/`mvex`
//! defaults when decoding `moof`/`mdat` pairs. Where hang turns each access
//! unit into a MOQ frame, this reader records it as a [`Sample`] with its
//! absolute byte offset into the source asset, since the object store reads
//! samples back out of the original file rather than a re-encoded stream.

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use mp4_atom::{Any, Atom, Codec, DecodeMaybe, Mdat, Moof, Moov, Trak};

use crate::error::{Error, Result};
use crate::model::{AudioParams, Esd, MediaIndex, MediaKind, Sample, Subtype, Track, VideoParams};

struct TrackAccum {
	number: u32,
	id: u32,
	media_kind: MediaKind,
	media_subtype: Subtype,
	mpeg4_subtype: Subtype,
	timescale: u32,
	duration: u64,
	media_timescale: u32,
	media_duration: u64,
	mime_type: String,
	codec: String,
	audio: Option<AudioParams>,
	video: Option<VideoParams>,
	esd: Esd,
	samples: Vec<Sample>,
}

/// Feeds bytes to the demuxer incrementally and accumulates a [`MediaIndex`].
///
/// Call [`Reader::feed`] with each chunk as it arrives (or once with the
/// whole file), then [`Reader::finish`] to obtain the result. [`read_bytes`]
/// is the one-shot convenience for a fully-buffered asset.
pub struct Reader {
	buf: BytesMut,
	base_offset: u64,
	moov: Option<Moov>,
	moof: Option<(Moof, u64, usize)>,
	tracks: HashMap<u32, TrackAccum>,
	track_order: Vec<u32>,
}

impl Default for Reader {
	fn default() -> Self {
		Self::new()
	}
}

impl Reader {
	pub fn new() -> Self {
		Self {
			buf: BytesMut::new(),
			base_offset: 0,
			moov: None,
			moof: None,
			tracks: HashMap::new(),
			track_order: Vec::new(),
		}
	}

	pub fn is_initialized(&self) -> bool {
		self.moov.is_some()
	}

	/// Feed the next chunk of the source asset.
	///
	/// Fails with [`Error::InvalidAsset`] if no `moov` box has been seen by
	/// the time this call returns and the buffer holds no further atoms to
	/// parse (i.e. the first feed yielded no track metadata).
	pub fn feed(&mut self, data: &[u8]) -> Result<()> {
		self.buf.extend_from_slice(data);
		self.decode()?;
		if !self.is_initialized() {
			return Err(Error::InvalidAsset("no moov box found in first feed".into()));
		}
		Ok(())
	}

	fn decode(&mut self) -> Result<()> {
		let mut cursor = std::io::Cursor::new(&self.buf[..]);
		let mut position = 0usize;

		loop {
			let atom = Any::decode_maybe(&mut cursor).map_err(|e| Error::Atom(e.to_string()))?;
			let Some(atom) = atom else { break };

			let atom_start = position;
			position = cursor.position() as usize;
			let abs_start = self.base_offset + atom_start as u64;

			match atom {
				Any::Ftyp(_) | Any::Styp(_) => {}
				Any::Moov(moov) => {
					self.init(&moov)?;
					self.moov = Some(moov);
				}
				Any::Moof(moof) => {
					if self.moof.is_some() {
						return Err(Error::InvalidAsset("duplicate moof box".into()));
					}
					let size = position - atom_start;
					self.moof = Some((moof, abs_start, size));
				}
				Any::Mdat(mdat) => {
					let size = position - atom_start;
					let header_size = size - mdat.data.len();
					let mdat_data_abs_start = abs_start + header_size as u64;
					self.extract(mdat, mdat_data_abs_start)?;
				}
				other => {
					tracing::trace!(?other, "skipping atom");
				}
			}
		}

		self.buf.advance(position);
		self.base_offset += position as u64;
		Ok(())
	}

	fn init(&mut self, moov: &Moov) -> Result<()> {
		if !self.tracks.is_empty() {
			return Ok(());
		}

		for (i, trak) in moov.trak.iter().enumerate() {
			let number = (i + 1) as u32;
			let id = trak.tkhd.track_id;
			let handler = &trak.mdia.hdlr.handler;

			let accum = match handler.as_ref() {
				b"vide" => Self::init_video(trak)?,
				b"soun" => Self::init_audio(trak)?,
				_ => continue,
			};

			self.track_order.push(id);
			self.tracks.insert(id, TrackAccum { number, id, ..accum });
		}

		Ok(())
	}

	fn init_video(trak: &Trak) -> Result<TrackAccum> {
		let stsd = &trak.mdia.minf.stbl.stsd;
		let codec = match stsd.codecs.len() {
			1 => &stsd.codecs[0],
			0 => return Err(Error::InvalidAsset("missing video codec".into())),
			_ => return Err(Error::InvalidAsset("multiple codecs in one track".into())),
		};

		let (media_subtype, codec_str, esd, video) = match codec {
			Codec::Avc1(avc1) => {
				let avcc = &avc1.avcc;
				let mut description = BytesMut::new();
				avcc.encode_body(&mut description).map_err(|e| Error::Atom(e.to_string()))?;
				let codec_str = format!(
					"avc1.{:02x}{:02x}{:02x}",
					avcc.avc_profile_indication, avcc.profile_compatibility, avcc.avc_level_indication
				);
				let video = VideoParams {
					width: avc1.visual.width as u32,
					height: avc1.visual.height as u32,
					fps_num: 0,
					fps_denum: 1,
					sar_w: 1,
					sar_h: 1,
				};
				let esd = Esd {
					decoder_specific_info: description.freeze().to_vec(),
					..Default::default()
				};
				(Subtype(*b"avc1"), codec_str, esd, video)
			}
			Codec::Hev1(hev1) => Self::init_hevc(true, &hev1.hvcc, hev1.visual.width as u32, hev1.visual.height as u32)?,
			Codec::Hvc1(hvc1) => Self::init_hevc(false, &hvc1.hvcc, hvc1.visual.width as u32, hvc1.visual.height as u32)?,
			Codec::Vp08(vp08) => (
				Subtype(*b"vp08"),
				"vp08.00.00.08".to_string(),
				Esd::default(),
				VideoParams {
					width: vp08.visual.width as u32,
					height: vp08.visual.height as u32,
					fps_num: 0,
					fps_denum: 1,
					sar_w: 1,
					sar_h: 1,
				},
			),
			Codec::Vp09(vp09) => {
				let vpcc = &vp09.vpcc;
				let codec_str = format!(
					"vp09.{:02}.{:02}.{:02}",
					vpcc.profile, vpcc.level, vpcc.bit_depth
				);
				let mut description = BytesMut::new();
				vpcc.encode_body(&mut description).map_err(|e| Error::Atom(e.to_string()))?;
				let esd = Esd { decoder_specific_info: description.freeze().to_vec(), ..Default::default() };
				(
					Subtype(*b"vp09"),
					codec_str,
					esd,
					VideoParams {
						width: vp09.visual.width as u32,
						height: vp09.visual.height as u32,
						fps_num: 0,
						fps_denum: 1,
						sar_w: 1,
						sar_h: 1,
					},
				)
			}
			Codec::Av01(av01) => {
				let av1c = &av01.av1c;
				let codec_str = format!("av01.{}.{:02}", av1c.seq_profile, av1c.seq_level_idx_0);
				let mut description = BytesMut::new();
				av1c.encode_body(&mut description).map_err(|e| Error::Atom(e.to_string()))?;
				let esd = Esd { decoder_specific_info: description.freeze().to_vec(), ..Default::default() };
				(
					Subtype(*b"av01"),
					codec_str,
					esd,
					VideoParams {
						width: av01.visual.width as u32,
						height: av01.visual.height as u32,
						fps_num: 0,
						fps_denum: 1,
						sar_w: 1,
						sar_h: 1,
					},
				)
			}
			other => return Err(Error::InvalidAsset(format!("unsupported video codec: {other:?}"))),
		};

		Ok(TrackAccum {
			number: 0,
			id: 0,
			media_kind: MediaKind::Video,
			media_subtype,
			mpeg4_subtype: media_subtype,
			timescale: trak.mdia.mdhd.timescale,
			duration: trak.tkhd.duration,
			media_timescale: trak.mdia.mdhd.timescale,
			media_duration: trak.mdia.mdhd.duration,
			mime_type: "video/mp4".to_string(),
			codec: codec_str,
			audio: None,
			video: Some(video),
			esd,
			samples: Vec::new(),
		})
	}

	fn init_hevc(in_band: bool, hvcc: &mp4_atom::Hvcc, width: u32, height: u32) -> Result<(Subtype, String, Esd, VideoParams)> {
		let mut description = BytesMut::new();
		hvcc.encode_body(&mut description).map_err(|e| Error::Atom(e.to_string()))?;

		let profile_space = match hvcc.general_profile_space {
			0 => "",
			1 => "A",
			2 => "B",
			_ => "C",
		};
		let tier = if hvcc.general_tier_flag { "H" } else { "L" };
		let compat = hvcc.general_profile_compatibility_flags.reverse_bits();
		let codec_str = format!(
			"{}.{}{}.{:x}.{}{}",
			if in_band { "hev1" } else { "hvc1" },
			profile_space,
			hvcc.general_profile_idc,
			compat,
			tier,
			hvcc.general_level_idc
		);

		let esd = Esd {
			decoder_specific_info: description.freeze().to_vec(),
			..Default::default()
		};
		let video = VideoParams { width, height, fps_num: 0, fps_denum: 1, sar_w: 1, sar_h: 1 };
		let tag = if in_band { *b"hev1" } else { *b"hvc1" };
		Ok((Subtype(tag), codec_str, esd, video))
	}

	fn init_audio(trak: &Trak) -> Result<TrackAccum> {
		let stsd = &trak.mdia.minf.stbl.stsd;
		let codec = match stsd.codecs.len() {
			1 => &stsd.codecs[0],
			0 => return Err(Error::InvalidAsset("missing audio codec".into())),
			_ => return Err(Error::InvalidAsset("multiple codecs in one track".into())),
		};

		let (media_subtype, codec_str, esd, audio) = match codec {
			Codec::Mp4a(mp4a) => {
				let dec_config = &mp4a.esds.es_desc.dec_config;
				let profile = dec_config.dec_specific.profile;
				let esd = Esd {
					object_type_indication: dec_config.object_type_indication,
					stream_type: dec_config.stream_type,
					max_bitrate: dec_config.max_bitrate,
					avg_bitrate: dec_config.avg_bitrate,
					decoder_specific_info: dec_config.dec_specific.data.clone(),
				};
				let audio = AudioParams {
					sample_rate: mp4a.audio.sample_rate.integer() as u32,
					channels: mp4a.audio.channel_count as u16,
					bits_per_sample: 16,
				};
				(Subtype(*b"mp4a"), format!("mp4a.40.{profile}"), esd, audio)
			}
			Codec::Opus(opus) => {
				let audio = AudioParams {
					sample_rate: opus.audio.sample_rate.integer() as u32,
					channels: opus.audio.channel_count as u16,
					bits_per_sample: 16,
				};
				(Subtype(*b"Opus"), "opus".to_string(), Esd::default(), audio)
			}
			other => return Err(Error::InvalidAsset(format!("unsupported audio codec: {other:?}"))),
		};

		Ok(TrackAccum {
			number: 0,
			id: 0,
			media_kind: MediaKind::Audio,
			media_subtype,
			mpeg4_subtype: media_subtype,
			timescale: trak.mdia.mdhd.timescale,
			duration: trak.tkhd.duration,
			media_timescale: trak.mdia.mdhd.timescale,
			media_duration: trak.mdia.mdhd.duration,
			mime_type: "audio/mp4".to_string(),
			codec: codec_str,
			audio: Some(audio),
			video: None,
			esd,
			samples: Vec::new(),
		})
	}

	fn extract(&mut self, mdat: Mdat, mdat_data_abs_start: u64) -> Result<()> {
		let moov = self.moov.as_ref().ok_or_else(|| Error::InvalidAsset("mdat before moov".into()))?;
		let (moof, moof_abs_start, moof_size) = self
			.moof
			.take()
			.ok_or_else(|| Error::InvalidAsset("mdat without preceding moof".into()))?;
		let mdat_len = mdat.data.len();

		for traf in &moof.traf {
			let track_id = traf.tfhd.track_id;
			let trak = moov
				.trak
				.iter()
				.find(|t| t.tkhd.track_id == track_id)
				.ok_or_else(|| Error::InvalidAsset("traf references unknown track".into()))?;
			let trex = moov
				.mvex
				.as_ref()
				.and_then(|mvex| mvex.trex.iter().find(|trex| trex.track_id == track_id));

			let default_duration = trex.map(|t| t.default_sample_duration).unwrap_or_default();
			let default_size = trex.map(|t| t.default_sample_size).unwrap_or_default();
			let default_flags = trex.map(|t| t.default_sample_flags).unwrap_or_default();
			let default_description_index = trex.map(|t| t.default_sample_description_index).unwrap_or(1);

			let tfdt = traf.tfdt.as_ref().ok_or_else(|| Error::InvalidAsset("missing tfdt box".into()))?;
			let mut dts = tfdt.base_media_decode_time;

			let is_video = trak.mdia.hdlr.handler.as_ref() == b"vide";

			// Offset relative to the start of the mdat's data region, mirroring
			// the ISOBMFF default-base-is-moof convention.
			let mut offset: i64 = traf.tfhd.base_data_offset.map(|v| v as i64).unwrap_or(0)
				- (moof_abs_start as i64 - mdat_data_abs_start as i64)
				- moof_size as i64;

			if traf.trun.is_empty() {
				return Err(Error::InvalidAsset("missing trun box".into()));
			}

			// `sample_description_index` is signaled per-`traf` (in `tfhd`, or
			// the track's `trex` default), never per sample within a `trun`.
			let description_index = traf.tfhd.sample_description_index.unwrap_or(default_description_index);

			for trun in &traf.trun {
				let tfhd = &traf.tfhd;

				if let Some(data_offset) = trun.data_offset {
					let base = tfhd.base_data_offset.unwrap_or_default() as i64;
					offset = base + data_offset as i64 - moof_size as i64;
				}

				for entry in &trun.entries {
					let flags = entry.flags.unwrap_or(tfhd.default_sample_flags.unwrap_or(default_flags));
					let duration = entry.duration.unwrap_or(tfhd.default_sample_duration.unwrap_or(default_duration));
					let size = entry.size.unwrap_or(tfhd.default_sample_size.unwrap_or(default_size));
					let cts = entry.cts.unwrap_or_default() as i64;

					if offset < 0 || offset as usize + size as usize > mdat_len {
						return Err(Error::InvalidAsset("sample offset out of range of mdat".into()));
					}

					let is_rap = if is_video {
						let sample_depends_on_none = (flags >> 24) & 0x3 == 0x2;
						let non_sync = (flags >> 16) & 0x1 == 0x1;
						sample_depends_on_none && !non_sync
					} else {
						true
					};

					let sample = Sample {
						length: size,
						byte_offset: mdat_data_abs_start + offset as u64,
						dts,
						cts_offset: cts,
						description_index,
						is_rap,
					};

					let track = self
						.tracks
						.get_mut(&track_id)
						.ok_or_else(|| Error::InvalidAsset("sample for unconfigured track".into()))?;
					track.samples.push(sample);

					dts += duration as u64;
					offset += size as i64;
				}
			}
		}

		Ok(())
	}

	/// Finalize the reader into a [`MediaIndex`], in source track order.
	///
	/// Fails with [`Error::InvalidAsset`] if no track metadata was ever
	/// observed.
	pub fn finish(self) -> Result<MediaIndex> {
		if self.tracks.is_empty() {
			return Err(Error::InvalidAsset("no tracks found".into()));
		}

		let mut tracks: Vec<Track> = self
			.track_order
			.into_iter()
			.filter_map(|id| self.tracks.get(&id))
			.map(|accum| {
				let data_size: u64 = accum.samples.iter().map(|s| s.length as u64).sum();
				let duration_ms = if accum.timescale > 0 {
					accum.duration * 1000 / accum.timescale as u64
				} else if accum.media_timescale > 0 {
					accum.media_duration * 1000 / accum.media_timescale as u64
				} else {
					0
				};
				let bandwidth = if accum.esd.avg_bitrate > 0 {
					accum.esd.avg_bitrate as u64
				} else if duration_ms > 0 {
					data_size * 8 * 1000 / duration_ms
				} else {
					0
				};

				Track {
					number: accum.number,
					id: accum.id,
					media_kind: accum.media_kind,
					media_subtype: accum.media_subtype,
					mpeg4_subtype: accum.mpeg4_subtype,
					timescale: accum.timescale,
					duration: accum.duration,
					media_timescale: accum.media_timescale,
					media_duration: accum.media_duration,
					data_size,
					bandwidth,
					mime_type: accum.mime_type.clone(),
					codec: accum.codec.clone(),
					audio: accum.audio,
					video: accum.video,
					esd: accum.esd.clone(),
					samples: accum.samples.clone(),
				}
			})
			.collect();

		tracks.sort_by_key(|t| t.number);
		Ok(MediaIndex { tracks })
	}
}

/// One-shot ingest of a fully-buffered source asset.
pub fn read_bytes(bytes: Bytes) -> Result<MediaIndex> {
	let mut reader = Reader::new();
	reader.feed(&bytes)?;
	reader.finish()
}
