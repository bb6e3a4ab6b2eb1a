//! Versioned, length-prefixed binary encode/decode for [`MediaIndex`].
//!
//! The wire shape mirrors a tagged array: `[version, tracks]`. Decoding
//! validates the version is understood and that the array arity matches what
//! that version expects before looking at a single track. Audio and video
//! parameter blocks carry their own version byte so a newer encoder's extra
//! fields (`bits_per_sample`, SAR) don't break an older decoder's framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::model::*;

const CURRENT_VERSION: u16 = 2;
const VERSION_2_ARITY: u32 = 2;

const AUDIO_PARAMS_V1: u8 = 1;
const AUDIO_PARAMS_V2: u8 = 2;
const VIDEO_PARAMS_V1: u8 = 1;
const VIDEO_PARAMS_V2: u8 = 2;

trait Encode {
	fn encode(&self, w: &mut BytesMut);
}

trait Decode: Sized {
	fn decode(r: &mut Bytes) -> Result<Self>;
}

fn need(r: &Bytes, n: usize) -> Result<()> {
	if r.remaining() < n {
		Err(Error::CorruptMetadata)
	} else {
		Ok(())
	}
}

impl Encode for bool {
	fn encode(&self, w: &mut BytesMut) {
		w.put_u8(if *self { 1 } else { 0 });
	}
}

impl Decode for bool {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 1)?;
		Ok(r.get_u8() != 0)
	}
}

impl Encode for u8 {
	fn encode(&self, w: &mut BytesMut) {
		w.put_u8(*self);
	}
}

impl Decode for u8 {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 1)?;
		Ok(r.get_u8())
	}
}

impl Encode for u16 {
	fn encode(&self, w: &mut BytesMut) {
		w.put_u16(*self);
	}
}

impl Decode for u16 {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 2)?;
		Ok(r.get_u16())
	}
}

impl Encode for u32 {
	fn encode(&self, w: &mut BytesMut) {
		w.put_u32(*self);
	}
}

impl Decode for u32 {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 4)?;
		Ok(r.get_u32())
	}
}

impl Encode for u64 {
	fn encode(&self, w: &mut BytesMut) {
		w.put_u64(*self);
	}
}

impl Decode for u64 {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 8)?;
		Ok(r.get_u64())
	}
}

impl Encode for i64 {
	fn encode(&self, w: &mut BytesMut) {
		w.put_i64(*self);
	}
}

impl Decode for i64 {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 8)?;
		Ok(r.get_i64())
	}
}

impl Encode for String {
	fn encode(&self, w: &mut BytesMut) {
		(self.len() as u32).encode(w);
		w.put_slice(self.as_bytes());
	}
}

impl Decode for String {
	fn decode(r: &mut Bytes) -> Result<Self> {
		let len = u32::decode(r)? as usize;
		need(r, len)?;
		let bytes = r.split_to(len);
		String::from_utf8(bytes.to_vec()).map_err(|_| Error::CorruptMetadata)
	}
}

impl Encode for Vec<u8> {
	fn encode(&self, w: &mut BytesMut) {
		(self.len() as u32).encode(w);
		w.put_slice(self);
	}
}

impl Decode for Vec<u8> {
	fn decode(r: &mut Bytes) -> Result<Self> {
		let len = u32::decode(r)? as usize;
		need(r, len)?;
		Ok(r.split_to(len).to_vec())
	}
}

impl<T: Encode> Encode for Vec<T> {
	fn encode(&self, w: &mut BytesMut) {
		(self.len() as u32).encode(w);
		for item in self {
			item.encode(w);
		}
	}
}

impl<T: Decode> Decode for Vec<T> {
	fn decode(r: &mut Bytes) -> Result<Self> {
		let len = u32::decode(r)? as usize;
		let mut out = Vec::with_capacity(len.min(1 << 20));
		for _ in 0..len {
			out.push(T::decode(r)?);
		}
		Ok(out)
	}
}

impl<T: Encode> Encode for Option<T> {
	fn encode(&self, w: &mut BytesMut) {
		match self {
			Some(v) => {
				true.encode(w);
				v.encode(w);
			}
			None => false.encode(w),
		}
	}
}

impl<T: Decode> Decode for Option<T> {
	fn decode(r: &mut Bytes) -> Result<Self> {
		if bool::decode(r)? {
			Ok(Some(T::decode(r)?))
		} else {
			Ok(None)
		}
	}
}

impl Encode for Subtype {
	fn encode(&self, w: &mut BytesMut) {
		w.put_slice(&self.0);
	}
}

impl Decode for Subtype {
	fn decode(r: &mut Bytes) -> Result<Self> {
		need(r, 4)?;
		let mut tag = [0u8; 4];
		r.copy_to_slice(&mut tag);
		Ok(Subtype(tag))
	}
}

impl Encode for MediaKind {
	fn encode(&self, w: &mut BytesMut) {
		let tag: u8 = match self {
			MediaKind::Audio => 0,
			MediaKind::Video => 1,
			MediaKind::Other => 2,
		};
		tag.encode(w);
	}
}

impl Decode for MediaKind {
	fn decode(r: &mut Bytes) -> Result<Self> {
		match u8::decode(r)? {
			0 => Ok(MediaKind::Audio),
			1 => Ok(MediaKind::Video),
			2 => Ok(MediaKind::Other),
			_ => Err(Error::CorruptMetadata),
		}
	}
}

impl Encode for Sample {
	fn encode(&self, w: &mut BytesMut) {
		self.length.encode(w);
		self.byte_offset.encode(w);
		self.dts.encode(w);
		self.cts_offset.encode(w);
		self.description_index.encode(w);
		self.is_rap.encode(w);
	}
}

impl Decode for Sample {
	fn decode(r: &mut Bytes) -> Result<Self> {
		Ok(Sample {
			length: u32::decode(r)?,
			byte_offset: u64::decode(r)?,
			dts: u64::decode(r)?,
			cts_offset: i64::decode(r)?,
			description_index: u32::decode(r)?,
			is_rap: bool::decode(r)?,
		})
	}
}

impl Encode for Esd {
	fn encode(&self, w: &mut BytesMut) {
		self.object_type_indication.encode(w);
		self.stream_type.encode(w);
		self.max_bitrate.encode(w);
		self.avg_bitrate.encode(w);
		self.decoder_specific_info.encode(w);
	}
}

impl Decode for Esd {
	fn decode(r: &mut Bytes) -> Result<Self> {
		Ok(Esd {
			object_type_indication: u8::decode(r)?,
			stream_type: u8::decode(r)?,
			max_bitrate: u32::decode(r)?,
			avg_bitrate: u32::decode(r)?,
			decoder_specific_info: Vec::<u8>::decode(r)?,
		})
	}
}

impl Encode for AudioParams {
	fn encode(&self, w: &mut BytesMut) {
		AUDIO_PARAMS_V2.encode(w);
		self.sample_rate.encode(w);
		self.channels.encode(w);
		self.bits_per_sample.encode(w);
	}
}

impl Decode for AudioParams {
	fn decode(r: &mut Bytes) -> Result<Self> {
		match u8::decode(r)? {
			AUDIO_PARAMS_V1 => Ok(AudioParams {
				sample_rate: u32::decode(r)?,
				channels: u16::decode(r)?,
				bits_per_sample: 16,
			}),
			AUDIO_PARAMS_V2 => Ok(AudioParams {
				sample_rate: u32::decode(r)?,
				channels: u16::decode(r)?,
				bits_per_sample: u16::decode(r)?,
			}),
			_ => Err(Error::CorruptMetadata),
		}
	}
}

impl Encode for VideoParams {
	fn encode(&self, w: &mut BytesMut) {
		VIDEO_PARAMS_V2.encode(w);
		self.width.encode(w);
		self.height.encode(w);
		self.fps_num.encode(w);
		self.fps_denum.encode(w);
		self.sar_w.encode(w);
		self.sar_h.encode(w);
	}
}

impl Decode for VideoParams {
	fn decode(r: &mut Bytes) -> Result<Self> {
		match u8::decode(r)? {
			VIDEO_PARAMS_V1 => Ok(VideoParams {
				width: u32::decode(r)?,
				height: u32::decode(r)?,
				fps_num: u32::decode(r)?,
				fps_denum: u32::decode(r)?,
				sar_w: 1,
				sar_h: 1,
			}),
			VIDEO_PARAMS_V2 => Ok(VideoParams {
				width: u32::decode(r)?,
				height: u32::decode(r)?,
				fps_num: u32::decode(r)?,
				fps_denum: u32::decode(r)?,
				sar_w: u32::decode(r)?,
				sar_h: u32::decode(r)?,
			}),
			_ => Err(Error::CorruptMetadata),
		}
	}
}

impl Encode for Track {
	fn encode(&self, w: &mut BytesMut) {
		self.number.encode(w);
		self.id.encode(w);
		self.media_kind.encode(w);
		self.media_subtype.encode(w);
		self.mpeg4_subtype.encode(w);
		self.timescale.encode(w);
		self.duration.encode(w);
		self.media_timescale.encode(w);
		self.media_duration.encode(w);
		self.data_size.encode(w);
		self.bandwidth.encode(w);
		self.mime_type.encode(w);
		self.codec.encode(w);
		self.audio.encode(w);
		self.video.encode(w);
		self.esd.encode(w);
		self.samples.encode(w);
	}
}

impl Decode for Track {
	fn decode(r: &mut Bytes) -> Result<Self> {
		Ok(Track {
			number: u32::decode(r)?,
			id: u32::decode(r)?,
			media_kind: MediaKind::decode(r)?,
			media_subtype: Subtype::decode(r)?,
			mpeg4_subtype: Subtype::decode(r)?,
			timescale: u32::decode(r)?,
			duration: u64::decode(r)?,
			media_timescale: u32::decode(r)?,
			media_duration: u64::decode(r)?,
			data_size: u64::decode(r)?,
			bandwidth: u64::decode(r)?,
			mime_type: String::decode(r)?,
			codec: String::decode(r)?,
			audio: Option::<AudioParams>::decode(r)?,
			video: Option::<VideoParams>::decode(r)?,
			esd: Esd::decode(r)?,
			samples: Vec::<Sample>::decode(r)?,
		})
	}
}

/// Encode a [`MediaIndex`] at the current version (2).
pub fn encode(index: &MediaIndex) -> Bytes {
	let mut w = BytesMut::new();
	CURRENT_VERSION.encode(&mut w);
	VERSION_2_ARITY.encode(&mut w);
	index.tracks.encode(&mut w);
	w.freeze()
}

/// Decode a [`MediaIndex`], rejecting unknown versions and arity mismatches.
pub fn decode(bytes: Bytes) -> Result<MediaIndex> {
	let mut r = bytes;
	let version = u16::decode(&mut r)?;
	let arity = u32::decode(&mut r)?;

	match version {
		2 => {
			if arity != VERSION_2_ARITY {
				return Err(Error::CorruptMetadata);
			}
			let tracks = Vec::<Track>::decode(&mut r)?;
			Ok(MediaIndex { tracks })
		}
		other => Err(Error::UnsupportedMetadataVersion(other)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(dts: u64, is_rap: bool) -> Sample {
		Sample {
			length: 100,
			byte_offset: dts * 100,
			dts,
			cts_offset: 0,
			description_index: 1,
			is_rap,
		}
	}

	fn fixture() -> MediaIndex {
		MediaIndex {
			tracks: vec![Track {
				number: 1,
				id: 1,
				media_kind: MediaKind::Video,
				media_subtype: Subtype(*b"avc1"),
				mpeg4_subtype: Subtype::ZERO,
				timescale: 24000,
				duration: 240000,
				media_timescale: 24000,
				media_duration: 240000,
				data_size: 123456,
				bandwidth: 2_000_000,
				mime_type: "video/mp4".into(),
				codec: "avc1.640028".into(),
				audio: None,
				video: Some(VideoParams {
					width: 1280,
					height: 720,
					fps_num: 24,
					fps_denum: 1,
					sar_w: 1,
					sar_h: 1,
				}),
				esd: Esd {
					object_type_indication: 0x21,
					stream_type: 4,
					max_bitrate: 2_500_000,
					avg_bitrate: 2_000_000,
					decoder_specific_info: vec![0x01, 0x02, 0x03],
				},
				samples: (0..20).map(|i| sample(i * 1000, i % 12 == 0)).collect(),
			}],
		}
	}

	#[test]
	fn round_trip() {
		let index = fixture();
		let bytes = encode(&index);
		let decoded = decode(bytes).expect("decode");

		assert_eq!(decoded.tracks.len(), index.tracks.len());
		let (a, b) = (&index.tracks[0], &decoded.tracks[0]);
		assert_eq!(a.number, b.number);
		assert_eq!(a.codec, b.codec);
		assert_eq!(a.samples.len(), b.samples.len());
		assert_eq!(a.samples[5].dts, b.samples[5].dts);
		assert_eq!(a.video.unwrap().width, b.video.unwrap().width);
	}

	#[test]
	fn rejects_unsupported_version() {
		let mut w = BytesMut::new();
		1u16.encode(&mut w);
		2u32.encode(&mut w);
		Vec::<Track>::new().encode(&mut w);

		let err = decode(w.freeze()).unwrap_err();
		assert!(matches!(err, Error::UnsupportedMetadataVersion(1)));
	}

	#[test]
	fn rejects_arity_mismatch() {
		let mut w = BytesMut::new();
		2u16.encode(&mut w);
		3u32.encode(&mut w);
		Vec::<Track>::new().encode(&mut w);

		let err = decode(w.freeze()).unwrap_err();
		assert!(matches!(err, Error::CorruptMetadata));
	}

	#[test]
	fn audio_params_v1_defaults_bits_per_sample() {
		let mut w = BytesMut::new();
		AUDIO_PARAMS_V1.encode(&mut w);
		48000u32.encode(&mut w);
		2u16.encode(&mut w);

		let mut r = w.freeze();
		let params = AudioParams::decode(&mut r).expect("decode");
		assert_eq!(params.sample_rate, 48000);
		assert_eq!(params.bits_per_sample, 16);
	}
}
