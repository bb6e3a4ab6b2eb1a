//! MPEG-2 Transport Stream segment assembler — spec §4.8, TS path.
//!
//! Grounded on the original `mpeg2ts_writer.hpp`'s per-track codec
//! selection and `h264_mp4toannexb`/`hevc_mp4toannexb` bitstream filters.
//! No example repo in the retrieval corpus demonstrates a write-side API
//! for any TS-muxing crate with enough certainty to ground field names
//! against, so this module writes ISO/IEC 13818-1 packets directly: PAT,
//! PMT and PES-over-TS packetization are all fixed, standardized byte
//! layouts, not an ecosystem convention to imitate. The four codecs the
//! original supports (AAC, MPEG-4 Part 2, H.264, HEVC) are the only ones
//! accepted here; anything else is `Error::UnsupportedCodec`.

use bytes::{BufMut, Bytes, BytesMut};

use reel_index::{Esd, Sample, Subtype, Track};
use reel_session::TrackRequest;

use crate::error::{Error, Result};

const TS_PACKET_LEN: usize = 188;
const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1000;
const ELEMENTARY_PID: u16 = 0x0100;
const PTS_DTS_TIMESCALE: u64 = 90_000;

#[derive(Clone, Copy, PartialEq, Eq)]
enum StreamType {
	Aac,
	Mpeg4Part2,
	H264,
	Hevc,
}

impl StreamType {
	fn from_subtype(subtype: Subtype) -> Result<Self> {
		match subtype.as_str().as_ref() {
			"mp4a" => Ok(StreamType::Aac),
			"avc1" | "avc3" => Ok(StreamType::H264),
			"hev1" | "hvc1" => Ok(StreamType::Hevc),
			"mp4v" => Ok(StreamType::Mpeg4Part2),
			other => Err(Error::UnsupportedCodec(other.to_string())),
		}
	}

	/// ISO/IEC 13818-1 Table 2-34 `stream_type` value.
	fn pmt_stream_type(self) -> u8 {
		match self {
			StreamType::Aac => 0x0F,
			StreamType::Mpeg4Part2 => 0x10,
			StreamType::H264 => 0x1B,
			StreamType::Hevc => 0x24,
		}
	}

	fn is_video(self) -> bool {
		matches!(self, StreamType::H264 | StreamType::Hevc | StreamType::Mpeg4Part2)
	}
}

/// Build a standalone `.ts` segment covering `samples` for one
/// representation's single elementary stream.
pub fn build_segment(track: &Track, tr: &TrackRequest, samples: &[Sample], sample_bytes: &Bytes, range_start: u64) -> Result<Bytes> {
	let stream_type = StreamType::from_subtype(track.media_subtype)?;

	let mut out = BytesMut::new();
	let mut cc = Continuity::default();
	write_pat(&mut out, &mut cc);
	write_pmt(&mut out, &mut cc, stream_type);

	for sample in samples {
		let start = (sample.byte_offset - range_start) as usize;
		let end = start + sample.length as usize;
		let raw = &sample_bytes[start..end];

		let payload = match stream_type {
			StreamType::H264 => mp4_to_annexb(raw, &track.esd, NalLengths::Avc, sample.is_rap)?,
			StreamType::Hevc => mp4_to_annexb(raw, &track.esd, NalLengths::Hevc, sample.is_rap)?,
			StreamType::Aac => wrap_adts(raw, &track.esd, track.audio.map(|a| a.sample_rate).unwrap_or(48_000), track.audio.map(|a| a.channels).unwrap_or(2)),
			StreamType::Mpeg4Part2 => Bytes::copy_from_slice(raw),
		};

		let dts = PTS_DTS_TIMESCALE.wrapping_mul(tr.dts_first_sample_offset + sample.dts) / track.timescale as u64;
		let pts = if sample.cts_offset >= 0 {
			dts + (PTS_DTS_TIMESCALE * sample.cts_offset as u64) / track.timescale as u64
		} else {
			dts.saturating_sub(PTS_DTS_TIMESCALE * (-sample.cts_offset) as u64 / track.timescale as u64)
		};

		write_pes(&mut out, &mut cc, &payload, pts, dts, stream_type.is_video(), sample.is_rap);
	}

	Ok(out.freeze())
}

#[derive(Default)]
struct Continuity {
	pat: u8,
	pmt: u8,
	es: u8,
}

fn ts_header(out: &mut BytesMut, pid: u16, payload_unit_start: bool, cc: u8, adaptation_pcr: Option<u64>) {
	out.put_u8(0x47);
	let pid_hi = 0x40u8 * payload_unit_start as u8 | ((pid >> 8) as u8 & 0x1F);
	out.put_u8(pid_hi);
	out.put_u8((pid & 0xFF) as u8);

	let has_adaptation = adaptation_pcr.is_some();
	let afc = if has_adaptation { 0x30 } else { 0x10 };
	out.put_u8(afc | (cc & 0x0F));

	if let Some(pcr) = adaptation_pcr {
		out.put_u8(7); // adaptation_field_length
		out.put_u8(0x10); // PCR_flag
		let base = pcr % (1 << 33);
		let ext = 0u16;
		let mut pcr_bytes = [0u8; 6];
		pcr_bytes[0] = (base >> 25) as u8;
		pcr_bytes[1] = (base >> 17) as u8;
		pcr_bytes[2] = (base >> 9) as u8;
		pcr_bytes[3] = (base >> 1) as u8;
		pcr_bytes[4] = ((base & 1) as u8) << 7 | 0x7E | ((ext >> 8) as u8 & 0x01);
		pcr_bytes[5] = (ext & 0xFF) as u8;
		out.extend_from_slice(&pcr_bytes);
	}
}

fn pad_to_packet(out: &mut BytesMut, packet_start: usize) {
	let written = out.len() - packet_start;
	if written < TS_PACKET_LEN {
		out.resize(packet_start + TS_PACKET_LEN, 0xFF);
	}
}

fn write_single_packet_section(out: &mut BytesMut, pid: u16, cc: &mut u8, section: &[u8]) {
	let packet_start = out.len();
	ts_header(out, pid, true, *cc, None);
	*cc = cc.wrapping_add(1) & 0x0F;
	out.put_u8(0x00); // pointer_field
	out.extend_from_slice(section);
	pad_to_packet(out, packet_start);
}

fn crc32_mpeg2(data: &[u8]) -> u32 {
	let mut crc: u32 = 0xFFFF_FFFF;
	for &byte in data {
		crc ^= (byte as u32) << 24;
		for _ in 0..8 {
			crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04C1_1DB7 } else { crc << 1 };
		}
	}
	crc
}

fn write_pat(out: &mut BytesMut, cc: &mut Continuity) {
	let mut section = BytesMut::new();
	section.put_u8(0x00); // table_id
	section.put_u16(0xB000 | 13); // section_syntax_indicator, reserved, section_length
	section.put_u16(1); // transport_stream_id
	section.put_u8(0xC1); // version_number=0, current_next_indicator=1
	section.put_u8(0); // section_number
	section.put_u8(0); // last_section_number
	section.put_u16(1); // program_number
	section.put_u16(0xE000 | PMT_PID);
	let crc = crc32_mpeg2(&section);
	section.put_u32(crc);
	write_single_packet_section(out, PAT_PID, &mut cc.pat, &section);
}

fn write_pmt(out: &mut BytesMut, cc: &mut Continuity, stream_type: StreamType) {
	let mut section = BytesMut::new();
	section.put_u8(0x02); // table_id
	section.put_u16(0xB000 | 17); // section_length
	section.put_u16(1); // program_number
	section.put_u8(0xC1);
	section.put_u8(0);
	section.put_u8(0);
	section.put_u16(0xE000 | ELEMENTARY_PID); // PCR_PID
	section.put_u16(0xF000); // program_info_length = 0
	section.put_u8(stream_type.pmt_stream_type());
	section.put_u16(0xE000 | ELEMENTARY_PID);
	section.put_u16(0xF000); // ES_info_length = 0
	let crc = crc32_mpeg2(&section);
	section.put_u32(crc);
	write_single_packet_section(out, PMT_PID, &mut cc.pmt, &section);
}

fn write_pts_dts(out: &mut BytesMut, marker: u8, ts: u64) {
	let ts = ts & 0x1_FFFF_FFFF;
	out.put_u8((marker << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 0x01);
	out.put_u16((((ts >> 15) as u16 & 0x7FFF) << 1) | 0x01);
	out.put_u16((((ts & 0x7FFF) as u16) << 1) | 0x01);
}

fn write_pes(out: &mut BytesMut, cc: &mut Continuity, payload: &[u8], pts: u64, dts: u64, is_video: bool, keyframe: bool) {
	let has_dts = pts != dts;

	let mut pes_header = BytesMut::new();
	pes_header.put_u8(0x80); // '10' marker, no scrambling/priority/alignment/copyright/original flags
	pes_header.put_u8(if has_dts { 0xC0 } else { 0x80 }); // PTS_DTS_flags
	let pts_dts_len = if has_dts { 10 } else { 5 };
	pes_header.put_u8(pts_dts_len);
	if has_dts {
		write_pts_dts(&mut pes_header, 0x3, pts);
		write_pts_dts(&mut pes_header, 0x1, dts);
	} else {
		write_pts_dts(&mut pes_header, 0x2, pts);
	}

	let stream_id: u8 = if is_video { 0xE0 } else { 0xC0 };
	let pes_packet_len = payload.len() + pes_header.len();
	let mut pes = BytesMut::new();
	pes.put_u8(0x00);
	pes.put_u8(0x00);
	pes.put_u8(0x01);
	pes.put_u8(stream_id);
	pes.put_u16(if pes_packet_len > 0xFFFF { 0 } else { pes_packet_len as u16 });
	pes.extend_from_slice(&pes_header);
	pes.extend_from_slice(payload);

	let mut remaining = &pes[..];
	let mut first = true;
	while !remaining.is_empty() {
		let packet_start = out.len();
		let pcr = (first && is_video && keyframe).then_some(dts * 300);
		ts_header(out, ELEMENTARY_PID, first, cc.es, pcr);
		cc.es = cc.es.wrapping_add(1) & 0x0F;
		let header_len = out.len() - packet_start;
		let space = TS_PACKET_LEN - header_len;
		let take = remaining.len().min(space);
		out.extend_from_slice(&remaining[..take]);
		remaining = &remaining[take..];
		pad_to_packet(out, packet_start);
		first = false;
	}
}

#[derive(Clone, Copy)]
enum NalLengths {
	Avc,
	Hevc,
}

/// Convert length-prefixed NAL units (MP4/`avcC`/`hvcC` style) to Annex-B
/// (start-code-prefixed), prepending parameter sets on a keyframe — the
/// in-band insertion that gives `h264_mp4toannexb`/`hevc_mp4toannexb` their
/// name, since a TS segment carries no separate init segment for a decoder
/// to pull VPS/SPS/PPS NALs from.
fn mp4_to_annexb(raw: &[u8], esd: &Esd, kind: NalLengths, keyframe: bool) -> Result<Bytes> {
	let length_size = match kind {
		NalLengths::Avc => parse_avcc_length_size(&esd.decoder_specific_info)?,
		NalLengths::Hevc => parse_hvcc_length_size(&esd.decoder_specific_info)?,
	};

	let mut out = BytesMut::new();
	if keyframe {
		let parameter_sets = match kind {
			NalLengths::Avc => parse_avcc_parameter_sets(&esd.decoder_specific_info)?,
			NalLengths::Hevc => parse_hvcc_parameter_sets(&esd.decoder_specific_info)?,
		};
		for ps in parameter_sets {
			out.extend_from_slice(&[0, 0, 0, 1]);
			out.extend_from_slice(&ps);
		}
	}

	let mut cursor = raw;
	while cursor.len() >= length_size {
		let len = read_length(cursor, length_size);
		cursor = &cursor[length_size..];
		if cursor.len() < len {
			return Err(Error::Ts("nal unit length exceeds sample bounds".into()));
		}
		out.extend_from_slice(&[0, 0, 0, 1]);
		out.extend_from_slice(&cursor[..len]);
		cursor = &cursor[len..];
	}
	Ok(out.freeze())
}

fn read_length(buf: &[u8], size: usize) -> usize {
	let mut v = 0usize;
	for &b in &buf[..size] {
		v = (v << 8) | b as usize;
	}
	v
}

fn parse_avcc_length_size(avcc: &[u8]) -> Result<usize> {
	if avcc.len() < 6 {
		return Err(Error::Ts("avcC too short".into()));
	}
	Ok(((avcc[4] & 0x03) + 1) as usize)
}

fn parse_hvcc_length_size(hvcc: &[u8]) -> Result<usize> {
	if hvcc.len() < 22 {
		return Err(Error::Ts("hvcC too short".into()));
	}
	Ok(((hvcc[21] & 0x03) + 1) as usize)
}

/// Extract the SPS/PPS NAL units (without the 2-byte length prefix) from an
/// `AVCDecoderConfigurationRecord` (ISO/IEC 14496-15 §5.2.4.1), in the
/// record's own order (SPS then PPS).
fn parse_avcc_parameter_sets(avcc: &[u8]) -> Result<Vec<Bytes>> {
	if avcc.len() < 6 {
		return Err(Error::Ts("avcC too short".into()));
	}
	let mut sets = Vec::new();
	let mut cursor = &avcc[5..];

	let num_sps = cursor[0] & 0x1F;
	cursor = &cursor[1..];
	for _ in 0..num_sps {
		cursor = take_length_prefixed(cursor, &mut sets)?;
	}

	if cursor.is_empty() {
		return Err(Error::Ts("avcC missing PPS count".into()));
	}
	let num_pps = cursor[0];
	cursor = &cursor[1..];
	for _ in 0..num_pps {
		cursor = take_length_prefixed(cursor, &mut sets)?;
	}

	Ok(sets)
}

/// Extract every parameter-set NAL unit (VPS/SPS/PPS, in array order) from
/// an `HEVCDecoderConfigurationRecord` (ISO/IEC 14496-15 §8.3.3.1.2).
fn parse_hvcc_parameter_sets(hvcc: &[u8]) -> Result<Vec<Bytes>> {
	if hvcc.len() < 23 {
		return Err(Error::Ts("hvcC too short".into()));
	}
	let num_arrays = hvcc[22];
	let mut sets = Vec::new();
	let mut cursor = &hvcc[23..];

	for _ in 0..num_arrays {
		if cursor.len() < 3 {
			return Err(Error::Ts("hvcC array header truncated".into()));
		}
		let num_nalus = u16::from_be_bytes([cursor[1], cursor[2]]) as usize;
		cursor = &cursor[3..];
		for _ in 0..num_nalus {
			cursor = take_length_prefixed(cursor, &mut sets)?;
		}
	}

	Ok(sets)
}

/// Read one 2-byte-length-prefixed NAL unit off the front of `cursor`,
/// push it onto `sets`, and return the remaining slice.
fn take_length_prefixed<'a>(cursor: &'a [u8], sets: &mut Vec<Bytes>) -> Result<&'a [u8]> {
	if cursor.len() < 2 {
		return Err(Error::Ts("parameter set length truncated".into()));
	}
	let len = u16::from_be_bytes([cursor[0], cursor[1]]) as usize;
	let cursor = &cursor[2..];
	if cursor.len() < len {
		return Err(Error::Ts("parameter set exceeds record bounds".into()));
	}
	sets.push(Bytes::copy_from_slice(&cursor[..len]));
	Ok(&cursor[len..])
}

const AAC_SAMPLE_RATES: [u32; 13] = [96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350];

fn aac_sample_rate_index(rate: u32) -> u8 {
	AAC_SAMPLE_RATES.iter().position(|&r| r == rate).unwrap_or(4) as u8
}

/// Wrap a raw AAC access unit (esds-carried, no framing) in a 7-byte ADTS
/// header, the framing HLS/TS segments require.
fn wrap_adts(raw: &[u8], _esd: &Esd, sample_rate: u32, channels: u16) -> Bytes {
	let profile = 2u8; // AAC-LC, matching the `mp4a.40.2` codec string this origin emits
	let freq_idx = aac_sample_rate_index(sample_rate);
	let frame_len = raw.len() + 7;

	let mut header = [0u8; 7];
	header[0] = 0xFF;
	header[1] = 0xF1; // MPEG-4, no CRC
	header[2] = ((profile - 1) << 6) | (freq_idx << 2) | ((channels as u8 >> 2) & 0x1);
	header[3] = ((channels as u8 & 0x3) << 6) | ((frame_len >> 11) as u8 & 0x03);
	header[4] = ((frame_len >> 3) & 0xFF) as u8;
	header[5] = (((frame_len & 0x7) as u8) << 5) | 0x1F;
	header[6] = 0xFC;

	let mut out = BytesMut::with_capacity(frame_len);
	out.extend_from_slice(&header);
	out.extend_from_slice(raw);
	out.freeze()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stream_type_maps_known_codecs() {
		assert!(matches!(StreamType::from_subtype(Subtype(*b"avc1")), Ok(StreamType::H264)));
		assert!(matches!(StreamType::from_subtype(Subtype(*b"hvc1")), Ok(StreamType::Hevc)));
		assert!(matches!(StreamType::from_subtype(Subtype(*b"mp4a")), Ok(StreamType::Aac)));
	}

	#[test]
	fn unsupported_codec_errors() {
		assert!(StreamType::from_subtype(Subtype(*b"vp09")).is_err());
	}

	#[test]
	fn avcc_length_size_parses() {
		let avcc = [1u8, 0x64, 0x00, 0x28, 0xFF, 0xE1, 0, 0];
		assert_eq!(parse_avcc_length_size(&avcc).unwrap(), 4);
	}

	#[test]
	fn avcc_parameter_sets_extracts_sps_and_pps() {
		let sps = [0x67, 0x64, 0x00, 0x28];
		let pps = [0x68, 0xEB];
		let mut avcc = vec![1u8, 0x64, 0x00, 0x28, 0xFF];
		avcc.push(0xE0 | 1); // numOfSequenceParameterSets = 1
		avcc.extend_from_slice(&(sps.len() as u16).to_be_bytes());
		avcc.extend_from_slice(&sps);
		avcc.push(1); // numOfPictureParameterSets = 1
		avcc.extend_from_slice(&(pps.len() as u16).to_be_bytes());
		avcc.extend_from_slice(&pps);

		let sets = parse_avcc_parameter_sets(&avcc).unwrap();
		assert_eq!(sets, vec![Bytes::copy_from_slice(&sps), Bytes::copy_from_slice(&pps)]);
	}

	#[test]
	fn mp4_to_annexb_prepends_parameter_sets_only_on_keyframe() {
		let sps = [0x67, 0x64, 0x00, 0x28];
		let pps = [0x68, 0xEB];
		let mut avcc = vec![1u8, 0x64, 0x00, 0x28, 0xFF];
		avcc.push(0xE0 | 1);
		avcc.extend_from_slice(&(sps.len() as u16).to_be_bytes());
		avcc.extend_from_slice(&sps);
		avcc.push(1);
		avcc.extend_from_slice(&(pps.len() as u16).to_be_bytes());
		avcc.extend_from_slice(&pps);

		let esd = Esd { decoder_specific_info: avcc, ..Esd::default() };
		let nal = [0x65, 0xAA, 0xBB]; // fake IDR slice, 4-byte length prefix below
		let mut raw = Vec::new();
		raw.extend_from_slice(&(nal.len() as u32).to_be_bytes());
		raw.extend_from_slice(&nal);

		let keyframe = mp4_to_annexb(&raw, &esd, NalLengths::Avc, true).unwrap();
		let mut expected = Vec::new();
		expected.extend_from_slice(&[0, 0, 0, 1]);
		expected.extend_from_slice(&sps);
		expected.extend_from_slice(&[0, 0, 0, 1]);
		expected.extend_from_slice(&pps);
		expected.extend_from_slice(&[0, 0, 0, 1]);
		expected.extend_from_slice(&nal);
		assert_eq!(&keyframe[..], &expected[..]);

		let non_keyframe = mp4_to_annexb(&raw, &esd, NalLengths::Avc, false).unwrap();
		let mut expected_p = Vec::new();
		expected_p.extend_from_slice(&[0, 0, 0, 1]);
		expected_p.extend_from_slice(&nal);
		assert_eq!(&non_keyframe[..], &expected_p[..]);
	}

	#[test]
	fn adts_header_has_sync_word() {
		let bytes = wrap_adts(&[0xAA, 0xBB], &Esd::default(), 48_000, 2);
		assert_eq!(bytes[0], 0xFF);
		assert_eq!(bytes[1] & 0xF0, 0xF0);
		assert_eq!(bytes.len(), 9);
	}

	#[test]
	fn pat_and_pmt_pack_into_single_ts_packets() {
		let mut out = BytesMut::new();
		let mut cc = Continuity::default();
		write_pat(&mut out, &mut cc);
		write_pmt(&mut out, &mut cc, StreamType::H264);
		assert_eq!(out.len(), 2 * TS_PACKET_LEN);
		assert_eq!(out[0], 0x47);
		assert_eq!(out[TS_PACKET_LEN], 0x47);
	}
}
