//! DASH MPD renderer — spec §4.7.
//!
//! Hand-built XML, the way `hang::catalog::produce` hand-builds its JSON
//! catalog string for a small, fixed document shape rather than pulling in
//! a tree builder.

use reel_session::Session;

pub fn render(session: &Session) -> String {
	let mut out = String::new();
	out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
	out.push('\n');
	out.push_str(r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:full:2011" type="static" minBufferTime="PT1.5S""#);
	out.push_str(&format!(r#" mediaPresentationDuration="{}" maxSegmentDuration="{}">"#, print_time(session.duration_ms), print_time(session.chunk_duration_sec * 1000)));
	out.push('\n');
	out.push_str(&format!("  <BaseURL>{}</BaseURL>\n", xml_escape(&session.base_url)));

	out.push_str(&format!("  <Period duration=\"{}\">\n", print_time(session.duration_ms)));
	for repr in session.representations.values() {
		out.push_str("    <AdaptationSet segmentAlignment=\"true\">\n");
		render_representation(&mut out, repr);
		out.push_str("    </AdaptationSet>\n");
	}
	out.push_str("  </Period>\n");

	out.push_str("</MPD>\n");
	out
}

fn render_representation(out: &mut String, repr: &reel_session::Representation) {
	out.push_str(&format!(
		"      <Representation id=\"{}\" mimeType=\"{}\" codecs=\"{}\" bandwidth=\"{}\" startWithSAP=\"1\"",
		xml_escape(&repr.id),
		xml_escape(&repr.mime_type),
		xml_escape(&repr.codec),
		repr.bandwidth,
	));

	if let Some(width) = repr.width {
		out.push_str(&format!(" width=\"{width}\""));
	}
	if let Some(height) = repr.height {
		out.push_str(&format!(" height=\"{height}\""));
	}
	if let (Some(num), Some(denum)) = (repr.fps_num, repr.fps_denum) {
		if denum > 1 {
			out.push_str(&format!(" frameRate=\"{num}/{denum}\""));
		} else {
			out.push_str(&format!(" frameRate=\"{num}\""));
		}
	}
	if let (Some(w), Some(h)) = (repr.sar_w, repr.sar_h) {
		out.push_str(&format!(" sar=\"{w}:{h}\""));
	}
	if let Some(rate) = repr.sample_rate {
		out.push_str(&format!(" audioSamplingRate=\"{rate}\""));
	}

	if repr.channels.is_some() {
		out.push_str(">\n");
		if let Some(channels) = repr.channels {
			out.push_str(&format!(
				"        <AudioChannelConfiguration schemeIdUri=\"urn:mpeg:dash:23003:3:audio_channel_configuration:2011\" value=\"{channels}\"/>\n"
			));
		}
		out.push_str("      </Representation>\n");
	} else {
		out.push_str("/>\n");
	}
}

/// `PT{h}H{m}M{s:.3}S`, ISO 8601 duration for a whole-millisecond span.
fn print_time(duration_ms: u64) -> String {
	let total_seconds = duration_ms as f64 / 1000.0;
	let hours = (total_seconds / 3600.0) as u64;
	let minutes = ((total_seconds - (hours * 3600) as f64) / 60.0) as u64;
	let seconds = total_seconds - (hours * 3600) as f64 - (minutes * 60) as f64;
	format!("PT{hours}H{minutes}M{seconds:.3}S")
}

fn xml_escape(s: &str) -> String {
	s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;").replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_session::{PlaylistType, Representation, TrackRequest};
	use std::collections::BTreeMap;
	use std::time::Instant;

	fn session_with(repr: Representation) -> Session {
		let mut representations = BTreeMap::new();
		let duration_ms = repr.duration_ms;
		representations.insert(repr.id.clone(), repr);
		Session {
			id: "abc123".into(),
			playlist_type: PlaylistType::Dash,
			base_url: "http://localhost/stream/abc123/".into(),
			chunk_duration_sec: 5,
			expires_at: Instant::now(),
			duration_ms,
			representations,
			hls_variants: BTreeMap::new(),
		}
	}

	fn video_repr() -> Representation {
		Representation {
			id: "video".into(),
			duration_ms: 10_000,
			tracks: vec![TrackRequest::new("b".into(), "A".into(), "A.m".into(), 0, 10_000, 1)],
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

	#[test]
	fn renders_one_representation_per_group() {
		let xml = render(&session_with(video_repr()));
		assert!(xml.contains(r#"id="video""#));
		assert!(xml.contains(r#"mimeType="video/mp4""#));
		assert!(xml.contains(r#"bandwidth="2000000""#));
		assert!(xml.contains(r#"width="1280""#));
		assert!(xml.contains(r#"frameRate="24""#));
		assert!(xml.contains(r#"mediaPresentationDuration="PT0H0M10.000S""#));
	}

	#[test]
	fn audio_representation_gets_channel_configuration() {
		let mut repr = video_repr();
		repr.id = "audio".into();
		repr.mime_type = "audio/mp4".into();
		repr.codec = "mp4a.40.2".into();
		repr.width = None;
		repr.height = None;
		repr.fps_num = None;
		repr.fps_denum = None;
		repr.sar_w = None;
		repr.sar_h = None;
		repr.sample_rate = Some(48_000);
		repr.channels = Some(2);

		let xml = render(&session_with(repr));
		assert!(xml.contains(r#"audioSamplingRate="48000""#));
		assert!(xml.contains("AudioChannelConfiguration"));
		assert!(xml.contains(r#"value="2""#));
	}

	#[test]
	fn non_trivial_frame_rate_ratio_is_rendered() {
		let mut repr = video_repr();
		repr.fps_num = Some(30000);
		repr.fps_denum = Some(1001);
		let xml = render(&session_with(repr));
		assert!(xml.contains(r#"frameRate="30000/1001""#));
	}
}
