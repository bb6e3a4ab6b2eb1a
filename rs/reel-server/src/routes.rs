//! HTTP routes — spec §4.9 / §6.
//!
//! Grounded on `moq-relay`'s `axum`-based wiring (`axum` + `axum-server` +
//! `tower-http`'s CORS layer in its Cargo.toml): handlers hold a cheap
//! `Arc<AppState>` clone and dispatch to the library crates, never
//! touching the object store or registry directly beyond that.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use reel_session::{PlaylistType, Registry, Session};
use reel_store::ObjectStore;

use crate::config::Config;
use crate::error::AppError;

pub struct AppState {
	pub config: Config,
	pub store: Arc<dyn ObjectStore>,
	pub registry: Arc<Registry>,
}

pub fn router(state: Arc<AppState>) -> Router {
	Router::new()
		.route("/manifest", post(post_manifest))
		.route("/stream/{id}/playlist", get(get_playlist))
		.route("/stream/{id}/playlist/{variant}", get(get_variant_playlist))
		.route("/stream/{id}/init/{repr}", get(get_init))
		.route("/stream/{id}/play/{repr}/{chunk}", get(get_segment))
		.route("/upload/{bucket}/{key}", post(put_upload).put(put_upload))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[derive(Serialize)]
struct ManifestResponse {
	id: String,
	base_url: String,
	playlist_url: String,
}

async fn post_manifest(State(state): State<Arc<AppState>>, body: Bytes) -> Result<impl IntoResponse, AppError> {
	let req = reel_session::parse(&body).map_err(AppError::from)?;
	let playlist_type = req.playlist_type;

	let base_url = state.config.base_url();
	let mut session = reel_session::plan_session(req, state.store.clone(), base_url.clone(), reel_session::id::mint).await.map_err(AppError::from)?;

	if playlist_type == PlaylistType::Hls {
		session.hls_variants = reel_playlist::hls::render_variants(&session)
			.into_iter()
			.map(|(id, bytes)| (id, String::from_utf8_lossy(&bytes).into_owned()))
			.collect();
	}

	let id = session.id.clone();
	state.registry.insert(session);

	let playlist_url = format!("{base_url}stream/{id}/playlist");
	Ok(Json(ManifestResponse { id, base_url, playlist_url }))
}

fn lookup(state: &AppState, id: &str) -> Result<Arc<Session>, AppError> {
	let session = state.registry.get(id).ok_or(AppError::UnknownSession)?;
	if session.is_expired(Instant::now()) {
		return Err(AppError::Expired);
	}
	Ok(session)
}

/// A media-segment fetch grants an extension beyond `expires_at` of
/// `chunk_number * chunk_duration_sec`, so long-running playback can still
/// fetch late segments even as the session's removal is scheduled — spec
/// §5 "Cancellation and timeouts".
fn lookup_for_chunk(state: &AppState, id: &str, chunk_number: u64) -> Result<Arc<Session>, AppError> {
	let session = state.registry.get(id).ok_or(AppError::UnknownSession)?;
	let extension = Duration::from_secs(chunk_number * session.chunk_duration_sec);
	if Instant::now() > session.expires_at + extension {
		return Err(AppError::Expired);
	}
	Ok(session)
}

fn bytes_response(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response {
	let mut response = (status, body).into_response();
	response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
	response
}

async fn get_playlist(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Response, AppError> {
	let session = lookup(&state, &id)?;
	let body = match session.playlist_type {
		PlaylistType::Dash => reel_playlist::mpd::render(&session).into_bytes(),
		PlaylistType::Hls => reel_playlist::hls::render_master(&session),
	};
	let content_type = match session.playlist_type {
		PlaylistType::Dash => "application/dash+xml",
		PlaylistType::Hls => "application/vnd.apple.mpegurl",
	};
	Ok(bytes_response(StatusCode::OK, content_type, body))
}

async fn get_variant_playlist(State(state): State<Arc<AppState>>, Path((id, variant)): Path<(String, String)>) -> Result<Response, AppError> {
	let session = lookup(&state, &id)?;
	let body = session
		.hls_variants
		.get(&variant)
		.ok_or_else(|| AppError::UnknownRepresentation(variant.clone()))?
		.clone()
		.into_bytes();
	Ok(bytes_response(StatusCode::OK, "application/vnd.apple.mpegurl", body))
}

async fn get_init(State(state): State<Arc<AppState>>, Path((id, repr)): Path<(String, String)>) -> Result<Response, AppError> {
	let session = lookup(&state, &id)?;
	let representation = session.representations.get(&repr).ok_or_else(|| AppError::UnknownRepresentation(repr.clone()))?;
	let body = reel_mux::build_init(representation)?;
	Ok(bytes_response(StatusCode::OK, "application/mp4", body.to_vec()))
}

async fn get_segment(State(state): State<Arc<AppState>>, Path((id, repr, chunk)): Path<(String, String, u64)>) -> Result<Response, AppError> {
	let session = lookup_for_chunk(&state, &id, chunk)?;
	let representation = session.representations.get(&repr).ok_or_else(|| AppError::UnknownRepresentation(repr.clone()))?;
	let body = reel_mux::assemble(&session, representation, chunk, state.store.as_ref()).await?;

	let content_type = match session.playlist_type {
		PlaylistType::Dash => "video/mp4",
		PlaylistType::Hls => "video/MP2T",
	};
	Ok(bytes_response(StatusCode::OK, content_type, body.to_vec()))
}

async fn put_upload(State(state): State<Arc<AppState>>, Path((bucket, key)): Path<(String, String)>, body: Bytes) -> Result<impl IntoResponse, AppError> {
	if !state.config.buckets.is_empty() && !state.config.buckets.contains(&bucket) {
		return Err(AppError::BadRequest(format!("unknown bucket: {bucket}")));
	}

	let index = reel_index::read_bytes(body.clone())?;
	let meta_key = derived_meta_key(&key);
	let encoded = reel_index::codec::encode(&index);

	state.store.write(&bucket, &key, body).await?;
	state.store.write(&bucket, &meta_key, encoded).await?;

	Ok(StatusCode::OK)
}

fn derived_meta_key(key: &str) -> String {
	format!("{key}.meta")
}
