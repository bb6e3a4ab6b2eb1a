//! Session registry and time-wheel expirer — spec §4.6.
//!
//! Grounded on `moq_lite::server::Server`'s mutex-guarded connection map
//! (`rs/moq-lite/src/server.rs`) for the registry shape, and a
//! `BinaryHeap`-ordered deadline queue — the standard idiom for "wake on
//! the nearest deadline" — for the expirer, since no teacher crate runs
//! one directly.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::model::Session;

/// A session's deadline is `expires_at + duration_ms`: it must outlive its
/// own playback window, not just the manifest timeout.
fn removal_deadline(session: &Session) -> Instant {
	session.expires_at + Duration::from_millis(session.duration_ms)
}

struct Inner {
	sessions: HashMap<String, Arc<Session>>,
	deadlines: BinaryHeap<Reverse<(Instant, String)>>,
}

/// Owns every live session. Insert and lookup take a short lock; sessions
/// themselves are read-only after insertion, so handlers holding an `Arc`
/// never contend with the registry again.
pub struct Registry {
	inner: Mutex<Inner>,
	wake: Notify,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new()
	}
}

impl Registry {
	pub fn new() -> Self {
		Self { inner: Mutex::new(Inner { sessions: HashMap::new(), deadlines: BinaryHeap::new() }), wake: Notify::new() }
	}

	/// Insert a freshly-planned session and schedule its eventual removal.
	pub fn insert(&self, session: Session) -> Arc<Session> {
		let session = Arc::new(session);
		let deadline = removal_deadline(&session);

		let mut inner = self.inner.lock().unwrap();
		inner.deadlines.push(Reverse((deadline, session.id.clone())));
		inner.sessions.insert(session.id.clone(), session.clone());
		drop(inner);

		// The expirer may be sleeping past this session's (earlier) deadline.
		self.wake.notify_one();
		session
	}

	pub fn get(&self, id: &str) -> Option<Arc<Session>> {
		self.inner.lock().unwrap().sessions.get(id).cloned()
	}

	/// Run the single expirer worker. Never returns; spawn it once per
	/// process and hold the `JoinHandle` for shutdown.
	pub async fn run_expirer(self: Arc<Self>) {
		loop {
			let next_deadline = {
				let inner = self.inner.lock().unwrap();
				inner.deadlines.peek().map(|Reverse((deadline, _))| *deadline)
			};

			match next_deadline {
				None => self.wake.notified().await,
				Some(deadline) => {
					let now = Instant::now();
					if deadline > now {
						tokio::select! {
							_ = tokio::time::sleep(deadline - now) => {}
							_ = self.wake.notified() => {}
						}
						continue;
					}
					self.pop_expired(now);
				}
			}
		}
	}

	fn pop_expired(&self, now: Instant) {
		let mut inner = self.inner.lock().unwrap();
		while let Some(Reverse((deadline, id))) = inner.deadlines.peek() {
			if *deadline > now {
				break;
			}
			let id = id.clone();
			inner.deadlines.pop();
			// The session may already be gone (removed for other reasons);
			// a stale heap entry is simply a no-op here.
			inner.sessions.remove(&id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::PlaylistType;
	use std::collections::BTreeMap;

	fn session(id: &str, timeout: Duration, duration_ms: u64) -> Session {
		Session {
			id: id.to_string(),
			playlist_type: PlaylistType::Dash,
			base_url: "http://localhost".into(),
			chunk_duration_sec: 5,
			expires_at: Instant::now() + timeout,
			duration_ms,
			representations: BTreeMap::new(),
			hls_variants: BTreeMap::new(),
		}
	}

	#[tokio::test]
	async fn insert_then_lookup_succeeds() {
		let registry = Registry::new();
		registry.insert(session("a", Duration::from_secs(10), 0));
		assert!(registry.get("a").is_some());
		assert!(registry.get("b").is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn expirer_removes_session_after_its_deadline() {
		let registry = Arc::new(Registry::new());
		registry.insert(session("a", Duration::from_millis(10), 0));

		let expirer = tokio::spawn(registry.clone().run_expirer());
		tokio::time::advance(Duration::from_millis(50)).await;
		tokio::task::yield_now().await;

		assert!(registry.get("a").is_none());
		expirer.abort();
	}

	#[tokio::test(start_paused = true)]
	async fn outstanding_reference_survives_removal() {
		let registry = Arc::new(Registry::new());
		let handle = registry.insert(session("a", Duration::from_millis(10), 0));

		let expirer = tokio::spawn(registry.clone().run_expirer());
		tokio::time::advance(Duration::from_millis(50)).await;
		tokio::task::yield_now().await;

		assert!(registry.get("a").is_none());
		assert_eq!(handle.id, "a");
		expirer.abort();
	}
}
