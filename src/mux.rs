//! The single long-lived SSE stream shared by every `sse_v1`/`sse_v2`/
//! `sse_v2.1`/`sse_v3` submission on a session (C5, spec §4.5).

// crates.io
use futures::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};
// self
use crate::{_prelude::*, transport::SseStreamFactory};

/// A per-submission frame callback. Synchronous by design (spec §4.5,
/// §5): the multiplexer must deliver frames for one event_id in arrival
/// order, which a fire-and-forget spawn per frame would not guarantee.
pub type FrameCallback = Arc<dyn Fn(RawFrame) + Send + Sync>;

#[derive(Default)]
struct Registries {
	event_callbacks: HashMap<String, FrameCallback>,
	unclosed_events: HashSet<String>,
	pending_stream_messages: HashMap<String, Vec<RawFrame>>,
}

/// Holds at most one multiplexed SSE connection per session.
pub struct SseMux {
	registries: Mutex<Registries>,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl Default for SseMux {
	fn default() -> Self {
		Self::new()
	}
}
impl SseMux {
	pub fn new() -> Self {
		Self { registries: Mutex::new(Registries::default()), task: Mutex::new(None) }
	}

	/// Whether the stream is currently open (Invariant 6: open iff
	/// `unclosed_events` is non-empty).
	pub async fn is_open(&self) -> bool {
		self.task.lock().await.is_some()
	}

	/// Register a callback for `event_id`, draining any frame that was
	/// buffered while the POST reply for this id was still in flight
	/// (Invariant 4, Scenario S3). Per spec §9 open question 2, an empty
	/// `event_id` is rejected rather than silently tracked as unclosed.
	pub async fn register(&self, event_id: &str, callback: FrameCallback) {
		if event_id.is_empty() {
			tracing::warn!("refusing to register an empty event_id");

			return;
		}

		let mut registries = self.registries.lock().await;

		registries.unclosed_events.insert(event_id.to_owned());

		if let Some(buffered) = registries.pending_stream_messages.remove(event_id) {
			for frame in buffered {
				callback(frame);
			}
		}

		registries.event_callbacks.insert(event_id.to_owned(), callback);
	}

	/// Remove `event_id` from both registries (terminal teardown, spec
	/// §4.6 Terminal state; Invariant 4).
	pub async fn unregister(&self, event_id: &str) {
		let mut registries = self.registries.lock().await;

		registries.event_callbacks.remove(event_id);
		registries.unclosed_events.remove(event_id);
	}

	/// Dispatch one frame received off the wire: invoke the registered
	/// callback, or buffer it if the POST reply hasn't assigned this
	/// event_id to a callback yet. Returns `false` once the stream itself
	/// should stop being read (the `sse_v3` `close_stream` frame), `true`
	/// otherwise.
	///
	/// `close_stream` carries no `event_id` (it is a stream-level signal,
	/// not an event-level one, spec §4.5), so it must be recognized before
	/// any `event_id` branching rather than keyed on one.
	async fn dispatch(&self, event_id: Option<&str>, frame: RawFrame) -> bool {
		if frame.msg == "close_stream" {
			return false;
		}

		let Some(event_id) = event_id else { return true };
		let mut registries = self.registries.lock().await;

		if let Some(callback) = registries.event_callbacks.get(event_id).cloned() {
			drop(registries);
			callback(frame);
		} else {
			registries.pending_stream_messages.entry(event_id.to_owned()).or_default().push(frame);
		}

		true
	}

	/// Idempotently open the multiplex stream at `${root}/queue/data`. On
	/// failure, every currently-registered callback is told about it and
	/// dropped.
	pub async fn open(
		self: Arc<Self>,
		session_hash: &str,
		root: &str,
		factory: Arc<dyn SseStreamFactory>,
	) -> Result<()> {
		if self.task.lock().await.is_some() {
			return Ok(());
		}

		let url = format!("{root}/queue/data?session_hash={session_hash}");

		match factory.open(&url).await {
			Ok(mut stream) => {
				let mux = Arc::clone(&self);
				let handle = tokio::spawn(async move {
					while let Some(result) = stream.next().await {
						match result {
							Ok(frame) => {
								let event_id = frame.event_id.clone();

								if !mux.dispatch(event_id.as_deref(), frame).await {
									break;
								}
							},
							Err(e) => {
								tracing::warn!("multiplex stream error: {e}");
								break;
							},
						}
					}

					// The stream has ended for every reason it can end:
					// cleanly, on a transport error, or on `close_stream`.
					// Either way nothing more will arrive on it, so drop the
					// bookkeeping and the (now-stale) task handle.
					let mut registries = mux.registries.lock().await;

					registries.event_callbacks.clear();
					registries.unclosed_events.clear();
					registries.pending_stream_messages.clear();
					drop(registries);

					mux.task.lock().await.take();
				});

				*self.task.lock().await = Some(handle);

				Ok(())
			},
			Err(e) => {
				tracing::warn!("failed to open multiplex stream: {e}");

				let mut registries = self.registries.lock().await;
				let error_frame = RawFrame::msg("unexpected_error");

				for callback in registries.event_callbacks.values() {
					callback(error_frame.clone());
				}

				registries.event_callbacks.clear();
				registries.unclosed_events.clear();

				Err(e)
			},
		}
	}

	/// Close the stream. Must not be called while any event is still
	/// unclosed; the engine is responsible for only calling this once
	/// `unclosed_events` has emptied.
	pub async fn close(&self) {
		let still_unclosed = !self.registries.lock().await.unclosed_events.is_empty();

		debug_assert!(!still_unclosed, "close() called while events are still unclosed");

		if let Some(handle) = self.task.lock().await.take() {
			handle.abort();
		}
	}

	/// Called on receipt of the `sse_v3` `close_stream` frame: close only
	/// if nothing is outstanding.
	pub async fn close_if_idle(&self) {
		if self.registries.lock().await.unclosed_events.is_empty() {
			self.close().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::FrameStream;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct ScriptedSse(Vec<RawFrame>);
	#[async_trait::async_trait]
	impl SseStreamFactory for ScriptedSse {
		async fn open(&self, _url: &str) -> Result<FrameStream> {
			let frames = self.0.clone();

			Ok(Box::pin(futures::stream::iter(frames.into_iter().map(Ok))))
		}
	}

	#[tokio::test]
	async fn race_buffers_frame_until_registration() {
		let mux = Arc::new(SseMux::new());
		let factory: Arc<dyn SseStreamFactory> = Arc::new(ScriptedSse(vec![
			RawFrame::msg("process_generating").with_event_id("E2"),
		]));

		Arc::clone(&mux).open("hash", "http://x", factory).await.unwrap();

		// Give the forwarding task a chance to buffer the frame before we
		// register a callback for it (Scenario S3).
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;

		let seen = Arc::new(AtomicUsize::new(0));
		let seen2 = Arc::clone(&seen);

		mux.register("E2", Arc::new(move |_frame| {
			seen2.fetch_add(1, Ordering::SeqCst);
		}))
		.await;

		assert_eq!(seen.load(Ordering::SeqCst), 1);
		assert!(mux.registries.lock().await.pending_stream_messages.get("E2").is_none());
	}

	#[tokio::test]
	async fn empty_event_id_is_rejected() {
		let mux = SseMux::new();

		mux.register("", Arc::new(|_| {})).await;

		assert!(mux.registries.lock().await.unclosed_events.is_empty());
	}

	#[tokio::test]
	async fn unregister_removes_from_both_registries() {
		let mux = SseMux::new();

		mux.register("E1", Arc::new(|_| {})).await;
		mux.unregister("E1").await;

		let registries = mux.registries.lock().await;

		assert!(!registries.event_callbacks.contains_key("E1"));
		assert!(!registries.unclosed_events.contains("E1"));
	}

	/// A `close_stream` frame carries no `event_id`; it must still reach the
	/// forwarding loop and tear the stream down even when a submission is
	/// left registered (the `sse_v3` client-exception case, where
	/// `closes_mux_on_client_exception()` is `false` and nothing else ever
	/// unregisters it).
	#[tokio::test]
	async fn close_stream_closes_even_with_a_lingering_registration() {
		let mux = Arc::new(SseMux::new());

		mux.register("E1", Arc::new(|_| {})).await;

		let factory: Arc<dyn SseStreamFactory> =
			Arc::new(ScriptedSse(vec![RawFrame::msg("close_stream")]));

		Arc::clone(&mux).open("hash", "http://x", factory).await.unwrap();

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;

		assert!(!mux.is_open().await);

		let registries = mux.registries.lock().await;

		assert!(registries.event_callbacks.is_empty());
		assert!(registries.unclosed_events.is_empty());
	}
}
