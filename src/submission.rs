//! The submission state machine and its transport drivers (C6, spec §4.6) —
//! by far the largest component. `Session::submit` (C7) resolves and
//! prepares the call, picks a transport, and hands off to [`submit`], which
//! spawns one task to own the wire conversation end to end and returns a
//! [`SubmissionHandle`] the caller registers listeners on.

// std
use std::sync::{
	Mutex as StdMutex,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use futures::StreamExt;
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	config::{Dependency, Protocol, Version},
	diff::{DiffOp, DiffPayload, DiffStore, PathSegment},
	mux::{FrameCallback, SseMux},
	payload,
	resolver::Resolved,
	transport::{HttpTransport, SseStreamFactory, WsTransport},
	upload::Upload,
};

/// Which wire transport a submission drives, selected once from
/// [`Dependency::skip_queue`] and the session's [`Protocol`] (spec §4.6
/// "Transport selection").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
	Direct,
	Ws,
	SseLegacy,
	SseMux,
}

/// Pick the transport a submission must use. `skip_queue` dependencies always
/// bypass the queue regardless of the session's protocol.
pub fn select_transport(protocol: Protocol, dependency: Dependency) -> TransportKind {
	if dependency.skip_queue {
		return TransportKind::Direct;
	}

	match protocol {
		Protocol::Ws => TransportKind::Ws,
		Protocol::Sse => TransportKind::SseLegacy,
		Protocol::SseV1 | Protocol::SseV2 | Protocol::SseV2_1 | Protocol::SseV3 => TransportKind::SseMux,
	}
}

/// The zerogpu one-shot header collaborator (spec §4.6): a `postMessage`
/// handshake this crate does not perform itself. The default implementation
/// is a no-op, matching every other out-of-scope collaborator in this crate.
#[async_trait::async_trait]
pub trait ZerogpuHeaderSource
where
	Self: Send + Sync,
{
	async fn headers(&self, space_id: &str) -> Result<Option<HashMap<String, String>>>;
}

/// The default [`ZerogpuHeaderSource`]: no headers, ever.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoZerogpuHeaders;
#[async_trait::async_trait]
impl ZerogpuHeaderSource for NoZerogpuHeaders {
	async fn headers(&self, _space_id: &str) -> Result<Option<HashMap<String, String>>> {
		Ok(None)
	}
}

/// The auth-token-exchange collaborator (spec §6 "JWT URL parameter"): turns
/// a `space_id` (plus whatever bearer token the session was given) into the
/// short-lived JWT appended as `__sign` on the WS join URL. The exchange
/// itself is out of scope here, same as [`ZerogpuHeaderSource`].
#[async_trait::async_trait]
pub trait JwtSource
where
	Self: Send + Sync,
{
	async fn sign(&self, space_id: &str) -> Result<Option<String>>;
}

/// The default [`JwtSource`]: no JWT, ever — the WS URL is left unsigned.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoJwt;
#[async_trait::async_trait]
impl JwtSource for NoJwt {
	async fn sign(&self, _space_id: &str) -> Result<Option<String>> {
		Ok(None)
	}
}

/// The transport collaborators a submission needs, bundled so [`Session`]
/// (C7) only has to build one of these once.
///
/// [`Session`]: crate::session::Session
#[derive(Clone)]
pub struct Collaborators {
	pub http: Arc<dyn HttpTransport>,
	pub ws: Arc<dyn WsTransport>,
	pub sse: Arc<dyn SseStreamFactory>,
	pub upload: Arc<dyn Upload>,
	pub zerogpu: Arc<dyn ZerogpuHeaderSource>,
	pub jwt: Arc<dyn JwtSource>,
}

/// Everything [`submit`] needs to drive one call end to end.
pub struct SubmitParams {
	pub resolved: Resolved,
	pub args: Vec<Value>,
	pub event_data: Option<Value>,
	pub trigger_id: Option<String>,
	pub session_hash: Arc<str>,
	pub root: String,
	pub version: Version,
	pub space_id: Option<String>,
	pub protocol: Protocol,
	pub collaborators: Collaborators,
	pub mux: Arc<SseMux>,
}

/// Internal terminal-once bookkeeping, checked by both the driving task and
/// [`SubmissionHandle::cancel`] so a submission never fires two terminal
/// statuses (Invariant 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Complete {
	Pending,
	Terminal(TerminalStage),
}

struct Shared {
	listeners: StdMutex<HashMap<EventKind, Vec<Listener>>>,
	complete: StdMutex<Complete>,
	event_id: StdMutex<Option<String>>,
	task: AsyncMutex<Option<JoinHandle<()>>>,
	fn_index: usize,
	endpoint_path: String,
	session_hash: Arc<str>,
	http: Arc<dyn HttpTransport>,
	transport: TransportKind,
	mux: Option<Arc<SseMux>>,
}
impl Shared {
	/// Flip to terminal exactly once; `false` if already terminal.
	fn mark_terminal(&self, stage: TerminalStage) -> bool {
		let mut complete = self.complete.lock().unwrap();

		if matches!(*complete, Complete::Terminal(_)) {
			return false;
		}

		*complete = Complete::Terminal(stage);

		true
	}
}

/// Fire `event` to every listener currently registered for its kind.
/// Snapshotting the list before iterating means a listener that registers
/// another listener mid-dispatch only affects subsequent events (spec §5).
fn emit(shared: &Shared, event: Event) {
	let listeners = {
		let map = shared.listeners.lock().unwrap();

		map.get(&event.kind()).cloned().unwrap_or_default()
	};

	for listener in listeners {
		listener(&event);
	}
}

fn status_event(shared: &Shared, status: StatusUpdate, broken: Option<bool>) -> Event {
	Event::Status {
		stage: status.stage,
		queue: status.queue,
		time: None,
		fn_index: shared.fn_index,
		endpoint: shared.endpoint_path.clone(),
		eta: status.eta,
		message: status.message,
		broken,
		progress: status.progress,
	}
}

fn data_event(
	shared: &Shared,
	data: Value,
	event_data: Option<Value>,
	trigger_id: Option<String>,
) -> Event {
	Event::Data {
		data,
		time: None,
		fn_index: shared.fn_index,
		endpoint: shared.endpoint_path.clone(),
		event_data,
		trigger_id,
	}
}

/// A handle to one in-flight (or finished) submission: registers listeners,
/// and lets the caller end it early (spec §3 `SubmissionHandle`).
#[derive(Clone)]
pub struct SubmissionHandle(Arc<Shared>);
impl SubmissionHandle {
	/// Register `listener` for `kind`, returning `self` for chaining (spec
	/// §3 `.on(event, fn)`).
	pub fn on(&self, kind: EventKind, listener: Listener) -> &Self {
		self.0.listeners.lock().unwrap().entry(kind).or_default().push(listener);

		self
	}

	/// Remove the first listener registered for `kind` whose identity
	/// matches `listener` (spec §3 `.off(event, fn)`).
	pub fn off(&self, kind: EventKind, listener: &Listener) {
		let mut map = self.0.listeners.lock().unwrap();

		if let Some(list) = map.get_mut(&kind) {
			if let Some(pos) = list.iter().position(|l| Arc::ptr_eq(l, listener)) {
				list.remove(pos);
			}
		}
	}

	/// Drop every registered listener without touching the transport (spec
	/// §3 `.destroy()`).
	pub fn destroy(&self) {
		self.0.listeners.lock().unwrap().clear();
	}

	/// Whether a terminal status has already been fired, either naturally
	/// or via [`Self::cancel`].
	pub fn is_terminal(&self) -> bool {
		matches!(*self.0.complete.lock().unwrap(), Complete::Terminal(_))
	}

	/// Tear the submission down early (spec §4.6 "Cancellation"): fire a
	/// synthetic `status{complete, queue: false}`, abort the driving task so
	/// no further frame is processed, unregister from the mux if this was a
	/// multiplexed submission, and best-effort `POST /reset`. Idempotent —
	/// calling this on an already-terminal submission is a no-op.
	pub async fn cancel(&self) {
		if !self.0.mark_terminal(TerminalStage::Complete) {
			return;
		}

		emit(
			&self.0,
			status_event(
				&self.0,
				StatusUpdate { stage: Stage::Complete, queue: false, eta: None, message: None, progress: None },
				None,
			),
		);

		if let Some(handle) = self.0.task.lock().await.take() {
			handle.abort();
		}

		let event_id = self.0.event_id.lock().unwrap().clone();

		if let Some(mux) = &self.0.mux {
			if let Some(id) = &event_id {
				mux.unregister(id).await;
				mux.close_if_idle().await;
			}
		}

		let body = if self.0.transport == TransportKind::Ws {
			serde_json::json!({ "fn_index": self.0.fn_index, "session_hash": &*self.0.session_hash })
		} else {
			serde_json::json!({ "event_id": event_id })
		};

		if let Err(e) = self.0.http.post_json("/reset", body).await {
			tracing::warn!("best-effort /reset failed: {e}");
		}
	}
}

/// Resolve+prepare the call and spawn its driving task (spec §4.6 Prep
/// state). Synchronous failures (unknown endpoint, missing api) are the
/// caller's job — `Session::submit` returns those before ever calling this.
pub fn submit(params: SubmitParams) -> SubmissionHandle {
	let SubmitParams {
		resolved,
		args,
		event_data,
		trigger_id,
		session_hash,
		root,
		version,
		space_id,
		protocol,
		collaborators,
		mux,
	} = params;
	let transport = select_transport(protocol, resolved.dependency);
	let shared = Arc::new(Shared {
		listeners: StdMutex::new(HashMap::new()),
		complete: StdMutex::new(Complete::Pending),
		event_id: StdMutex::new(None),
		task: AsyncMutex::new(None),
		fn_index: resolved.fn_index,
		endpoint_path: resolved.endpoint_path.clone(),
		session_hash: Arc::clone(&session_hash),
		http: Arc::clone(&collaborators.http),
		transport,
		mux: if transport == TransportKind::SseMux { Some(Arc::clone(&mux)) } else { None },
	});
	let handle = SubmissionHandle(Arc::clone(&shared));
	let task_shared = Arc::clone(&shared);
	let task = tokio::spawn(async move {
		run(
			task_shared,
			transport,
			collaborators,
			mux,
			resolved,
			args,
			event_data,
			trigger_id,
			root,
			version,
			space_id,
			protocol,
		)
		.await;
	});

	// Stash the JoinHandle without blocking the caller on an await: `submit`
	// is synchronous, so spawn a tiny task to do the (uncontended) async
	// mutex lock instead of taking `task.lock()` here directly.
	let stash_shared = Arc::clone(&shared);

	tokio::spawn(async move {
		*stash_shared.task.lock().await = Some(task);
	});

	handle
}

#[allow(clippy::too_many_arguments)]
async fn run(
	shared: Arc<Shared>,
	transport: TransportKind,
	collaborators: Collaborators,
	mux: Arc<SseMux>,
	resolved: Resolved,
	args: Vec<Value>,
	event_data: Option<Value>,
	trigger_id: Option<String>,
	root: String,
	version: Version,
	space_id: Option<String>,
	protocol: Protocol,
) {
	let payload = match payload::prepare(&resolved.api_info, args, collaborators.upload.as_ref()).await {
		Ok(payload) => payload,
		Err(e) => {
			shared.mark_terminal(TerminalStage::Error);
			emit(
				&shared,
				status_event(
					&shared,
					StatusUpdate {
						stage: Stage::Error,
						queue: false,
						eta: None,
						message: Some(e.to_string()),
						progress: None,
					},
					None,
				),
			);

			return;
		},
	};

	emit(
		&shared,
		status_event(
			&shared,
			StatusUpdate {
				stage: Stage::Pending,
				queue: transport != TransportKind::Direct,
				eta: None,
				message: None,
				progress: None,
			},
			None,
		),
	);

	match transport {
		TransportKind::Direct =>
			direct_run(&shared, &collaborators, &payload, event_data, trigger_id).await,
		TransportKind::Ws =>
			ws_run(
				&shared,
				&collaborators,
				&root,
				version,
				space_id.as_deref(),
				&payload,
				event_data,
				trigger_id,
			)
			.await,
		TransportKind::SseLegacy =>
			sse_legacy_run(&shared, &collaborators, &root, &payload, event_data, trigger_id).await,
		TransportKind::SseMux =>
			sse_mux_run(
				&shared,
				&collaborators,
				&mux,
				&root,
				resolved.dependency.zerogpu,
				space_id,
				protocol,
				&payload,
				event_data,
				trigger_id,
			)
			.await,
	}
}

/// `data`/`event_data`/`trigger_id`/`session_hash` as the server expects on
/// every submission-carrying request (spec §6).
fn submit_body(
	fn_index: usize,
	session_hash: &str,
	data: &[Value],
	event_data: &Option<Value>,
	trigger_id: &Option<String>,
) -> Value {
	serde_json::json!({
		"fn_index": fn_index,
		"session_hash": session_hash,
		"data": data,
		"event_data": event_data,
		"trigger_id": trigger_id,
	})
}

async fn direct_run(
	shared: &Arc<Shared>,
	collaborators: &Collaborators,
	payload: &[Value],
	event_data: Option<Value>,
	trigger_id: Option<String>,
) {
	let body = submit_body(shared.fn_index, &shared.session_hash, payload, &event_data, &trigger_id);

	match collaborators.http.post_json(&format!("/run{}", shared.endpoint_path), body).await {
		Ok(resp) if resp.is_success() => match resp.json::<Output>() {
			Ok(output) => {
				if let Some(err) = output.error {
					finish_error(shared, err);

					return;
				}

				if !output.data.is_null() {
					emit(shared, data_event(shared, output.data, event_data, trigger_id));
				}

				finish(
					shared,
					StatusUpdate {
						stage: Stage::Complete,
						queue: false,
						eta: output.average_duration,
						message: None,
						progress: None,
					},
				);
			},
			Err(e) => finish_error(shared, e.to_string()),
		},
		Ok(resp) => {
			let message =
				resp.json::<Output>().ok().and_then(|o| o.error).unwrap_or(resp.body);

			finish_error(shared, message);
		},
		Err(e) => finish_error(shared, e.to_string()),
	}
}

/// Fire the one terminal status this submission is allowed to fire, and mark
/// it terminal. A no-op if already terminal (e.g. the caller cancelled
/// concurrently).
fn finish(shared: &Arc<Shared>, status: StatusUpdate) {
	let stage = match status.stage {
		Stage::Error => TerminalStage::Error,
		_ => TerminalStage::Complete,
	};

	if shared.mark_terminal(stage) {
		emit(shared, status_event(shared, status, None));
	}
}

fn finish_error(shared: &Arc<Shared>, message: String) {
	finish(shared, StatusUpdate { stage: Stage::Error, queue: false, eta: None, message: Some(message), progress: None });
}

fn finish_broken(shared: &Arc<Shared>) {
	if shared.mark_terminal(TerminalStage::Error) {
		emit(
			shared,
			status_event(
				shared,
				StatusUpdate {
					stage: Stage::Error,
					queue: true,
					eta: None,
					message: Some(crate::error::BROKEN_CONNECTION_MSG.to_owned()),
					progress: None,
				},
				Some(true),
			),
		);
	}
}

async fn ws_run(
	shared: &Arc<Shared>,
	collaborators: &Collaborators,
	root: &str,
	version: Version,
	space_id: Option<&str>,
	payload: &[Value],
	event_data: Option<Value>,
	trigger_id: Option<String>,
) {
	let mut url = format!("{root}/queue/join?fn_index={}&session_hash={}", shared.fn_index, shared.session_hash);

	if let Some(space_id) = space_id {
		if let Ok(Some(jwt)) = collaborators.jwt.sign(space_id).await {
			url.push_str("&__sign=");
			url.push_str(&jwt);
		}
	}

	let mut conn = match collaborators.ws.connect(&url).await {
		Ok(conn) => conn,
		Err(e) => {
			finish_error(shared, e.to_string());

			return;
		},
	};

	if version.requires_legacy_hash_handshake() {
		let _ = conn.send(serde_json::json!({ "hash": &*shared.session_hash })).await;
	}

	loop {
		match conn.recv().await {
			Ok(Some(frame)) => match frame::interpret(&frame, None) {
				Interpreted::HashRequest => {
					let _ = conn
						.send(serde_json::json!({ "fn_index": shared.fn_index, "session_hash": &*shared.session_hash }))
						.await;
				},
				Interpreted::DataRequest { .. } => {
					let body =
						submit_body(shared.fn_index, &shared.session_hash, payload, &event_data, &trigger_id);

					if conn.send(body).await.is_err() {
						finish_broken(shared);
						conn.close().await;

						return;
					}
				},
				Interpreted::Generating(status, data) => {
					emit(shared, status_event(shared, status, None));

					if let Some(data) = data {
						if !data.is_null() {
							emit(shared, data_event(shared, data, event_data.clone(), trigger_id.clone()));
						}
					}
				},
				Interpreted::Complete(status) => {
					if let Some(data) = frame::frame_data(&frame) {
						if !data.is_null() {
							emit(shared, data_event(shared, data, event_data, trigger_id));
						}
					}

					finish(shared, status);
					conn.close().await;

					return;
				},
				Interpreted::Log(log) => emit(
					shared,
					Event::Log { level: log.level, log: log.log, fn_index: shared.fn_index, endpoint: shared.endpoint_path.clone() },
				),
				Interpreted::UnexpectedError(message) => {
					finish_error(shared, message);
					conn.close().await;

					return;
				},
				Interpreted::QueueFull => {
					finish_error(shared, crate::error::QUEUE_FULL_MSG.to_owned());
					conn.close().await;

					return;
				},
				Interpreted::Update(_) | Interpreted::Heartbeat | Interpreted::CloseStream => {},
			},
			Ok(None) => return,
			Err(_) => {
				finish_broken(shared);

				return;
			},
		}
	}
}

async fn sse_legacy_run(
	shared: &Arc<Shared>,
	collaborators: &Collaborators,
	root: &str,
	payload: &[Value],
	event_data: Option<Value>,
	trigger_id: Option<String>,
) {
	let url = format!("{root}/queue/join?fn_index={}&session_hash={}", shared.fn_index, shared.session_hash);

	let mut stream = match collaborators.sse.open(&url).await {
		Ok(stream) => stream,
		Err(e) => {
			finish_error(shared, e.to_string());

			return;
		},
	};

	while let Some(result) = stream.next().await {
		let frame = match result {
			Ok(frame) => frame,
			Err(_) => {
				finish_broken(shared);

				return;
			},
		};

		match frame::interpret(&frame, None) {
			Interpreted::DataRequest { event_id } => {
				let mut body =
					submit_body(shared.fn_index, &shared.session_hash, payload, &event_data, &trigger_id);

				if let (Some(event_id), Some(map)) = (event_id, body.as_object_mut()) {
					map.insert("event_id".to_owned(), Value::String(event_id));
				}

				match collaborators.http.post_json("/queue/data", body).await {
					Ok(resp) if resp.is_success() => {},
					_ => {
						finish_broken(shared);

						return;
					},
				}
			},
			Interpreted::Generating(status, data) => {
				emit(shared, status_event(shared, status, None));

				if let Some(data) = data {
					if !data.is_null() {
						emit(shared, data_event(shared, data, event_data.clone(), trigger_id.clone()));
					}
				}
			},
			Interpreted::Complete(status) => {
				if let Some(data) = frame::frame_data(&frame) {
					if !data.is_null() {
						emit(shared, data_event(shared, data, event_data, trigger_id));
					}
				}

				finish(shared, status);

				return;
			},
			Interpreted::Log(log) => emit(
				shared,
				Event::Log { level: log.level, log: log.log, fn_index: shared.fn_index, endpoint: shared.endpoint_path.clone() },
			),
			Interpreted::UnexpectedError(message) => {
				finish_error(shared, message);

				return;
			},
			Interpreted::QueueFull => {
				finish_error(shared, crate::error::QUEUE_FULL_MSG.to_owned());

				return;
			},
			Interpreted::Update(_) | Interpreted::Heartbeat | Interpreted::HashRequest | Interpreted::CloseStream => {},
		}
	}
}

/// Parse the wire shape this crate expects for a diff descriptor: a JSON
/// array of `[path, op, value]` triples, `path` itself an array of string
/// keys / integer indices. Any entry that doesn't fit is dropped rather than
/// failing the whole submission — one malformed op should not take down an
/// otherwise-generating stream.
fn parse_diff_ops(value: &Value) -> Vec<DiffOp> {
	value.as_array().map(|entries| entries.iter().filter_map(parse_diff_op).collect()).unwrap_or_default()
}

fn parse_diff_op(entry: &Value) -> Option<DiffOp> {
	let entry = entry.as_array()?;
	let path = entry
		.first()?
		.as_array()?
		.iter()
		.map(path_segment)
		.collect::<Option<Vec<_>>>()?;
	let op = match entry.get(1)?.as_str()? {
		"replace" => crate::diff::DiffOpKind::Replace,
		"append" => crate::diff::DiffOpKind::Append,
		_ => crate::diff::DiffOpKind::Set,
	};
	let value = entry.get(2).cloned().unwrap_or(Value::Null);

	Some(DiffOp { path, op, value })
}

fn path_segment(value: &Value) -> Option<PathSegment> {
	if let Some(s) = value.as_str() {
		Some(PathSegment::Key(s.to_owned()))
	} else {
		value.as_u64().map(|i| PathSegment::Index(i as usize))
	}
}

/// Owns the per-submission diff store and the handful of fields a mux frame
/// callback needs, so the callback closure itself stays a thin dispatcher
/// (spec §4.5/§4.6 boundary).
struct MuxFrameHandler {
	shared: Arc<Shared>,
	mux: Arc<SseMux>,
	event_id: String,
	protocol: Protocol,
	diff_store: StdMutex<DiffStore>,
	event_data: Option<Value>,
	trigger_id: Option<String>,
}
impl MuxFrameHandler {
	fn fold(&self, raw: Value) -> Value {
		if !self.protocol.is_diff_streaming() {
			return raw;
		}

		let mut store = self.diff_store.lock().unwrap();

		if store.contains(&self.event_id) {
			store.apply(&self.event_id, DiffPayload::Patch(parse_diff_ops(&raw)))
		} else {
			store.apply(&self.event_id, DiffPayload::Full(raw))
		}
	}

	fn close_mux(&self) {
		let mux = Arc::clone(&self.mux);
		let event_id = self.event_id.clone();

		tokio::spawn(async move {
			mux.unregister(&event_id).await;
			mux.close_if_idle().await;
		});
	}

	/// Handle one frame already known to belong to this submission's
	/// `event_id`. Any unrecognized shape already comes back from
	/// `frame::interpret` as `UnexpectedError`, so there is no separate
	/// fallible path to guard here (spec §4.6 "error inside the callback").
	fn handle(&self, frame: RawFrame) {
		match frame::interpret(&frame, None) {
			Interpreted::Generating(status, data) => {
				emit(&self.shared, status_event(&self.shared, status, None));

				if let Some(raw) = data {
					if !raw.is_null() {
						let published = self.fold(raw);

						emit(&self.shared, data_event(&self.shared, published, self.event_data.clone(), self.trigger_id.clone()));
					}
				}
			},
			Interpreted::Complete(status) => {
				if let Some(raw) = frame::frame_data(&frame) {
					if !raw.is_null() {
						let published = self.fold(raw);

						emit(
							&self.shared,
							data_event(&self.shared, published, self.event_data.clone(), self.trigger_id.clone()),
						);
					}
				}

				finish(&self.shared, status);
				self.diff_store.lock().unwrap().discard(&self.event_id);
				self.close_mux();
			},
			Interpreted::Log(log) => emit(
				&self.shared,
				Event::Log {
					level: log.level,
					log: log.log,
					fn_index: self.shared.fn_index,
					endpoint: self.shared.endpoint_path.clone(),
				},
			),
			Interpreted::UnexpectedError(message) => {
				finish_error(&self.shared, message);

				if self.protocol.closes_mux_on_client_exception() {
					self.close_mux();
				}
			},
			Interpreted::QueueFull => {
				finish_error(&self.shared, crate::error::QUEUE_FULL_MSG.to_owned());
				self.close_mux();
			},
			// `close_stream` is a stream-level signal handled by `SseMux`
			// itself (it carries no `event_id` to key a per-submission
			// callback on), so it never reaches here; kept alongside the
			// other frames this callback has no per-submission reaction to.
			Interpreted::CloseStream
			| Interpreted::Update(_)
			| Interpreted::Heartbeat
			| Interpreted::HashRequest
			| Interpreted::DataRequest { .. } => {},
		}
	}
}

#[allow(clippy::too_many_arguments)]
async fn sse_mux_run(
	shared: &Arc<Shared>,
	collaborators: &Collaborators,
	mux: &Arc<SseMux>,
	root: &str,
	zerogpu: bool,
	space_id: Option<String>,
	protocol: Protocol,
	payload: &[Value],
	event_data: Option<Value>,
	trigger_id: Option<String>,
) {
	if let Err(e) = Arc::clone(mux).open(&shared.session_hash, root, Arc::clone(&collaborators.sse)).await {
		finish_error(shared, e.to_string());

		return;
	}

	let mut headers = HashMap::new();

	if zerogpu {
		if let Some(space_id) = &space_id {
			if let Ok(Some(h)) = collaborators.zerogpu.headers(space_id).await {
				headers = h;
			}
		}
	}

	let body = submit_body(shared.fn_index, &shared.session_hash, payload, &event_data, &trigger_id);
	let resp = match collaborators.http.post_json_with_headers("/queue/join", body, &headers).await {
		Ok(resp) => resp,
		Err(e) => {
			finish_error(shared, e.to_string());

			return;
		},
	};

	if resp.status == 503 {
		finish_error(shared, crate::error::QUEUE_FULL_MSG.to_owned());

		return;
	}

	if !resp.is_success() {
		finish_broken(shared);

		return;
	}

	#[derive(Deserialize)]
	struct JoinReply {
		event_id: Option<String>,
	}

	let Ok(reply) = resp.json::<JoinReply>() else {
		finish_broken(shared);

		return;
	};
	let Some(event_id) = reply.event_id else {
		finish_broken(shared);

		return;
	};

	*shared.event_id.lock().unwrap() = Some(event_id.clone());

	let handler = Arc::new(MuxFrameHandler {
		shared: Arc::clone(shared),
		mux: Arc::clone(mux),
		event_id: event_id.clone(),
		protocol,
		diff_store: StdMutex::new(DiffStore::new()),
		event_data,
		trigger_id,
	});
	let callback: FrameCallback = Arc::new(move |frame| handler.handle(frame));

	mux.register(&event_id, callback).await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::{ApiInfoEntry, Dependency},
		resolver::Resolved,
		transport::{FrameStream, HttpResponse},
		upload::UploadedFile,
	};
	use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

	fn resolved() -> Resolved {
		Resolved {
			fn_index: 0,
			api_info: ApiInfoEntry { fn_index: 0, parameters: vec![] },
			dependency: Dependency::default(),
			endpoint_path: "/predict".to_owned(),
		}
	}

	struct FakeUpload;
	#[async_trait::async_trait]
	impl Upload for FakeUpload {
		async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<UploadedFile> {
			Ok(UploadedFile { path: filename.clone(), orig_name: filename, size: bytes.len() as u64, mime_type: None, is_file: true })
		}
	}

	struct DirectHttp {
		data: Value,
	}
	#[async_trait::async_trait]
	impl HttpTransport for DirectHttp {
		async fn get(&self, _path: &str) -> Result<HttpResponse> {
			unimplemented!()
		}

		async fn post_json(&self, _path: &str, _body: Value) -> Result<HttpResponse> {
			Ok(HttpResponse { status: 200, body: serde_json::json!({ "data": self.data }).to_string() })
		}
	}

	struct DeadWs;
	#[async_trait::async_trait]
	impl WsTransport for DeadWs {
		async fn connect(&self, _url: &str) -> Result<Box<dyn crate::transport::WsConnection>> {
			Err(Error::any("no socket in this test"))
		}
	}

	struct CapturingWs {
		urls: Arc<StdMutex<Vec<String>>>,
	}
	#[async_trait::async_trait]
	impl WsTransport for CapturingWs {
		async fn connect(&self, url: &str) -> Result<Box<dyn crate::transport::WsConnection>> {
			self.urls.lock().unwrap().push(url.to_owned());

			Err(Error::any("no socket in this test"))
		}
	}

	struct FakeJwt;
	#[async_trait::async_trait]
	impl JwtSource for FakeJwt {
		async fn sign(&self, space_id: &str) -> Result<Option<String>> {
			Ok(Some(format!("jwt-for-{space_id}")))
		}
	}

	struct DeadSse;
	#[async_trait::async_trait]
	impl SseStreamFactory for DeadSse {
		async fn open(&self, _url: &str) -> Result<FrameStream> {
			Err(Error::any("no stream in this test"))
		}
	}

	#[test]
	fn skip_queue_always_selects_direct() {
		let dependency = Dependency { skip_queue: true, zerogpu: false };

		assert_eq!(select_transport(Protocol::SseV2, dependency), TransportKind::Direct);
	}

	#[test]
	fn protocol_selects_matching_transport() {
		let dependency = Dependency::default();

		assert_eq!(select_transport(Protocol::Ws, dependency), TransportKind::Ws);
		assert_eq!(select_transport(Protocol::Sse, dependency), TransportKind::SseLegacy);
		assert_eq!(select_transport(Protocol::SseV3, dependency), TransportKind::SseMux);
	}

	#[tokio::test]
	async fn direct_http_200_fires_data_then_complete() {
		let http: Arc<dyn HttpTransport> = Arc::new(DirectHttp { data: serde_json::json!(["hi"]) });
		let statuses = Arc::new(AtomicUsize::new(0));
		let datas = Arc::new(AtomicUsize::new(0));
		let statuses2 = Arc::clone(&statuses);
		let datas2 = Arc::clone(&datas);
		let handle = submit(SubmitParams {
			resolved: Resolved { dependency: Dependency { skip_queue: true, ..Default::default() }, ..resolved() },
			args: vec![],
			event_data: None,
			trigger_id: None,
			session_hash: Arc::from("hash"),
			root: "http://x".into(),
			version: Version::default(),
			space_id: None,
			protocol: Protocol::SseV2,
			collaborators: Collaborators {
				http,
				ws: Arc::new(DeadWs),
				sse: Arc::new(DeadSse),
				upload: Arc::new(FakeUpload),
				zerogpu: Arc::new(NoZerogpuHeaders),
				jwt: Arc::new(NoJwt),
			},
			mux: Arc::new(SseMux::new()),
		});

		handle.on(
			EventKind::Status,
			Arc::new(move |_| {
				statuses2.fetch_add(1, AtomicOrdering::SeqCst);
			}),
		);
		handle.on(
			EventKind::Data,
			Arc::new(move |_| {
				datas2.fetch_add(1, AtomicOrdering::SeqCst);
			}),
		);

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;

		assert_eq!(datas.load(AtomicOrdering::SeqCst), 1);
		assert!(statuses.load(AtomicOrdering::SeqCst) >= 1);
		assert!(handle.is_terminal());
	}

	#[tokio::test]
	async fn cancel_is_idempotent_and_stops_further_emission() {
		let http: Arc<dyn HttpTransport> = Arc::new(DirectHttp { data: Value::Null });
		let handle = submit(SubmitParams {
			resolved: Resolved { dependency: Dependency { skip_queue: true, ..Default::default() }, ..resolved() },
			args: vec![],
			event_data: None,
			trigger_id: None,
			session_hash: Arc::from("hash"),
			root: "http://x".into(),
			version: Version::default(),
			space_id: None,
			protocol: Protocol::SseV2,
			collaborators: Collaborators {
				http,
				ws: Arc::new(DeadWs),
				sse: Arc::new(DeadSse),
				upload: Arc::new(FakeUpload),
				zerogpu: Arc::new(NoZerogpuHeaders),
				jwt: Arc::new(NoJwt),
			},
			mux: Arc::new(SseMux::new()),
		});

		handle.cancel().await;
		handle.cancel().await;

		assert!(handle.is_terminal());
	}

	#[tokio::test]
	async fn ws_join_url_carries_sign_param_when_jwt_source_yields_one() {
		let urls = Arc::new(StdMutex::new(Vec::new()));
		let handle = submit(SubmitParams {
			resolved: resolved(),
			args: vec![],
			event_data: None,
			trigger_id: None,
			session_hash: Arc::from("hash"),
			root: "http://x".into(),
			version: Version::default(),
			space_id: Some("my-space".into()),
			protocol: Protocol::Ws,
			collaborators: Collaborators {
				http: Arc::new(DirectHttp { data: Value::Null }),
				ws: Arc::new(CapturingWs { urls: Arc::clone(&urls) }),
				sse: Arc::new(DeadSse),
				upload: Arc::new(FakeUpload),
				zerogpu: Arc::new(NoZerogpuHeaders),
				jwt: Arc::new(FakeJwt),
			},
			mux: Arc::new(SseMux::new()),
		});

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;

		let urls = urls.lock().unwrap();

		assert_eq!(urls.len(), 1);
		assert!(urls[0].contains("&__sign=jwt-for-my-space"));
		assert!(handle.is_terminal());
	}
}
