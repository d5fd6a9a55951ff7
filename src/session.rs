//! Process-wide session identity, configuration, API map, and the registry
//! of multiplex state every submission shares (C7, spec §4.7).
//!
//! Endpoint discovery / config fetch and the auth-token exchange are
//! out-of-scope collaborators (spec §1); this module defines the
//! [`DiscoveryClient`] trait `Session::create` consumes and otherwise owns
//! nothing but what the submission engine needs.

// std
use std::{
	sync::Mutex as StdMutex,
	time::Duration,
};
// crates.io
use rand::{Rng, distributions::Alphanumeric};
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	mux::SseMux,
	resolver::{self, Endpoint},
	submission::{self, Collaborators, NoJwt, NoZerogpuHeaders, SubmissionHandle, SubmitParams},
	transport::{HttpTransport, ReqwestHttp, ReqwestSse, TungsteniteWs},
	upload::HttpUpload,
};

/// The out-of-scope endpoint-discovery collaborator: resolve an app
/// reference (a Space id or a base URL) to its [`Config`] and [`ApiInfo`]
/// (spec §1 "endpoint discovery / configuration fetch ... treated as
/// external collaborators").
#[async_trait::async_trait]
pub trait DiscoveryClient
where
	Self: Send + Sync,
{
	async fn resolve(&self, app_reference: &str) -> Result<(Config, ApiInfo)>;
}

/// Knobs [`Session::create`] accepts beyond the app reference.
#[derive(Clone, Debug)]
pub struct SessionOptions {
	/// Bearer token forwarded on every HTTP/WS/SSE request, when the
	/// out-of-scope auth exchange has already produced one.
	pub token: Option<String>,
	/// Interval between `GET /heartbeat/{session_hash}` pings (ambient;
	/// spec §4.7 leaves the cadence to the implementation).
	pub heartbeat_interval: Duration,
}
impl Default for SessionOptions {
	fn default() -> Self {
		Self { token: None, heartbeat_interval: Duration::from_secs(30) }
	}
}

/// Sample an opaque 11-character alphanumeric session token. The teacher
/// crate never needed randomness; grounded on the broader pack's `rand`
/// usage (DESIGN.md).
fn generate_session_hash() -> Arc<str> {
	let token: String =
		rand::thread_rng().sample_iter(&Alphanumeric).take(11).map(char::from).collect();

	Arc::from(token)
}

/// Process-wide session state (C7, spec §3/§4.7): configuration, the
/// derived endpoint map, the opaque session hash, per-fn_index last-known
/// stage, and the shared [`SseMux`] every `sse_v1+` submission multiplexes
/// over.
pub struct Session {
	pub config: Config,
	pub api: ApiInfo,
	pub api_map: ApiMap,
	pub session_hash: Arc<str>,
	last_status: Arc<StdMutex<HashMap<usize, Stage>>>,
	mux: Arc<SseMux>,
	collaborators: Collaborators,
	heartbeat: AsyncMutex<Option<JoinHandle<()>>>,
}
impl Session {
	/// Resolve `app_reference` through `discovery`, derive the API map,
	/// mint a session hash, build the default `reqwest`/`tokio-tungstenite`
	/// transport collaborators, and start the heartbeat loop (spec §4.7).
	pub async fn create(
		app_reference: &str,
		options: SessionOptions,
		discovery: &dyn DiscoveryClient,
	) -> Result<Self> {
		let (config, api) = discovery.resolve(app_reference).await?;
		let api_map = build_api_map(&api);
		let session_hash = generate_session_hash();
		let http: Arc<dyn HttpTransport> = Arc::new(ReqwestHttp::new(&config.root, options.token.clone()));
		let collaborators = Collaborators {
			http: Arc::clone(&http),
			ws: Arc::new(TungsteniteWs),
			sse: Arc::new(ReqwestSse::new(options.token.clone())),
			upload: Arc::new(HttpUpload::new(&config.root, options.token.clone())),
			zerogpu: Arc::new(NoZerogpuHeaders),
			jwt: Arc::new(NoJwt),
		};
		let heartbeat =
			spawn_heartbeat(Arc::clone(&http), Arc::clone(&session_hash), options.heartbeat_interval);

		Ok(Self {
			config,
			api,
			api_map,
			session_hash,
			last_status: Arc::new(StdMutex::new(HashMap::new())),
			mux: Arc::new(SseMux::new()),
			collaborators,
			heartbeat: AsyncMutex::new(Some(heartbeat)),
		})
	}

	/// Build a session directly from already-resolved parts, bypassing
	/// [`DiscoveryClient`] and the default transport collaborators. Used by
	/// tests and by embedders that already have a live config (e.g. the
	/// out-of-scope space warm-up flow).
	pub fn from_parts(
		config: Config,
		api: ApiInfo,
		session_hash: impl Into<Arc<str>>,
		collaborators: Collaborators,
	) -> Self {
		let api_map = build_api_map(&api);

		Self {
			config,
			api,
			api_map,
			session_hash: session_hash.into(),
			last_status: Arc::new(StdMutex::new(HashMap::new())),
			mux: Arc::new(SseMux::new()),
			collaborators,
			heartbeat: AsyncMutex::new(None),
		}
	}

	/// The last status observed for `fn_index`, if any submission against
	/// it has fired one (spec §3 `lastStatus`).
	pub fn last_status(&self, fn_index: usize) -> Option<Stage> {
		self.last_status.lock().unwrap().get(&fn_index).copied()
	}

	/// Resolve `endpoint`, prepare its transport collaborators, and spawn
	/// the submission (C1 + C6, spec §4.6). Synchronous resolution failures
	/// (`UnknownEndpoint`) surface immediately; everything past that point
	/// is reported through the returned handle's events.
	pub fn submit(
		&self,
		endpoint: impl Into<Endpoint>,
		args: Vec<Value>,
		event_data: Option<Value>,
		trigger_id: Option<String>,
	) -> Result<SubmissionHandle> {
		let endpoint = endpoint.into();
		let resolved = resolver::resolve(&endpoint, &self.api, &self.api_map, &self.config)?;
		let fn_index = resolved.fn_index;
		let params = SubmitParams {
			resolved,
			args,
			event_data,
			trigger_id,
			session_hash: Arc::clone(&self.session_hash),
			root: self.config.root.clone(),
			version: self.config.version,
			space_id: self.config.space_id.clone(),
			protocol: self.config.protocol,
			collaborators: self.collaborators.clone(),
			mux: Arc::clone(&self.mux),
		};
		let handle = submission::submit(params);

		track_last_status(&handle, Arc::clone(&self.last_status), fn_index);

		Ok(handle)
	}

	/// Convenience wrapper: submit and collect the last `data` payload
	/// emitted before the terminal `status`, following the teacher's
	/// `reasoning_stream_with_prompt` pattern of buffering a raw event
	/// stream into one awaited `Future` (spec §4.7).
	pub async fn predict(&self, endpoint: impl Into<Endpoint>, args: Vec<Value>) -> Result<Vec<Value>> {
		let handle = self.submit(endpoint, args, None, None)?;
		let (tx, rx) = tokio::sync::oneshot::channel();
		let tx = Arc::new(StdMutex::new(Some(tx)));
		let last_data = Arc::new(StdMutex::new(None::<Value>));
		let data_sink = Arc::clone(&last_data);

		handle.on(
			EventKind::Data,
			Arc::new(move |event| {
				if let Event::Data { data, .. } = event {
					*data_sink.lock().unwrap() = Some(data.clone());
				}
			}),
		);

		let tx_terminal = Arc::clone(&tx);
		let data_terminal = Arc::clone(&last_data);

		handle.on(
			EventKind::Status,
			Arc::new(move |event| {
				if event.is_terminal_status() {
					if let Some(tx) = tx_terminal.lock().unwrap().take() {
						let _ = tx.send((event.clone(), data_terminal.lock().unwrap().clone()));
					}
				}
			}),
		);

		let (status, data) =
			rx.await.map_err(|_| Error::any("submission ended without a terminal status"))?;

		match status {
			Event::Status { stage: Stage::Error, message, .. } =>
				Err(Error::ServerError(message.unwrap_or_else(|| "predict failed".to_owned()))),
			_ => match data {
				Some(Value::Array(values)) => Ok(values),
				Some(other) => Ok(vec![other]),
				None => Ok(vec![]),
			},
		}
	}

	/// Pass-through POST to `${root}/component_server/{component_id}/{fn_name}`
	/// (spec §4.7). Explicitly not part of the hard core: no queue, no
	/// events, just the collaborator's HTTP transport.
	pub async fn component_server(
		&self,
		component_id: &str,
		fn_name: &str,
		args: Vec<Value>,
	) -> Result<Value> {
		let path = format!("/component_server/{component_id}/{fn_name}");
		let body = serde_json::json!({ "data": args, "session_hash": &*self.session_hash });
		let resp = self.collaborators.http.post_json(&path, body).await?;

		if !resp.is_success() {
			return Err(Error::ServerError(resp.body));
		}

		resp.json()
	}
}
impl Drop for Session {
	fn drop(&mut self) {
		if let Ok(mut guard) = self.heartbeat.try_lock() {
			if let Some(handle) = guard.take() {
				handle.abort();
			}
		}
	}
}

/// Register a status listener that keeps `last_status[fn_index]` current.
/// Kept as a free function (rather than an inline closure at the call
/// site) so its one job — mirror the wire stage into session state — reads
/// as a single unit.
fn track_last_status(
	handle: &SubmissionHandle,
	last_status: Arc<StdMutex<HashMap<usize, Stage>>>,
	fn_index: usize,
) {
	handle.on(
		EventKind::Status,
		Arc::new(move |event| {
			if let Event::Status { stage, .. } = event {
				last_status.lock().unwrap().insert(fn_index, *stage);
			}
		}),
	);
}

fn spawn_heartbeat(http: Arc<dyn HttpTransport>, session_hash: Arc<str>, interval: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);

		ticker.tick().await;

		loop {
			ticker.tick().await;

			match http.get(&format!("/heartbeat/{session_hash}")).await {
				Ok(_) => tracing::debug!("heartbeat ok"),
				Err(e) => tracing::warn!("heartbeat failed: {e}"),
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		transport::{FrameStream, HttpResponse, WsConnection},
		upload::{Upload, UploadedFile},
	};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct FakeDiscovery;
	#[async_trait::async_trait]
	impl DiscoveryClient for FakeDiscovery {
		async fn resolve(&self, _app_reference: &str) -> Result<(Config, ApiInfo)> {
			let mut named_endpoints = HashMap::new();

			named_endpoints.insert("predict".to_owned(), ApiInfoEntry {
				fn_index: 0,
				parameters: vec![],
			});

			let api = ApiInfo { named_endpoints, unnamed_endpoints: HashMap::new() };
			let config = Config {
				root: "http://localhost:7860".into(),
				path: "".into(),
				protocol: Protocol::SseV2,
				version: Version::default(),
				dependencies: vec![Dependency { skip_queue: true, zerogpu: false }],
				space_id: None,
				auth_required: false,
			};

			Ok((config, api))
		}
	}

	struct DirectHttp {
		data: Value,
		hits: AtomicUsize,
	}
	#[async_trait::async_trait]
	impl HttpTransport for DirectHttp {
		async fn get(&self, _path: &str) -> Result<HttpResponse> {
			self.hits.fetch_add(1, Ordering::SeqCst);

			Ok(HttpResponse { status: 200, body: "{}".to_owned() })
		}

		async fn post_json(&self, _path: &str, _body: Value) -> Result<HttpResponse> {
			Ok(HttpResponse { status: 200, body: serde_json::json!({ "data": self.data }).to_string() })
		}
	}

	struct DeadWs;
	#[async_trait::async_trait]
	impl crate::transport::WsTransport for DeadWs {
		async fn connect(&self, _url: &str) -> Result<Box<dyn WsConnection>> {
			Err(Error::any("no socket in this test"))
		}
	}

	struct DeadSse;
	#[async_trait::async_trait]
	impl crate::transport::SseStreamFactory for DeadSse {
		async fn open(&self, _url: &str) -> Result<FrameStream> {
			Err(Error::any("no stream in this test"))
		}
	}

	struct FakeUpload;
	#[async_trait::async_trait]
	impl Upload for FakeUpload {
		async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<UploadedFile> {
			Ok(UploadedFile { path: filename.clone(), orig_name: filename, size: bytes.len() as u64, mime_type: None, is_file: true })
		}
	}

	fn collaborators(data: Value) -> Collaborators {
		Collaborators {
			http: Arc::new(DirectHttp { data, hits: AtomicUsize::new(0) }),
			ws: Arc::new(DeadWs),
			sse: Arc::new(DeadSse),
			upload: Arc::new(FakeUpload),
			zerogpu: Arc::new(NoZerogpuHeaders),
			jwt: Arc::new(NoJwt),
		}
	}

	async fn fake_session(data: Value) -> Session {
		let (config, api) = FakeDiscovery.resolve("fake").await.unwrap();

		Session::from_parts(config, api, "hash", collaborators(data))
	}

	#[tokio::test]
	async fn create_resolves_config_and_api_via_discovery() {
		let session = Session::create("fake", SessionOptions::default(), &FakeDiscovery).await.unwrap();

		assert_eq!(session.config.root, "http://localhost:7860");
		assert_eq!(session.api_map.get("predict"), Some(&0));
		assert_eq!(session.session_hash.len(), 11);
	}

	#[tokio::test]
	async fn submit_resolves_endpoint_and_tracks_last_status() {
		let session = fake_session(serde_json::json!(["hi"])).await;
		let handle = session.submit("/predict", vec![], None, None).unwrap();

		tokio::time::sleep(Duration::from_millis(50)).await;

		assert!(handle.is_terminal());
		assert_eq!(session.last_status(0), Some(Stage::Complete));
	}

	#[tokio::test]
	async fn submit_unknown_endpoint_fails_synchronously() {
		let session = fake_session(Value::Null).await;
		let err = session.submit("/nope", vec![], None, None).unwrap_err();

		assert!(matches!(err, Error::UnknownEndpoint(_)));
	}

	#[tokio::test]
	async fn predict_collects_last_data_before_terminal_status() {
		let session = fake_session(serde_json::json!(["hi", 2])).await;
		let data = session.predict("/predict", vec![]).await.unwrap();

		assert_eq!(data, vec![serde_json::json!("hi"), serde_json::json!(2)]);
	}

	#[tokio::test]
	async fn component_server_passes_through() {
		let session = fake_session(Value::Null).await;
		let result = session.component_server("comp1", "load", vec![]).await.unwrap();

		assert_eq!(result, serde_json::json!({ "data": null }));
	}
}
