//! Example usage of the submission engine against a direct (`skip_queue`)
//! endpoint on a running server.
//!
//! Endpoint discovery is out of scope for this crate (spec §1), so this
//! demo hard-codes the `Config`/`ApiInfo` a real discovery collaborator
//! would otherwise fetch from `${root}/config` and `${root}/info`.

// std
use std::{collections::HashMap, env, error::Error, sync::Arc, time::Duration};
// crates.io
use tracing_subscriber::EnvFilter;
// self
use endpoint_client::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let root = env::var("ENDPOINT_CLIENT_ROOT").unwrap_or_else(|_| "http://127.0.0.1:7860".into());
	let mut named_endpoints = HashMap::new();

	named_endpoints.insert("predict".to_owned(), ApiInfoEntry {
		fn_index: 0,
		parameters: vec![ComponentSchema { r#type: Some("number".into()) }],
	});

	let api = ApiInfo { named_endpoints, unnamed_endpoints: HashMap::new() };
	let config = Config {
		root,
		path: "".into(),
		protocol: Protocol::SseV3,
		version: Version::parse("4.0.0"),
		dependencies: vec![Dependency { skip_queue: true, zerogpu: false }],
		space_id: None,
		auth_required: false,
	};
	let http: Arc<dyn HttpTransport> = Arc::new(ReqwestHttp::new(&config.root, None));
	let collaborators = Collaborators {
		http: Arc::clone(&http),
		ws: Arc::new(TungsteniteWs),
		sse: Arc::new(ReqwestSse::new(None)),
		upload: Arc::new(HttpUpload::new(&config.root, None)),
		zerogpu: Arc::new(NoZerogpuHeaders),
		jwt: Arc::new(NoJwt),
	};
	let session = Session::from_parts(config, api, "demo-session", collaborators);
	let handle = session.submit("/predict", vec![serde_json::json!(2)], None, None)?;

	handle.on(EventKind::Status, Arc::new(|event| println!("status: {event:?}")));
	handle.on(EventKind::Data, Arc::new(|event| println!("data: {event:?}")));

	tokio::time::sleep(Duration::from_secs(2)).await;

	Ok(())
}
