//! The external-facing collaborator traits C6 drives, plus `reqwest`/
//! `tokio-tungstenite`-backed defaults (spec §6). Kept trait-bounded rather
//! than concrete so tests can substitute in-memory fakes — the teacher's
//! `ApiBase`/`EventHandler` split (`src/http.rs`) generalized from one
//! typed SSE client to three narrower, swappable transports.

// std
use std::pin::Pin;
// crates.io
use futures::{Stream, StreamExt, TryStreamExt};
use reqwew::{
	Http,
	reqwest::{Client as ReqwestClient, Method},
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::{
	bytes::Bytes,
	codec::{FramedRead, LinesCodec},
	io::StreamReader,
};
// self
use crate::_prelude::*;

/// One HTTP response: status code plus the raw body text, so callers can
/// distinguish 503 (queue full) from other non-200s (spec §4.6, §7).
#[derive(Clone, Debug)]
pub struct HttpResponse {
	pub status: u16,
	pub body: String,
}
impl HttpResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(serde_json::from_str(&self.body)?)
	}
}

/// Plain request/response HTTP, used for `/run`, `/queue/join` (POST),
/// `/reset`, and `/heartbeat`.
#[async_trait::async_trait]
pub trait HttpTransport
where
	Self: Send + Sync,
{
	async fn get(&self, path: &str) -> Result<HttpResponse>;

	async fn post_json(&self, path: &str, body: Value) -> Result<HttpResponse>;

	/// Same as [`Self::post_json`], plus extra headers. Only `/queue/join`
	/// needs this, to carry the zerogpu collaborator's one-shot token
	/// (spec §4.6); every other caller gets the default no-op override.
	async fn post_json_with_headers(
		&self,
		path: &str,
		body: Value,
		headers: &HashMap<String, String>,
	) -> Result<HttpResponse> {
		let _ = headers;

		self.post_json(path, body).await
	}
}

/// A live server frame stream, whether the session-wide multiplex stream
/// (`/queue/data`) or a dedicated legacy-SSE stream (`/queue/join`).
pub type FrameStream = Pin<Box<dyn Send + Stream<Item = Result<RawFrame>>>>;

#[async_trait::async_trait]
pub trait SseStreamFactory
where
	Self: Send + Sync,
{
	async fn open(&self, url: &str) -> Result<FrameStream>;
}

/// A connected WebSocket, abstracted so the engine can drive either a real
/// `tokio-tungstenite` socket or a fake in tests.
#[async_trait::async_trait]
pub trait WsConnection
where
	Self: Send,
{
	async fn send(&mut self, value: Value) -> Result<()>;

	/// Next inbound message. `Ok(None)` means the peer closed cleanly;
	/// `Err` means it closed uncleanly (spec §4.6 WS `!wasClean`).
	async fn recv(&mut self) -> Result<Option<RawFrame>>;

	async fn close(&mut self);
}

#[async_trait::async_trait]
pub trait WsTransport
where
	Self: Send + Sync,
{
	async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>>;
}

/// `reqwest`-backed [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct ReqwestHttp {
	http: ReqwestClient,
	root: String,
	token: Option<String>,
}
impl ReqwestHttp {
	pub fn new(root: impl Into<String>, token: Option<String>) -> Self {
		Self {
			http: ReqwestClient::builder()
				.user_agent("endpoint-client")
				.build()
				.expect("build must succeed; qed"),
			root: root.into(),
			token,
		}
	}

	fn request(&self, method: Method, path: &str) -> reqwew::reqwest::RequestBuilder {
		let mut req = self.http.request(method, format!("{}{path}", self.root));

		if let Some(token) = &self.token {
			req = req.bearer_auth(token);
		}

		req
	}
}
#[async_trait::async_trait]
impl HttpTransport for ReqwestHttp {
	async fn get(&self, path: &str) -> Result<HttpResponse> {
		let resp = <ReqwestClient as Http>::request(&self.http, self.request(Method::GET, path).build()?).await?;
		let status = resp.status().as_u16();
		let body = resp.text().await?;

		Ok(HttpResponse { status, body })
	}

	async fn post_json(&self, path: &str, body: Value) -> Result<HttpResponse> {
		let req = self.request(Method::POST, path).json(&body).build()?;
		let resp = <ReqwestClient as Http>::request(&self.http, req).await?;
		let status = resp.status().as_u16();
		let body = resp.text().await?;

		Ok(HttpResponse { status, body })
	}

	async fn post_json_with_headers(
		&self,
		path: &str,
		body: Value,
		headers: &HashMap<String, String>,
	) -> Result<HttpResponse> {
		let mut builder = self.request(Method::POST, path).json(&body);

		for (key, value) in headers {
			builder = builder.header(key.as_str(), value.as_str());
		}

		let resp = <ReqwestClient as Http>::request(&self.http, builder.build()?).await?;
		let status = resp.status().as_u16();
		let body = resp.text().await?;

		Ok(HttpResponse { status, body })
	}
}

/// `reqwest`-backed [`SseStreamFactory`]: opens a GET request and decodes
/// the byte stream line-by-line into [`RawFrame`]s, generalizing the
/// teacher's `Sse<T>` (`src/http.rs`) from a typed `EventHandler` down to
/// this crate's one concrete frame type.
#[derive(Clone, Debug)]
pub struct ReqwestSse {
	http: ReqwestClient,
	token: Option<String>,
}
impl ReqwestSse {
	pub fn new(token: Option<String>) -> Self {
		Self {
			http: ReqwestClient::builder()
				.user_agent("endpoint-client")
				.build()
				.expect("build must succeed; qed"),
			token,
		}
	}
}
#[async_trait::async_trait]
impl SseStreamFactory for ReqwestSse {
	async fn open(&self, url: &str) -> Result<FrameStream> {
		let mut req = self.http.get(url).header("Accept", "text/event-stream");

		if let Some(token) = &self.token {
			req = req.bearer_auth(token);
		}

		let resp = <ReqwestClient as Http>::request(&self.http, req.build()?).await?;
		let bytes = resp.bytes_stream().map_err(std::io::Error::other);
		let reader = StreamReader::new(Box::pin(bytes) as Pin<Box<dyn Send + Stream<Item = std::io::Result<Bytes>>>>);
		let lines = FramedRead::new(reader, LinesCodec::new());

		Ok(Box::pin(sse_frames(lines)))
	}
}

/// Turn a line-oriented byte stream already in SSE framing into a stream of
/// decoded [`RawFrame`]s: accumulate `data:` lines until a blank line, then
/// parse the accumulated JSON. `event:`/`id:`/`retry:`/comment lines carry
/// no information this protocol needs beyond `data:`, same as the teacher's
/// `Sse<T>` ignoring `retry:`.
fn sse_frames(
	lines: FramedRead<StreamReader<Pin<Box<dyn Send + Stream<Item = std::io::Result<Bytes>>>>, Bytes>, LinesCodec>,
) -> impl Stream<Item = Result<RawFrame>> {
	futures::stream::unfold((lines, String::new()), |(mut lines, mut data)| async move {
		loop {
			match lines.next().await {
				Some(Ok(line)) => {
					let line = line.trim().to_owned();

					if line.is_empty() {
						if data.is_empty() {
							continue;
						}

						let frame = serde_json::from_str::<RawFrame>(&data).map_err(Error::from);

						data.clear();

						return Some((frame, (lines, data)));
					} else if let Some(chunk) = line.strip_prefix("data:") {
						if !data.is_empty() {
							data.push('\n');
						}

						data.push_str(chunk.trim_start());
					}
				},
				Some(Err(e)) => return Some((Err(e.into()), (lines, data))),
				None => return None,
			}
		}
	})
}

/// `tokio-tungstenite`-backed [`WsTransport`], grounded on the single-socket
/// bridge pattern seen in the pack's WS client code (`futures_util::{Sink,
/// Stream}` over one `WebSocketStream`).
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteWs;
#[async_trait::async_trait]
impl WsTransport for TungsteniteWs {
	async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>> {
		let (stream, _response) = connect_async(url).await?;

		Ok(Box::new(TungsteniteConnection { stream }))
	}
}

struct TungsteniteConnection {
	stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}
#[async_trait::async_trait]
impl WsConnection for TungsteniteConnection {
	async fn send(&mut self, value: Value) -> Result<()> {
		use futures::SinkExt;

		let text = serde_json::to_string(&value)?;

		self.stream.send(WsMessage::Text(text)).await?;

		Ok(())
	}

	async fn recv(&mut self) -> Result<Option<RawFrame>> {
		loop {
			match self.stream.next().await {
				Some(Ok(WsMessage::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),
				Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
				Some(Ok(_)) => continue,
				Some(Err(e)) => return Err(e.into()),
			}
		}
	}

	async fn close(&mut self) {
		use futures::SinkExt;

		let _ = self.stream.close(None).await;
	}
}
