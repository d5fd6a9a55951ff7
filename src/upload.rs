//! The narrow binary-upload collaborator used by the payload preparer (C2).
//!
//! File-upload HTTP details are out of scope for the submission engine
//! (spec §1); this module defines the trait C2 consumes and a default
//! `reqwest`-backed implementation, grounded on the teacher's
//! `Multipart`/`build_stream_part` machinery (`src/http.rs`).

// crates.io
use reqwew::{
	Http,
	reqwest::{
		Client as ReqwestClient,
		multipart::{Form, Part},
	},
};
// self
use crate::_prelude::*;

/// A server-assigned reference to an uploaded file, substituted into the
/// wire payload in place of the raw bytes (spec §4.2).
#[derive(Clone, Debug, Serialize)]
pub struct UploadedFile {
	pub path: String,
	pub orig_name: String,
	pub size: u64,
	pub mime_type: Option<String>,
	pub is_file: bool,
}

/// Upload collaborator consumed by C2. `async_trait`-boxed (rather than
/// `impl Future`) so the submission engine can hold one behind `Arc<dyn
/// Upload>` alongside its other transport collaborators.
#[async_trait::async_trait]
pub trait Upload
where
	Self: Send + Sync,
{
	async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<UploadedFile>;
}

/// Default `reqwest`-backed uploader: one multipart POST to
/// `${root}/upload`.
#[derive(Clone, Debug)]
pub struct HttpUpload {
	http: ReqwestClient,
	root: String,
	token: Option<String>,
}
impl HttpUpload {
	pub fn new(root: impl Into<String>, token: Option<String>) -> Self {
		Self {
			http: ReqwestClient::builder().user_agent("endpoint-client").build().expect("build must succeed; qed"),
			root: root.into(),
			token,
		}
	}
}
#[async_trait::async_trait]
impl Upload for HttpUpload {
	async fn upload(&self, bytes: Vec<u8>, filename: String) -> Result<UploadedFile> {
		let len = bytes.len() as u64;
		let part = Part::bytes(bytes).file_name(filename.clone());
		let form = Form::new().part("files", part);
		let mut req = self.http.post(format!("{}/upload", self.root)).multipart(form);

		if let Some(token) = &self.token {
			req = req.bearer_auth(token);
		}

		let resp = <ReqwestClient as Http>::request(&self.http, req.build()?).await?;
		let paths: Vec<String> = resp.json().await?;
		let path = paths.into_iter().next().ok_or_else(|| Error::any("no path returned by upload"))?;

		Ok(UploadedFile { path, orig_name: filename, size: len, mime_type: None, is_file: true })
	}
}
