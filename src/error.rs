#![allow(missing_docs)]

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Message used for every `BrokenConnection` status (spec §7).
pub const BROKEN_CONNECTION_MSG: &str = "Connection errored out.";
/// Message used for every `QueueFull` status (spec §7).
pub const QUEUE_FULL_MSG: &str = "Queue is full.";
/// Message fired from a callback that failed to interpret a frame (spec §4.6).
pub const UNEXPECTED_ERROR_MSG: &str = "An Unexpected Error Occurred!";

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unknown endpoint: {0}")]
	UnknownEndpoint(String),

	#[error("session has no discovered api")]
	NoApi,

	#[error("{BROKEN_CONNECTION_MSG}")]
	BrokenConnection,

	#[error("{QUEUE_FULL_MSG}")]
	QueueFull,

	#[error("{0}")]
	ServerError(String),

	#[error("{UNEXPECTED_ERROR_MSG}")]
	ClientException,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Codec(#[from] tokio_util::codec::LinesCodecError),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),

	#[error(transparent)]
	Ws(#[from] tokio_tungstenite::tungstenite::Error),

	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),

	#[error("{0}")]
	Any(String),
}
impl Error {
	pub fn any<T>(any: T) -> Self
	where
		T: Into<String>,
	{
		Self::Any(any.into())
	}
}
