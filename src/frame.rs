//! The server's wire frames and the pure message interpreter (C3, spec §4.3).

// self
use crate::_prelude::*;

/// One frame as received from the server, in the superset shape of spec §6.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawFrame {
	pub msg: String,
	#[serde(default)]
	pub code: Option<u16>,
	#[serde(default)]
	pub queue_size: Option<u32>,
	#[serde(default)]
	pub rank: Option<u32>,
	#[serde(default)]
	pub success: Option<bool>,
	#[serde(default)]
	pub event_id: Option<String>,
	#[serde(default)]
	pub output: Option<Output>,
	#[serde(default)]
	pub log: Option<String>,
	#[serde(default)]
	pub level: Option<String>,
	#[serde(default)]
	pub progress_data: Option<Vec<Progress>>,
}
impl RawFrame {
	/// Build a minimal frame carrying only `msg`, for tests.
	pub fn msg(msg: impl Into<String>) -> Self {
		Self { msg: msg.into(), ..Default::default() }
	}

	pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
		self.event_id = Some(event_id.into());
		self
	}

	pub fn with_output(mut self, output: Output) -> Self {
		self.output = Some(output);
		self
	}
}

/// The `output` object carried by `process_generating`/`process_completed`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Output {
	#[serde(default)]
	pub data: Value,
	#[serde(default)]
	pub error: Option<String>,
	#[serde(default)]
	pub average_duration: Option<f64>,
}

/// A status fired alongside a non-terminal or terminal frame.
#[derive(Clone, Debug)]
pub struct StatusUpdate {
	pub stage: Stage,
	pub queue: bool,
	pub eta: Option<f64>,
	pub message: Option<String>,
	pub progress: Option<Progress>,
}

/// A `log` frame.
#[derive(Clone, Debug)]
pub struct LogFrame {
	pub level: String,
	pub log: String,
}

/// The pure classification of one [`RawFrame`] (spec §4.3). Carries no
/// reference to session state; the caller stores `last_status` itself.
#[derive(Clone, Debug)]
pub enum Interpreted {
	/// Queue/position change (`process_starts`, `estimation`). Does not by
	/// itself warrant a user-facing status re-emission unless the caller
	/// decides the carried `eta`/`queue` differs meaningfully — see
	/// [`crate::submission`] for the policy (process_starts is silent,
	/// estimation is surfaced, per DESIGN.md's resolution of scenario S2).
	Update(StatusUpdate),
	/// WS only: server wants `{fn_index, session_hash}`.
	HashRequest,
	/// WS/legacy-SSE: server wants the client to send its payload, possibly
	/// already carrying the `event_id` the submission will be keyed under.
	DataRequest { event_id: Option<String> },
	/// Terminal status, stashed by the engine until any accompanying data
	/// has been emitted (spec §4.6 Streaming state).
	Complete(StatusUpdate),
	Log(LogFrame),
	/// Intermediate status with optional inline data.
	Generating(StatusUpdate, Option<Value>),
	Heartbeat,
	UnexpectedError(String),
	/// `sse_v3`: server has finished all in-flight events on this stream.
	CloseStream,
	QueueFull,
}

/// Classify one server frame (C3). Pure: no shared state is read or
/// mutated. `previous_stage` is accepted for parity with the spec's
/// signature but is informational only — every branch below determines its
/// own stage from the frame's own fields.
pub fn interpret(frame: &RawFrame, _previous_stage: Option<Stage>) -> Interpreted {
	match frame.msg.as_str() {
		"send_hash" => Interpreted::HashRequest,
		"send_data" => Interpreted::DataRequest { event_id: frame.event_id.clone() },
		"queue_full" => Interpreted::QueueFull,
		"estimation" =>
			Interpreted::Update(StatusUpdate {
				stage: Stage::Pending,
				queue: true,
				eta: frame.rank.map(|r| r as f64).or(frame.queue_size.map(|q| q as f64)),
				message: None,
				progress: None,
			}),
		"process_starts" =>
			Interpreted::Update(StatusUpdate {
				stage: Stage::Pending,
				queue: true,
				eta: None,
				message: None,
				progress: None,
			}),
		"progress" =>
			Interpreted::Generating(
				StatusUpdate {
					stage: Stage::Generating,
					queue: true,
					eta: None,
					message: None,
					progress: frame.progress_data.as_ref().and_then(|p| p.first().cloned()),
				},
				None,
			),
		"process_generating" => {
			let output = frame.output.as_ref();

			Interpreted::Generating(
				StatusUpdate {
					stage: Stage::Generating,
					queue: true,
					eta: output.and_then(|o| o.average_duration),
					message: None,
					progress: None,
				},
				output.map(|o| o.data.clone()),
			)
		},
		"process_completed" => {
			let output = frame.output.as_ref();

			if let Some(err) = output.and_then(|o| o.error.clone()) {
				Interpreted::Complete(StatusUpdate {
					stage: Stage::Error,
					queue: false,
					eta: None,
					message: Some(err),
					progress: None,
				})
			} else {
				Interpreted::Complete(StatusUpdate {
					stage: Stage::Complete,
					queue: false,
					eta: output.and_then(|o| o.average_duration),
					message: None,
					progress: None,
				})
			}
		},
		"log" => Interpreted::Log(LogFrame {
			level: frame.level.clone().unwrap_or_else(|| "info".to_owned()),
			log: frame.log.clone().unwrap_or_default(),
		}),
		"heartbeat" => Interpreted::Heartbeat,
		"close_stream" => Interpreted::CloseStream,
		"unexpected_error" => Interpreted::UnexpectedError(
			frame
				.output
				.as_ref()
				.and_then(|o| o.error.clone())
				.unwrap_or_else(|| crate::error::UNEXPECTED_ERROR_MSG.to_owned()),
		),
		other => Interpreted::UnexpectedError(format!("unrecognized frame: {other}")),
	}
}

/// The inline data carried by a `process_completed`/`process_generating`
/// frame's `output`, if any.
pub fn frame_data(frame: &RawFrame) -> Option<Value> {
	frame.output.as_ref().map(|o| o.data.clone())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn send_hash_classifies_as_hash_request() {
		assert!(matches!(interpret(&RawFrame::msg("send_hash"), None), Interpreted::HashRequest));
	}

	#[test]
	fn send_data_carries_event_id() {
		let frame = RawFrame::msg("send_data").with_event_id("E1");

		match interpret(&frame, None) {
			Interpreted::DataRequest { event_id } => assert_eq!(event_id.as_deref(), Some("E1")),
			other => panic!("unexpected: {other:?}"),
		}
	}

	#[test]
	fn process_completed_with_error_is_error_stage() {
		let frame = RawFrame::msg("process_completed")
			.with_output(Output { error: Some("boom".into()), ..Default::default() });

		match interpret(&frame, None) {
			Interpreted::Complete(status) => {
				assert_eq!(status.stage, Stage::Error);
				assert_eq!(status.message.as_deref(), Some("boom"));
			},
			other => panic!("unexpected: {other:?}"),
		}
	}

	#[test]
	fn process_completed_without_error_is_complete_stage() {
		let frame = RawFrame::msg("process_completed")
			.with_output(Output { average_duration: Some(0.1), ..Default::default() });

		match interpret(&frame, None) {
			Interpreted::Complete(status) => {
				assert_eq!(status.stage, Stage::Complete);
				assert_eq!(status.eta, Some(0.1));
			},
			other => panic!("unexpected: {other:?}"),
		}
	}

	#[test]
	fn heartbeat_is_ignored_marker() {
		assert!(matches!(interpret(&RawFrame::msg("heartbeat"), None), Interpreted::Heartbeat));
	}

	#[test]
	fn close_stream_classifies() {
		assert!(matches!(interpret(&RawFrame::msg("close_stream"), None), Interpreted::CloseStream));
	}
}
