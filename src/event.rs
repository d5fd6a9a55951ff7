//! Events emitted to the caller (spec §3 "Event (emitted to caller)").

// self
use crate::_prelude::*;

/// The stage of a `status` event (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
	Pending,
	Generating,
	Complete,
	Error,
}

/// The narrowed stage a *terminal* status may carry. Distinct from [`Stage`]
/// so the terminal-emission call site (spec §9, open question 3) cannot
/// observably produce `Pending`/`Generating`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalStage {
	Complete,
	Error,
}
impl From<TerminalStage> for Stage {
	fn from(t: TerminalStage) -> Self {
		match t {
			TerminalStage::Complete => Self::Complete,
			TerminalStage::Error => Self::Error,
		}
	}
}

/// Optional generation-progress detail carried on some `status` events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Progress {
	pub index: Option<u32>,
	pub length: Option<u32>,
	pub unit: Option<String>,
	pub desc: Option<String>,
}

/// A payload-bearing or status event fired to a submission's listeners.
#[derive(Clone, Debug)]
pub enum Event {
	Status {
		stage: Stage,
		queue: bool,
		time: Option<String>,
		fn_index: usize,
		endpoint: String,
		eta: Option<f64>,
		message: Option<String>,
		broken: Option<bool>,
		progress: Option<Progress>,
	},
	Data {
		data: Value,
		time: Option<String>,
		fn_index: usize,
		endpoint: String,
		event_data: Option<Value>,
		trigger_id: Option<String>,
	},
	Log {
		level: String,
		log: String,
		fn_index: usize,
		endpoint: String,
	},
}
impl Event {
	/// The [`EventKind`] this event fires under, used for listener dispatch.
	pub fn kind(&self) -> EventKind {
		match self {
			Self::Status { .. } => EventKind::Status,
			Self::Data { .. } => EventKind::Data,
			Self::Log { .. } => EventKind::Log,
		}
	}

	/// Whether this is a terminal `status` event (spec Invariant 1).
	pub fn is_terminal_status(&self) -> bool {
		matches!(self, Self::Status { stage: Stage::Complete | Stage::Error, .. })
	}
}

/// The listener-registration key (spec §3 `listenerMap`: event-type ->
/// ordered set of listener callbacks).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	Status,
	Data,
	Log,
}

/// A single registered listener. Identity is the `Arc` pointer, used by
/// [`crate::submission::SubmissionHandle::off`] to remove the first match.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;
