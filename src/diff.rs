//! Incremental diff folding for the `sse_v2` family's generating frames
//! (C4, spec §4.4).

// self
use crate::_prelude::*;

/// One step of a path into a recursive JSON-shaped value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
	Key(String),
	Index(usize),
}

/// The operation a single diff step performs at its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffOpKind {
	Set,
	Append,
	Replace,
}

/// One step of a diff descriptor.
#[derive(Clone, Debug)]
pub struct DiffOp {
	pub path: Vec<PathSegment>,
	pub op: DiffOpKind,
	pub value: Value,
}

/// Either a full value (first receipt) or a sequence of patches against the
/// previously stored snapshot.
#[derive(Clone, Debug)]
pub enum DiffPayload {
	Full(Value),
	Patch(Vec<DiffOp>),
}

/// Per-event_id running snapshots (spec §3 `pendingDiffStreams`).
#[derive(Debug, Default)]
pub struct DiffStore {
	snapshots: HashMap<String, Value>,
}
impl DiffStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether a snapshot currently exists for `event_id` (Invariant 5).
	pub fn contains(&self, event_id: &str) -> bool {
		self.snapshots.contains_key(event_id)
	}

	/// Apply one payload to the running snapshot for `event_id`, returning
	/// the updated value to publish as the caller's `data` event. Pure
	/// `(prev, diff) -> next` fold (DESIGN NOTES §9); the store only holds
	/// `prev`.
	pub fn apply(&mut self, event_id: &str, payload: DiffPayload) -> Value {
		match payload {
			DiffPayload::Full(value) => {
				self.snapshots.insert(event_id.to_owned(), value.clone());

				value
			},
			DiffPayload::Patch(ops) => {
				let mut snapshot = self.snapshots.remove(event_id).unwrap_or(Value::Null);

				for op in ops {
					apply_op(&mut snapshot, &op.path, op.op, op.value);
				}

				self.snapshots.insert(event_id.to_owned(), snapshot.clone());

				snapshot
			},
		}
	}

	/// Discard the snapshot for `event_id` on terminal status (Invariant 5).
	pub fn discard(&mut self, event_id: &str) {
		self.snapshots.remove(event_id);
	}
}

fn apply_op(root: &mut Value, path: &[PathSegment], op: DiffOpKind, value: Value) {
	let Some(target) = navigate(root, path) else { return };

	match op {
		DiffOpKind::Set | DiffOpKind::Replace => *target = value,
		DiffOpKind::Append => match target {
			Value::Array(arr) => arr.push(value),
			Value::String(s) =>
				if let Value::String(suffix) = &value {
					s.push_str(suffix);
				},
			slot => *slot = value,
		},
	}
}

/// Walk `path` from `root`, creating intermediate containers as needed, and
/// return a mutable reference to the target slot.
fn navigate<'a>(root: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
	let mut current = root;

	for segment in path {
		current = match (segment, current) {
			(PathSegment::Key(key), Value::Object(map)) =>
				map.entry(key.clone()).or_insert(Value::Null),
			(PathSegment::Index(idx), Value::Array(arr)) => {
				while arr.len() <= *idx {
					arr.push(Value::Null);
				}

				arr.get_mut(*idx)?
			},
			_ => return None,
		};
	}

	Some(current)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn first_receipt_stores_full_value() {
		let mut store = DiffStore::new();
		let published = store.apply("E1", DiffPayload::Full(json!({"text": "h"})));

		assert_eq!(published, json!({"text": "h"}));
		assert!(store.contains("E1"));
	}

	#[test]
	fn set_patch_mutates_stored_snapshot() {
		let mut store = DiffStore::new();

		store.apply("E1", DiffPayload::Full(json!({"text": "h"})));

		let published = store.apply(
			"E1",
			DiffPayload::Patch(vec![DiffOp {
				path: vec![PathSegment::Key("text".into())],
				op: DiffOpKind::Set,
				value: json!("hi"),
			}]),
		);

		assert_eq!(published, json!({"text": "hi"}));
	}

	#[test]
	fn append_patch_pushes_to_array() {
		let mut store = DiffStore::new();

		store.apply("E1", DiffPayload::Full(json!({"items": [1]})));

		let published = store.apply(
			"E1",
			DiffPayload::Patch(vec![DiffOp {
				path: vec![PathSegment::Key("items".into())],
				op: DiffOpKind::Append,
				value: json!(2),
			}]),
		);

		assert_eq!(published, json!({"items": [1, 2]}));
	}

	#[test]
	fn discard_removes_snapshot() {
		let mut store = DiffStore::new();

		store.apply("E1", DiffPayload::Full(json!(1)));
		store.discard("E1");

		assert!(!store.contains("E1"));
	}

	#[test]
	fn round_trip_full_then_replace_then_append_is_deterministic() {
		let mut store = DiffStore::new();

		store.apply("E1", DiffPayload::Full(json!({"tokens": ["a"], "done": false})));
		store.apply(
			"E1",
			DiffPayload::Patch(vec![DiffOp {
				path: vec![PathSegment::Key("tokens".into())],
				op: DiffOpKind::Append,
				value: json!("b"),
			}]),
		);
		let published = store.apply(
			"E1",
			DiffPayload::Patch(vec![DiffOp {
				path: vec![PathSegment::Key("done".into())],
				op: DiffOpKind::Replace,
				value: json!(true),
			}]),
		);

		assert_eq!(published, json!({"tokens": ["a", "b"], "done": true}));
	}
}
