//! Configuration and endpoint-descriptor types consumed from the external
//! discovery collaborator (spec §6 "Configuration consumed").

// self
use crate::_prelude::*;

/// A single `(major, minor, patch)` server version, used only to gate the
/// WS back-compat handshake quirk (spec §9).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub u32, pub u32, pub u32);
impl Version {
	/// Parse a `"major.minor.patch"` string, defaulting unset or unparsable
	/// components to `0` rather than failing — an unknown version is treated
	/// as old enough to need the quirk.
	pub fn parse(s: &str) -> Self {
		let mut parts = s.split('.').map(|p| p.parse::<u32>().unwrap_or(0));

		Self(parts.next().unwrap_or(0), parts.next().unwrap_or(0), parts.next().unwrap_or(0))
	}

	/// Whether a server at this version requires the legacy WS open-time
	/// `{hash: session_hash}` send (spec §4.6, §9: "keep it behind a
	/// version-compare helper rather than sprinkled `if`s").
	pub fn requires_legacy_hash_handshake(&self) -> bool {
		*self < Version(3, 6, 0)
	}
}
impl<'de> Deserialize<'de> for Version {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(Self::parse(&String::deserialize(deserializer)?))
	}
}

/// The queue protocol a server advertises for its dependencies, generated
/// with the teacher's enum-codegen macro family (`util.rs`) rather than a
/// hand-rolled `Deserialize` impl.
impl_deserializable_enum! {
	Protocol {
		Ws => "ws",
		Sse => "sse",
		SseV1 => "sse_v1",
		SseV2 => "sse_v2",
		SseV2_1 => "sse_v2.1",
		SseV3 => "sse_v3",
	}
}
impl Protocol {
	/// Whether this protocol folds generating frames through the diff
	/// machinery (C4) rather than carrying the full value every time.
	pub fn is_diff_streaming(&self) -> bool {
		matches!(self, Self::SseV2 | Self::SseV2_1 | Self::SseV3)
	}

	/// Whether frame-interpretation errors close the mux stream immediately
	/// (v2/v2.1) or leave it open for the server's `close_stream` (v3).
	pub fn closes_mux_on_client_exception(&self) -> bool {
		matches!(self, Self::SseV2 | Self::SseV2_1)
	}

	/// Whether this protocol multiplexes many submissions over one SSE
	/// connection (vs. a dedicated transport per submission).
	pub fn is_multiplexed(&self) -> bool {
		matches!(self, Self::SseV1 | Self::SseV2 | Self::SseV2_1 | Self::SseV3)
	}
}
/// Per-dependency (per-fn_index) descriptor (spec §3 "Dependency descriptor").
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Dependency {
	#[serde(default)]
	pub skip_queue: bool,
	#[serde(default)]
	pub zerogpu: bool,
}

/// One component's schema, as far as the payload preparer (C2) needs it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ComponentSchema {
	#[serde(default)]
	pub r#type: Option<String>,
}
impl ComponentSchema {
	/// Whether this component carries a binary payload that must be
	/// uploaded rather than sent inline (spec §4.2).
	pub fn is_binary(&self) -> bool {
		matches!(self.r#type.as_deref(), Some("blob") | Some("file"))
	}
}

/// One endpoint's discovered signature (positional input/output component
/// schemas), as returned by the out-of-scope `view_api` collaborator.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiInfoEntry {
	#[serde(default)]
	pub fn_index: usize,
	#[serde(default)]
	pub parameters: Vec<ComponentSchema>,
}

/// The full discovered API surface (spec §3, §4.1).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiInfo {
	#[serde(default)]
	pub named_endpoints: HashMap<String, ApiInfoEntry>,
	#[serde(default)]
	pub unnamed_endpoints: HashMap<usize, ApiInfoEntry>,
}

/// name -> fn_index, derived from [`ApiInfo`] at session creation time.
pub type ApiMap = HashMap<String, usize>;

pub fn build_api_map(api: &ApiInfo) -> ApiMap {
	api.named_endpoints.iter().map(|(name, entry)| (name.clone(), entry.fn_index)).collect()
}

/// Server-wide configuration (spec §6 "Configuration consumed").
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub root: String,
	#[serde(default)]
	pub path: String,
	pub protocol: Protocol,
	#[serde(default)]
	pub version: Version,
	#[serde(default)]
	pub dependencies: Vec<Dependency>,
	#[serde(default)]
	pub space_id: Option<String>,
	#[serde(default)]
	pub auth_required: bool,
}
impl Config {
	pub fn dependency(&self, fn_index: usize) -> Dependency {
		self.dependencies.get(fn_index).copied().unwrap_or_default()
	}
}
