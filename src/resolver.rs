//! Map a logical endpoint to its internal function index (C1, spec §4.1).

// self
use crate::_prelude::*;

/// A caller-supplied endpoint reference — by name or by numeric index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
	Named(String),
	Index(usize),
}
impl From<&str> for Endpoint {
	fn from(s: &str) -> Self {
		Self::Named(s.to_owned())
	}
}
impl From<String> for Endpoint {
	fn from(s: String) -> Self {
		Self::Named(s)
	}
}
impl From<usize> for Endpoint {
	fn from(i: usize) -> Self {
		Self::Index(i)
	}
}

/// The result of resolving an [`Endpoint`] (spec §4.1).
#[derive(Clone, Debug)]
pub struct Resolved {
	pub fn_index: usize,
	pub api_info: ApiInfoEntry,
	pub dependency: Dependency,
	pub endpoint_path: String,
}

/// Resolve `endpoint` to its function index and descriptor. Pure — no side
/// effects, no I/O.
pub fn resolve(
	endpoint: &Endpoint,
	api: &ApiInfo,
	api_map: &ApiMap,
	config: &Config,
) -> Result<Resolved> {
	match endpoint {
		Endpoint::Index(index) => {
			let entry = api
				.unnamed_endpoints
				.get(index)
				.ok_or_else(|| Error::UnknownEndpoint(index.to_string()))?;

			Ok(Resolved {
				fn_index: entry.fn_index,
				api_info: entry.clone(),
				dependency: config.dependency(entry.fn_index),
				endpoint_path: "/predict".to_owned(),
			})
		},
		Endpoint::Named(name) => {
			let trimmed = name.strip_prefix('/').unwrap_or(name);
			let fn_index = api_map
				.get(trimmed)
				.copied()
				.ok_or_else(|| Error::UnknownEndpoint(name.clone()))?;
			let entry = api
				.named_endpoints
				.get(trimmed)
				.ok_or_else(|| Error::UnknownEndpoint(name.clone()))?;

			Ok(Resolved {
				fn_index,
				api_info: entry.clone(),
				dependency: config.dependency(fn_index),
				endpoint_path: format!("/{trimmed}"),
			})
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> (ApiInfo, ApiMap, Config) {
		let mut named_endpoints = HashMap::new();

		named_endpoints.insert("predict".to_owned(), ApiInfoEntry { fn_index: 0, parameters: vec![] });

		let mut unnamed_endpoints = HashMap::new();

		unnamed_endpoints.insert(0, ApiInfoEntry { fn_index: 0, parameters: vec![] });

		let api = ApiInfo { named_endpoints, unnamed_endpoints };
		let api_map = build_api_map(&api);
		let config = Config {
			root: "http://localhost:7860".into(),
			path: "".into(),
			protocol: Protocol::Ws,
			version: Version::default(),
			dependencies: vec![Dependency::default()],
			space_id: None,
			auth_required: false,
		};

		(api, api_map, config)
	}

	#[test]
	fn resolves_named_endpoint_with_leading_slash() {
		let (api, api_map, config) = sample();
		let resolved = resolve(&Endpoint::from("/predict"), &api, &api_map, &config).unwrap();

		assert_eq!(resolved.fn_index, 0);
		assert_eq!(resolved.endpoint_path, "/predict");
	}

	#[test]
	fn resolves_numeric_endpoint() {
		let (api, api_map, config) = sample();
		let resolved = resolve(&Endpoint::from(0usize), &api, &api_map, &config).unwrap();

		assert_eq!(resolved.fn_index, 0);
	}

	#[test]
	fn unknown_named_endpoint_errors() {
		let (api, api_map, config) = sample();
		let err = resolve(&Endpoint::from("/missing"), &api, &api_map, &config).unwrap_err();

		assert!(matches!(err, Error::UnknownEndpoint(_)));
	}

	#[test]
	fn unknown_numeric_endpoint_errors() {
		let (api, api_map, config) = sample();
		let err = resolve(&Endpoint::from(99usize), &api, &api_map, &config).unwrap_err();

		assert!(matches!(err, Error::UnknownEndpoint(_)));
	}
}
