//! Core submission engine for a client of a remote application-hosting
//! service that exposes user-defined prediction endpoints over one of
//! several historical queue protocols (direct POST, legacy WS, legacy SSE,
//! and the `sse_v1`/`sse_v2`/`sse_v2.1`/`sse_v3` multiplexed revisions).
//!
//! Endpoint discovery, space warm-up, auth-token exchange, and the
//! higher-level front-end facades are out of scope (see `SPEC_FULL.md`);
//! this crate defines the narrow collaborator traits those layers must
//! satisfy and ships minimal defaults.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod config;
pub mod diff;
pub mod error;
pub mod event;
pub mod frame;
pub mod mux;
pub mod payload;
pub mod resolver;
pub mod session;
pub mod submission;
pub mod transport;
pub mod upload;

mod util;

pub mod prelude {
	#![allow(missing_docs)]

	pub use crate::{
		config::*, diff::*, error::*, event::*, frame::*, mux::*, payload::*, resolver::*,
		session::*, submission::*, transport::*, upload::*,
	};
}

mod _prelude {
	pub use std::{
		borrow::Cow,
		collections::{HashMap, HashSet},
		fmt::{Display, Formatter, Result as FmtResult},
		future::Future,
		sync::Arc,
	};

	pub use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
	pub use serde_json::Value;

	pub(crate) use crate::{config::*, error::*, event::*, frame::*, util::*};
}
