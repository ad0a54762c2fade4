#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fincalc/fincalc/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! HTTP API for the calculation engine.

/// Error-to-response mapping.
pub mod error;
/// Route handlers and router assembly.
pub mod routes;

pub use error::{ApiError, Problem};
pub use routes::{AppState, build_router};
