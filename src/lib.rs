//! corefviz: side-by-side viewer for gold and system event mentions
//!
//! Prepares brat-embeddable JSON from event-detection comparison output and
//! brat coreference annotations, and serves a viewer that shows gold and
//! system annotations next to each other, optionally restricted to selected
//! coreference clusters.

pub mod brat;
pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod output;
pub mod payload;
#[cfg(feature = "serve")]
pub mod serve;
pub mod state;
pub mod store;
