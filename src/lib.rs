//! `flagship_core` is the decision engine behind a feature-flagging and
//! experimentation SDK. It turns a server-published datafile into
//! deterministic flag decisions for users, and ships the resulting events.
//!
//! # Overview
//!
//! [`ProjectConfig`](project_config::ProjectConfig) is the heart of the
//! engine: an immutable, cross-indexed snapshot of one datafile revision.
//! [`ConfigStore`](config_store::ConfigStore) is a thread-safe container for
//! the active config; readers always work against a consistent snapshot
//! while new revisions are swapped in whole.
//!
//! The [`decision`] pipeline resolves a flag for a
//! [`UserContext`](user_context::UserContext) through a strict stage order:
//! forced decisions, sticky assignments, holdouts, feature experiments, and
//! finally delivery rules. Audience targeting is three-valued
//! ([`condition`]): a failed match is *unknown*, not false, until it is
//! folded at the audience boundary. Traffic splits ([`bucketer`]) hash with
//! MurmurHash3 so every platform agrees on the assignment.
//!
//! The [`odp`] module connects to the third-party data platform: an event
//! queue with batched background delivery, and qualified-segment resolution
//! with an LRU cache in front of the GraphQL endpoint ([`segments`]).
//!
//! [`Client`] wires all of this together behind the public
//! decide/track/identify surface. Most hosts construct one `Client`, feed it
//! datafiles, and share it behind an `Arc`.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod bucketer;
pub mod client;
pub mod condition;
pub mod config_store;
pub mod datafile;
pub mod decision;
pub mod events;
pub mod odp;
pub mod project_config;
pub mod segments;
pub mod user_context;
pub mod user_profile;
pub mod version;

mod error;
mod sdk_metadata;
mod value;

pub use client::Client;
pub use decision::{DecideOption, Decision, DecisionSource};
pub use error::{Error, Result};
pub use project_config::{holdout_support, set_holdout_support, ProjectConfig};
pub use sdk_metadata::SdkMetadata;
pub use segments::SegmentOption;
pub use user_context::{DecisionContext, UserContext, BUCKETING_ID_ATTRIBUTE};
pub use value::{Attributes, Value, MAX_NUMERIC_VALUE};
