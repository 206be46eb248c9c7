//! Collaborator interfaces.
//!
//! The pipeline core depends only on these traits. Page fetching, LLM
//! calls, storage and the company directory are supplied by the host
//! application as `Arc<dyn Trait>`.

pub mod ai;
pub mod registry;
pub mod store;
pub mod web;
