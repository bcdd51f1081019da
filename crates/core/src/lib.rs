//! Workflow-graph compiler for node-graph image generation backends.
//!
//! Takes a hand-authored API-format workflow template, binds user
//! parameters into it, splices LoRA adapter chains between the base
//! model loader and its consumers, and repairs any references left
//! dangling by the rewrite. Everything here is synchronous and pure;
//! network access lives in `atelier-comfyui`.

pub mod binder;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod hashing;
pub mod naming;
pub mod operation;
pub mod path;
pub mod persistence;
pub mod registry;
pub mod repair;
pub mod schema;
pub mod splice;
pub mod templates;
