//! Generation orchestration on top of the compiler and the ComfyUI client.
//!
//! [`generation::GenerationService`] drives one job from request to stored
//! artifact; [`store::LocalStore`] is a filesystem-backed persistence
//! collaborator.

pub mod generation;
pub mod store;
