//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record access and external collaborators into use-cases.
//! - Keep HTTP glue decoupled from storage details.

pub mod registration;
