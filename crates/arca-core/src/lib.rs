//! ARCA Certificate Enrollment Core Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Browser automation
//! - External processes
//! - HTTP
//!
//! Everything the enrollment workflow passes between its steps is defined here.

pub mod alias;
pub mod artifacts;
pub mod error;
pub mod identity;
pub mod request;

// Re-export commonly used types
pub use alias::Alias;
pub use artifacts::{ArtifactKind, ArtifactPaths};
pub use error::{CryptoStage, EnrollError};
pub use identity::Identity;
pub use request::{EnrollmentRequest, EnrollmentResult, SUCCESS_MESSAGE};
