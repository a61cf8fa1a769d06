//! Enrollment workflow.

mod enrollment;
pub mod locks;

pub use enrollment::EnrollmentService;
pub use locks::IdentityLocks;

#[cfg(test)]
pub(crate) use enrollment::tests as fixtures;
