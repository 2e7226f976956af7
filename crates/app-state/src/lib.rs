//! Client-side state stores for Projectdesk
//!
//! Two independent stores bind API responses to in-memory state:
//!
//! - [`auth::AuthStore`] tracks the signed-in session and its cookies
//! - [`projects::ProjectsStore`] caches projects and their tasks
//!
//! Both receive their collaborators through a [`StoreContext`] and never
//! hold a lock across an `.await`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod context;
pub mod error;
pub mod projects;

#[cfg(test)]
mod test_support;

pub use auth::{AuthStore, Credentials, LoginOptions, ResetPasswordParams, Session, User};
pub use context::StoreContext;
pub use error::{Result, StoreError};
pub use projects::{EntityId, FetchOutcome, Project, ProjectsState, ProjectsStore, Task};
