//! # pubflow-lifecycle — Publication Lifecycle Controller
//!
//! Wraps the pure state machine in `pubflow-state` with everything needed
//! to run it against shared data:
//!
//! - [`store`]: in-memory artifact store and indexes.
//! - [`locks`]: per-artifact try-locks. A concurrent second caller fails
//!   fast with `ConflictingTransition` instead of waiting.
//! - [`permission`]: the [`PermissionOracle`] port and the default
//!   contributor/moderator implementation.
//! - [`audit`]: bounded trail of committed and rejected operations.
//! - [`controller`]: [`LifecycleController`], one method per operation.
//!
//! The controller never waits on a collaborator. Effects are handed to an
//! [`EffectSink`](pubflow_notify::EffectSink) after the snapshot is
//! committed; a refused hand-off is reported as a warning.

pub mod audit;
pub mod controller;
pub mod error;
pub mod locks;
pub mod permission;
pub mod store;

pub use audit::{AuditEntry, AuditEntryType, AuditTrail};
pub use controller::{Invocation, LifecycleController, TransitionReport};
pub use error::ControllerError;
pub use locks::{ArtifactGuard, ArtifactLocks};
pub use permission::{ContributorPermissions, PermissionOracle};
pub use store::Store;
