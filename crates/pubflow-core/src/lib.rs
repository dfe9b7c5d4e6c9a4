//! # pubflow-core — Foundational Types
//!
//! Leaf crate of the pubflow workspace. Every other crate depends on it;
//! it depends on nothing internal.
//!
//! ## Contents
//!
//! 1. **Identifier newtypes.** `ArtifactId`, `ActorId`, `RequestId` wrap a
//!    UUID each. An `ActorId` cannot be passed where an `ArtifactId` is
//!    expected.
//!
//! 2. **`Timestamp`.** UTC-only, seconds precision. Publication and
//!    withdrawal stamps compare equal across serialization round trips.
//!
//! 3. **`Capability`.** Ordered `Read < Write < Admin` so that permission
//!    checks are a single comparison.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod capability;
pub mod error;
pub mod identity;
pub mod temporal;

pub use capability::Capability;
pub use error::ValidationError;
pub use identity::{ActorId, ArtifactId, RequestId};
pub use temporal::Timestamp;
