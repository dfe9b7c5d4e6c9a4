//! # pubflow-state — Publication Lifecycle State Machine
//!
//! The pure core of pubflow. Nothing here performs I/O, takes a lock or
//! reads the clock: every transition is
//! `apply(&Artifact, &LifecycleEvent, &GuardContext, now) -> Result<Transition, LifecycleError>`.
//! The returned [`Transition`] carries the next artifact snapshot and the
//! ordered list of [`Effect`]s to hand to collaborators after commit.
//!
//! ## States
//!
//! `Draft → PendingReview → Public → Published → WithdrawalPending → Withdrawn`
//! is the main path. `make_private`, `return_to_draft`, `force_withdraw` and
//! `unwithdraw` are the side doors; the full table is in [`lifecycle`].
//!
//! `Withdrawn` carries the sub-state it was entered from, so `unwithdraw`
//! restores exactly that state.
//!
//! ## Modules
//!
//! - [`lifecycle`]: states, events, transition table, `apply`.
//! - [`artifact`]: the artifact record, metadata edits, versioning, invariants.
//! - [`withdrawal`]: withdrawal requests and their resolution.
//! - [`effect`]: post-commit side effects.
//! - [`error`]: `LifecycleError`.

pub mod artifact;
pub mod effect;
pub mod error;
pub mod lifecycle;
pub mod withdrawal;

pub use artifact::{Artifact, Contributor, MetadataPatch, NewArtifact, MAX_WITHDRAWAL_REQUESTS};
pub use effect::Effect;
pub use error::LifecycleError;
pub use lifecycle::{
    apply, GuardContext, LifecycleEvent, LifecycleState, Transition, TransitionRecord,
    WithdrawnFrom, MAX_TRANSITION_RECORDS,
};
pub use withdrawal::{Resolution, WithdrawalRequest};
