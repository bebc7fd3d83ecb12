//! Actor runtime: the execution shell every stage and router runs inside.
//!
//! One actor per address. For each delivery the runtime decodes the
//! envelope, checks it is addressed to this actor, runs the hosted logic
//! under its budget, merges the result, and publishes exactly once: to the
//! next step, to the aggregation address, or to the error handler.

pub mod actor;
pub mod address_book;
pub mod error;
pub mod hop;
pub mod publish;
pub mod settings;
pub mod stage;

pub use {
    actor::{ActorHandle, ActorRuntime},
    address_book::AddressBook,
    error::{Result, RuntimeError},
    hop::Hop,
    publish::publish_with_retry,
    settings::{PublishPolicy, RuntimeSettings},
    stage::{Dispatch, Router, Stage, StageFault},
};
