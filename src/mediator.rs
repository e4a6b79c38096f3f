//! Cache-backed request mediator.
//!
//! Sits between the prompt builders and the backend adapters: every
//! [`crate::types::Request`] goes through the response cache first and only
//! reaches a backend, under the shared retry policy, on a miss.

pub mod builder;
pub mod core;

pub use builder::MediatorBuilder;
pub use core::Mediator;
