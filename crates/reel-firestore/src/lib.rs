//! Firestore REST persistence.
//!
//! This crate provides:
//! - A REST client with cached service-account auth, retry and metrics
//! - Store traits for automations, videos and connected accounts
//! - Firestore-backed implementations of those traits
//! - An in-memory implementation behind the `memory` feature

pub mod auth;
pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use client::{FirestoreClient, FirestoreConfig, Precondition};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{AccountRepository, AutomationRepository, VideoRepository};
pub use store::{AccountStore, AutomationStore, PlatformSnapshot, VideoStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

#[cfg(any(test, feature = "memory"))]
pub use memory::InMemoryStore;
