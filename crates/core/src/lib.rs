//! `tallybook-core`: shared building blocks for the bookkeeping engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, CompanyId, EntryId, JournalId, LedgerRowId, UserId};
pub use value_object::{DateRange, ValueObject};
