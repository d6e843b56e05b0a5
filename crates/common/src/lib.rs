//! Shared types for the shopping cart event-sourcing system.
//!
//! - [`AggregateId`] keys event streams in the store.
//! - The [`audit`] module holds the provenance records stamped on every event.

pub mod audit;
pub mod types;

pub use audit::{
    AuditStamp, FixedClockProvider, Lifetime, OperationContext, OperationContextProvider,
    OperationKind,
};
pub use types::AggregateId;
