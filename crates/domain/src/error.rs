//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::aggregate::ReplayError;
use crate::cart::CartError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The shopping cart refused a command or an event.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// A stored event has a type the aggregate does not know.
    #[error("Unknown event type {event_type:?} for {aggregate_type}")]
    UnknownEventType {
        aggregate_type: &'static str,
        event_type: String,
    },

    /// A stored stream could not be replayed.
    #[error("Replay of {aggregate_type} failed at event #{position}: {source}")]
    Replay {
        aggregate_type: &'static str,
        position: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Events were recorded on an aggregate that has no identity.
    #[error("Cannot persist {aggregate_type} without an identity")]
    MissingIdentity { aggregate_type: &'static str },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Wraps a replay failure of the given aggregate type.
    pub fn replay<E>(aggregate_type: &'static str, err: ReplayError<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DomainError::Replay {
            aggregate_type,
            position: err.position,
            source: Box::new(err.source),
        }
    }
}
