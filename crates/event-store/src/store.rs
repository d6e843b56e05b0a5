use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Concurrency expectations for an append.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the stream head must be at. `None` skips the check, though
    /// the batch must still continue the stream.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistic append against a stream last read at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// The stream must not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Core trait for event store implementations.
///
/// An event store persists events and hands them back in the order they
/// were appended. It makes no assumption about what the payload means.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch to one stream, all or nothing.
    ///
    /// Fails with `ConcurrencyConflict` when the head differs from
    /// `options.expected_version` or the batch does not start right after
    /// the head. Returns the new head.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Retrieves all events for a specific aggregate.
    ///
    /// Events are returned in version order (oldest first).
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves all events for an aggregate starting from a specific version.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves events by type, across aggregates, in append order.
    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of an aggregate.
    ///
    /// Returns None if the aggregate doesn't exist.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Loads the full stream of an existing aggregate.
    ///
    /// Fails with `AggregateNotFound` when the stream is empty.
    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let events = self.get_events_for_aggregate(aggregate_id).await?;
        if events.is_empty() {
            return Err(EventStoreError::AggregateNotFound(aggregate_id));
        }
        Ok(events)
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch is non-empty, targets a single stream and carries
/// consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let invalid = |reason: String| Err(EventStoreError::InvalidAppend(reason));

    let Some(first) = events.first() else {
        return invalid("batch is empty".to_string());
    };

    for pair in events.windows(2) {
        let (prev, event) = (&pair[0], &pair[1]);
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type {
            return invalid(format!(
                "batch mixes streams {}/{} and {}/{}",
                first.aggregate_type, first.aggregate_id, event.aggregate_type, event.aggregate_id
            ));
        }
        if event.version != prev.version.next() {
            return invalid(format!(
                "{} follows {} in the batch",
                event.version, prev.version
            ));
        }
    }

    Ok(())
}
