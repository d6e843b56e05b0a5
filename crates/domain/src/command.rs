//! Command handling infrastructure.
//!
//! Bridges aggregates and the event store: pending events go out as
//! envelopes, stored envelopes come back through `replay`.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Rebuilding the aggregate from its stored stream
/// 2. Running the command, which records events on the aggregate
/// 3. Persisting the recorded events with optimistic concurrency
/// 4. Flushing them from the aggregate once stored
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<fn() -> A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays the stored stream of `aggregate_id` into a fresh aggregate.
    #[tracing::instrument(skip(self, aggregate), fields(aggregate_type = A::aggregate_type()))]
    pub async fn load_into(&self, aggregate_id: AggregateId, aggregate: &mut A) -> Result<(), DomainError> {
        let envelopes = self.store.load_stream(aggregate_id).await?;
        let events = envelopes
            .iter()
            .map(|envelope| decode_event::<A::Event>(A::aggregate_type(), envelope))
            .collect::<Result<Vec<_>, _>>()?;

        aggregate
            .replay(&events)
            .map_err(|err| DomainError::replay(A::aggregate_type(), err))?;

        metrics::counter!("aggregate_replays_total", "aggregate_type" => A::aggregate_type())
            .increment(1);
        Ok(())
    }

    /// Runs a command against the aggregate and persists what it recorded.
    ///
    /// A command that records nothing returns without touching the store.
    pub async fn execute<F>(&self, mut aggregate: A, command_fn: F) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&mut A) -> Result<(), A::Error>,
    {
        command_fn(&mut aggregate)?;

        let events = aggregate.pending_events().to_vec();
        let new_version = self.save(&mut aggregate).await?;

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Appends the pending events of `aggregate` and flushes them.
    ///
    /// The first pending event continues the stream right after the version
    /// the aggregate had when it was loaded; anything else appended in the
    /// meantime surfaces as a concurrency conflict.
    #[tracing::instrument(skip(self, aggregate), fields(aggregate_type = A::aggregate_type()))]
    pub async fn save(&self, aggregate: &mut A) -> Result<Version, DomainError> {
        let pending = aggregate.pending_events();
        if pending.is_empty() {
            return Ok(aggregate.version());
        }

        let aggregate_id = aggregate.aggregate_id().ok_or(DomainError::MissingIdentity {
            aggregate_type: A::aggregate_type(),
        })?;
        let base_version = aggregate.version().rewind(pending.len());
        let envelopes = build_envelopes::<A>(aggregate_id, base_version, pending)?;
        let count = envelopes.len();

        let options = if base_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(base_version)
        };
        let new_version = self.store.append(envelopes, options).await?;
        aggregate.flush();

        metrics::counter!("aggregate_events_persisted_total", "aggregate_type" => A::aggregate_type())
            .increment(count as u64);
        tracing::debug!(%aggregate_id, count, version = %new_version, "pending events persisted");
        Ok(new_version)
    }
}

/// Builds event envelopes from domain events.
fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    base_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = base_version;

    for event in events {
        version = version.next();
        let operation = event.operation();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .timestamp(operation.instant())
            .metadata("operation_kind", serde_json::json!(operation.kind().as_str()))
            .payload(event)?
            .build()?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

/// Decodes a stored envelope, refusing event types the family does not declare.
pub fn decode_event<E: DomainEvent>(
    aggregate_type: &'static str,
    envelope: &EventEnvelope,
) -> Result<E, DomainError> {
    if !E::event_types().contains(&envelope.event_type.as_str()) {
        return Err(DomainError::UnknownEventType {
            aggregate_type,
            event_type: envelope.event_type.clone(),
        });
    }
    Ok(envelope.decode()?)
}
