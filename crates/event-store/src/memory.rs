use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, validate_events_for_append},
};

/// Per-aggregate streams plus a global append log.
#[derive(Default)]
struct Streams {
    by_aggregate: HashMap<AggregateId, Vec<EventEnvelope>>,
    /// `(aggregate, index into its stream)` in append order.
    log: Vec<(AggregateId, usize)>,
}

impl Streams {
    fn head(&self, aggregate_id: AggregateId) -> Version {
        self.by_aggregate
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map_or_else(Version::initial, |event| event.version)
    }

    fn in_append_order(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.log
            .iter()
            .filter_map(|(id, index)| self.by_aggregate.get(id)?.get(*index))
    }
}

/// In-memory event store.
///
/// Streams are stored contiguously in version order, so reads never sort.
/// Cloning the store yields another handle onto the same streams.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<Streams>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events across all streams.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.log.len()
    }

    /// Drops every stream.
    pub async fn clear(&self) {
        let mut streams = self.streams.write().await;
        streams.by_aggregate.clear();
        streams.log.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id;
        let first = events[0].version;

        let mut streams = self.streams.write().await;
        let head = streams.head(aggregate_id);

        let conflict = match options.expected_version {
            Some(expected) => expected != head,
            None => false,
        };
        // A batch must also pick up exactly where the stream ends.
        if conflict || first != head.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(head),
                actual: head,
            });
        }

        let count = events.len();
        let Streams { by_aggregate, log } = &mut *streams;
        let stream = by_aggregate.entry(aggregate_id).or_default();
        let start = stream.len();
        stream.extend(events);
        log.extend((start..start + count).map(|index| (aggregate_id, index)));

        let new_head = streams.head(aggregate_id);
        tracing::debug!(%aggregate_id, count, version = %new_head, "stream extended");
        Ok(new_head)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams
            .by_aggregate
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        let Some(stream) = streams.by_aggregate.get(&aggregate_id) else {
            return Ok(Vec::new());
        };
        let start = stream.partition_point(|event| event.version < from_version);
        Ok(stream[start..].to_vec())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams
            .in_append_order()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let streams = self.streams.read().await;
        Ok(streams
            .by_aggregate
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map(|event| event.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStoreExt;

    fn envelope(cart: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(cart)
            .aggregate_type("ShoppingCart")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({ "cart": cart.to_string() }))
            .build()
            .unwrap()
    }

    async fn seeded(cart: AggregateId, types: &[&str]) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let batch = types
            .iter()
            .enumerate()
            .map(|(i, t)| envelope(cart, i as i64 + 1, t))
            .collect();
        store.append(batch, AppendOptions::expect_new()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn new_stream_accepts_first_batch() {
        let cart = AggregateId::new();
        let store = seeded(cart, &["CartCreated", "ItemAdded", "ItemRemoved"]).await;

        let stream = store.get_events_for_aggregate(cart).await.unwrap();
        let types: Vec<_> = stream.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["CartCreated", "ItemAdded", "ItemRemoved"]);
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let cart = AggregateId::new();
        let store = seeded(cart, &["CartCreated"]).await;

        let result = store
            .append(
                vec![envelope(cart, 2, "ItemAdded")],
                AppendOptions::expect_version(Version::initial()),
            )
            .await;

        match result {
            Err(EventStoreError::ConcurrencyConflict { expected, actual, .. }) => {
                assert_eq!(expected, Version::initial());
                assert_eq!(actual, Version::first());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn matching_expected_version_extends_stream() {
        let cart = AggregateId::new();
        let store = seeded(cart, &["CartCreated"]).await;

        let version = store
            .append(
                vec![envelope(cart, 2, "ItemAdded")],
                AppendOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
    }

    #[tokio::test]
    async fn unchecked_append_must_continue_the_stream() {
        let cart = AggregateId::new();
        let store = seeded(cart, &["CartCreated"]).await;

        let replayed_creation = store
            .append(vec![envelope(cart, 1, "CartCreated")], AppendOptions::new())
            .await;
        let gap = store
            .append(vec![envelope(cart, 3, "ItemAdded")], AppendOptions::new())
            .await;

        assert!(matches!(replayed_creation, Err(EventStoreError::ConcurrencyConflict { .. })));
        assert!(matches!(gap, Err(EventStoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let store = InMemoryEventStore::new();

        let result = store.append(vec![], AppendOptions::new()).await;

        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[tokio::test]
    async fn read_from_version_skips_older_events() {
        let cart = AggregateId::new();
        let store = seeded(cart, &["CartCreated", "ItemAdded", "ItemAdded"]).await;

        let tail = store
            .get_events_for_aggregate_from_version(cart, Version::new(2))
            .await
            .unwrap();

        let versions: Vec<_> = tail.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, [2, 3]);
    }

    #[tokio::test]
    async fn events_by_type_span_carts_in_append_order() {
        let first = AggregateId::new();
        let second = AggregateId::new();
        let store = seeded(first, &["CartCreated"]).await;
        store
            .append(vec![envelope(second, 1, "CartCreated")], AppendOptions::expect_new())
            .await
            .unwrap();
        store
            .append(vec![envelope(first, 2, "ItemAdded")], AppendOptions::new())
            .await
            .unwrap();

        let created = store.get_events_by_type("CartCreated").await.unwrap();
        let owners: Vec<_> = created.iter().map(|e| e.aggregate_id).collect();
        assert_eq!(owners, [first, second]);
        assert_eq!(store.get_events_by_type("ItemAdded").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn version_tracks_stream_head() {
        let cart = AggregateId::new();
        let store = InMemoryEventStore::new();
        assert_eq!(store.get_aggregate_version(cart).await.unwrap(), None);
        assert!(!store.aggregate_exists(cart).await.unwrap());

        store
            .append(
                vec![envelope(cart, 1, "CartCreated"), envelope(cart, 2, "ItemAdded")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(store.get_aggregate_version(cart).await.unwrap(), Some(Version::new(2)));
        assert!(store.aggregate_exists(cart).await.unwrap());
    }

    #[tokio::test]
    async fn load_stream_of_unknown_cart_fails() {
        let store = InMemoryEventStore::new();
        let cart = AggregateId::new();

        let result = store.load_stream(cart).await;

        assert!(matches!(
            result,
            Err(EventStoreError::AggregateNotFound(id)) if id == cart
        ));
    }

    #[tokio::test]
    async fn clones_share_streams_until_cleared() {
        let cart = AggregateId::new();
        let store = seeded(cart, &["CartCreated"]).await;
        let handle = store.clone();

        handle.clear().await;

        assert_eq!(store.event_count().await, 0);
        assert!(store.get_events_for_aggregate(cart).await.unwrap().is_empty());
    }
}
