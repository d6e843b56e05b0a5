use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError, Result};

/// Unique identifier for a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Position of an aggregate in its own stream.
///
/// A fresh aggregate sits at version 0; each applied event moves it forward
/// by exactly one, so the version of an event equals its position in the
/// aggregate's stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw stream position.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of an aggregate no event has touched yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version carried by the first event of a stream.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the version after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw stream position.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns the version `count` events before this one, floored at the initial version.
    pub fn rewind(&self, count: usize) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(count).max(0))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A serialized domain event plus the bookkeeping needed to store it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// Discriminator of the payload, e.g. `"ItemAdded"`.
    pub event_type: String,

    /// Stream the event belongs to.
    pub aggregate_id: AggregateId,

    /// Kind of aggregate owning the stream, e.g. `"ShoppingCart"`.
    pub aggregate_type: String,

    /// Version of the aggregate once this event is applied.
    pub version: Version,

    /// When the operation behind the event happened.
    pub timestamp: DateTime<Utc>,

    pub payload: serde_json::Value,

    /// Free-form annotations, kept sorted by key.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Starts building an envelope.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Deserializes the payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Step-by-step construction of an [`EventEnvelope`].
///
/// Event type, aggregate id, aggregate type, version and payload are
/// required. The event id and timestamp default to fresh values.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Serializes `payload` to JSON.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> std::result::Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Uses already-serialized JSON as the payload.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<EventEnvelope> {
        fn require<T>(value: Option<T>, field: &str) -> Result<T> {
            value.ok_or_else(|| EventStoreError::InvalidAppend(format!("{field} is required")))
        }

        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: require(self.event_type, "event_type")?,
            aggregate_id: require(self.aggregate_id, "aggregate_id")?,
            aggregate_type: require(self.aggregate_type, "aggregate_type")?,
            version: require(self.version, "version")?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: require(self.payload, "payload")?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Added {
        product_id: String,
    }

    fn item_added(cart: AggregateId) -> EventEnvelopeBuilder {
        EventEnvelope::builder()
            .event_type("ItemAdded")
            .aggregate_id(cart)
            .aggregate_type("ShoppingCart")
            .version(Version::new(2))
            .payload_raw(serde_json::json!({ "product_id": "prd-1" }))
    }

    #[test]
    fn version_steps_and_rewinds() {
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::first() < Version::new(2));
        assert_eq!(Version::new(6).rewind(2), Version::new(4));
        assert_eq!(Version::new(6).rewind(6), Version::initial());
        assert_eq!(Version::new(1).rewind(3), Version::initial());
        assert_eq!(Version::new(3).to_string(), "v3");
    }

    #[test]
    fn builder_fills_defaults() {
        let cart = AggregateId::new();
        let envelope = item_added(cart)
            .metadata("operation_kind", serde_json::json!("Creation"))
            .build()
            .unwrap();

        assert_eq!(envelope.aggregate_id, cart);
        assert_eq!(envelope.version, Version::new(2));
        assert_eq!(
            envelope.metadata.get("operation_kind"),
            Some(&serde_json::json!("Creation"))
        );
        assert_ne!(envelope.event_id, item_added(cart).build().unwrap().event_id);
    }

    #[test]
    fn build_reports_first_missing_field() {
        let result = EventEnvelope::builder()
            .event_type("ItemAdded")
            .aggregate_id(AggregateId::new())
            .build();

        match result {
            Err(EventStoreError::InvalidAppend(msg)) => assert_eq!(msg, "aggregate_type is required"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn decode_payload() {
        let envelope = item_added(AggregateId::new()).build().unwrap();

        let added: Added = envelope.decode().unwrap();
        assert_eq!(added.product_id, "prd-1");

        let wrong: Result<Vec<u8>> = envelope.decode();
        assert!(matches!(wrong, Err(EventStoreError::Serialization(_))));
    }
}
