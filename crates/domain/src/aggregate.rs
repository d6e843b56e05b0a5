//! Core aggregate and domain event traits.

use std::borrow::Borrow;

use common::{AggregateId, AuditStamp, Lifetime};
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable, named in past tense, and carry the audit stamp of
/// the operation that produced them.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone + std::fmt::Debug {
    /// Every event type name this event family can produce.
    ///
    /// Stored events whose type is not listed here are refused on load.
    fn event_types() -> &'static [&'static str];

    /// Returns the event type name.
    ///
    /// This is used for serialization and event store filtering.
    fn event_type(&self) -> &'static str;

    /// Returns the audit stamp of the operation behind this event.
    fn operation(&self) -> &AuditStamp;
}

/// Bookkeeping shared by every event-sourced aggregate.
///
/// Holds the events recorded since the last flush, the version counter and
/// the provenance slots. Concrete aggregates embed one and expose it through
/// [`Aggregate::root`] / [`Aggregate::root_mut`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRoot<E> {
    pending_events: Vec<E>,
    version: Version,
    creation: Option<AuditStamp>,
    last_mutation: Option<AuditStamp>,
    lifetime: Option<Lifetime>,
}

impl<E> Default for AggregateRoot<E> {
    fn default() -> Self {
        Self {
            pending_events: Vec::new(),
            version: Version::initial(),
            creation: None,
            last_mutation: None,
            lifetime: None,
        }
    }
}

impl<E> AggregateRoot<E> {
    /// Returns the number of events applied since the last reset.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the events recorded but not yet flushed, oldest first.
    pub fn pending_events(&self) -> &[E] {
        &self.pending_events
    }

    /// Returns the operation that established the aggregate's identity.
    pub fn creation(&self) -> Option<&AuditStamp> {
        self.creation.as_ref()
    }

    /// Returns the operation behind the latest state change after creation.
    pub fn last_mutation(&self) -> Option<&AuditStamp> {
        self.last_mutation.as_ref()
    }

    /// Returns the lifetime window, open-ended from the creation instant.
    pub fn lifetime(&self) -> Option<&Lifetime> {
        self.lifetime.as_ref()
    }

    /// Records the creation stamp. Only the identity-establishing event calls this.
    pub fn record_creation(&mut self, stamp: &AuditStamp) {
        self.lifetime = Some(Lifetime::starting_at(stamp.instant()));
        self.creation = Some(stamp.clone());
    }

    /// Records the stamp of a state-changing event.
    pub fn record_mutation(&mut self, stamp: &AuditStamp) {
        self.last_mutation = Some(stamp.clone());
    }

    fn advance(&mut self) {
        self.version = self.version.next();
    }
}

/// Error raised when a stored event cannot be applied during replay.
#[derive(Debug, Error)]
#[error("replay failed at event #{position}: {source}")]
pub struct ReplayError<E: std::error::Error + 'static> {
    /// Zero-based position of the offending event in the replayed sequence.
    pub position: usize,

    /// What the aggregate reported.
    #[source]
    pub source: E,
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate derives its state solely from the ordered events applied to
/// it. The provided methods implement recording, replay and flushing on top
/// of [`Aggregate::apply`]:
/// - `apply_change` is the only way a fresh event enters the aggregate
/// - `replay` rebuilds state from a persisted stream without recording
/// - `flush` forgets pending events once they have been persisted
pub trait Aggregate: Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    ///
    /// Used for event store organization and routing.
    fn aggregate_type() -> &'static str;

    /// Returns the stream key of the aggregate.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn aggregate_id(&self) -> Option<AggregateId>;

    /// Returns the embedded root bookkeeping.
    fn root(&self) -> &AggregateRoot<Self::Event>;

    /// Returns the embedded root bookkeeping, mutably.
    fn root_mut(&mut self) -> &mut AggregateRoot<Self::Event>;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and free of I/O, randomness and clock reads.
    /// An event that does not fit the current state is rejected before any
    /// field is touched, so a failed apply leaves the aggregate unchanged.
    fn apply(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Returns the current version of the aggregate.
    fn version(&self) -> Version {
        self.root().version()
    }

    /// Returns the events recorded since the last flush.
    fn pending_events(&self) -> &[Self::Event] {
        self.root().pending_events()
    }

    /// Applies a freshly produced event, records it and bumps the version.
    fn apply_change(&mut self, event: Self::Event) -> Result<(), Self::Error> {
        self.apply(&event)?;
        let root = self.root_mut();
        root.pending_events.push(event);
        root.advance();
        Ok(())
    }

    /// Rebuilds state from a persisted event sequence.
    ///
    /// Resets the version to zero and applies every event in order without
    /// recording it. Stops at the first event the aggregate rejects; the
    /// aggregate is then only partially rebuilt and should be discarded.
    fn replay<I>(&mut self, events: I) -> Result<(), ReplayError<Self::Error>>
    where
        I: IntoIterator,
        I::Item: Borrow<Self::Event>,
    {
        self.root_mut().version = Version::initial();
        for (position, event) in events.into_iter().enumerate() {
            self.apply(event.borrow())
                .map_err(|source| ReplayError { position, source })?;
            self.root_mut().advance();
        }
        tracing::debug!(
            aggregate_type = Self::aggregate_type(),
            version = %self.version(),
            "aggregate replayed"
        );
        Ok(())
    }

    /// Drops the pending events without touching version or state.
    fn flush(&mut self) {
        self.root_mut().pending_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{OperationContext, OperationKind};
    use serde::{Deserialize, Serialize};

    fn stamp(kind: OperationKind, minute: u32) -> AuditStamp {
        AuditStamp::new(
            kind,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap(),
            OperationContext::new().shared(),
        )
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { operation: AuditStamp },
        Counted { operation: AuditStamp, amount: i32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_types() -> &'static [&'static str] {
            &["TallyOpened", "TallyCounted"]
        }

        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Counted { .. } => "TallyCounted",
            }
        }

        fn operation(&self) -> &AuditStamp {
            match self {
                TallyEvent::Opened { operation } | TallyEvent::Counted { operation, .. } => {
                    operation
                }
            }
        }
    }

    #[derive(Debug, Error)]
    #[error("tally rejected amount {0}")]
    struct NegativeAmount(i32);

    #[derive(Debug, Default)]
    struct Tally {
        root: AggregateRoot<TallyEvent>,
        id: Option<AggregateId>,
        total: i32,
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = NegativeAmount;

        fn aggregate_type() -> &'static str {
            "Tally"
        }

        fn aggregate_id(&self) -> Option<AggregateId> {
            self.id
        }

        fn root(&self) -> &AggregateRoot<TallyEvent> {
            &self.root
        }

        fn root_mut(&mut self) -> &mut AggregateRoot<TallyEvent> {
            &mut self.root
        }

        fn apply(&mut self, event: &TallyEvent) -> Result<(), NegativeAmount> {
            match event {
                TallyEvent::Opened { operation } => {
                    self.id = Some(AggregateId::from_uuid(uuid::Uuid::nil()));
                    self.root.record_creation(operation);
                }
                TallyEvent::Counted { operation, amount } => {
                    if *amount < 0 {
                        return Err(NegativeAmount(*amount));
                    }
                    self.total += amount;
                    self.root.record_mutation(operation);
                }
            }
            Ok(())
        }
    }

    fn counted(amount: i32, minute: u32) -> TallyEvent {
        TallyEvent::Counted {
            operation: stamp(OperationKind::Mutation, minute),
            amount,
        }
    }

    fn opened() -> TallyEvent {
        TallyEvent::Opened {
            operation: stamp(OperationKind::Creation, 0),
        }
    }

    #[test]
    fn apply_change_records_and_versions() {
        let mut tally = Tally::default();

        tally.apply_change(opened()).unwrap();
        tally.apply_change(counted(2, 1)).unwrap();
        tally.apply_change(counted(3, 2)).unwrap();

        assert_eq!(tally.total, 5);
        assert_eq!(tally.version(), Version::new(3));
        assert_eq!(tally.pending_events().len(), 3);
        assert_eq!(tally.pending_events()[1].event_type(), "TallyCounted");
    }

    #[test]
    fn rejected_event_leaves_no_trace() {
        let mut tally = Tally::default();
        tally.apply_change(opened()).unwrap();

        let result = tally.apply_change(counted(-1, 1));

        assert!(result.is_err());
        assert_eq!(tally.version(), Version::first());
        assert_eq!(tally.pending_events().len(), 1);
        assert_eq!(tally.total, 0);
    }

    #[test]
    fn audit_slots_follow_applied_events() {
        let mut tally = Tally::default();
        assert!(tally.root().creation().is_none());
        assert!(tally.root().lifetime().is_none());

        tally.apply_change(opened()).unwrap();
        assert!(tally.root().last_mutation().is_none());
        let created_at = tally.root().creation().unwrap().instant();
        assert_eq!(tally.root().lifetime().unwrap().start(), created_at);

        tally.apply_change(counted(1, 7)).unwrap();
        let mutation = tally.root().last_mutation().unwrap();
        assert_eq!(mutation.kind(), OperationKind::Mutation);
        assert_eq!(mutation.instant(), stamp(OperationKind::Mutation, 7).instant());
    }

    #[test]
    fn replay_matches_live_application_without_pending_events() {
        let mut live = Tally::default();
        live.apply_change(opened()).unwrap();
        live.apply_change(counted(4, 1)).unwrap();
        live.apply_change(counted(6, 2)).unwrap();

        let mut rebuilt = Tally::default();
        rebuilt.replay(live.pending_events()).unwrap();

        assert_eq!(rebuilt.total, live.total);
        assert_eq!(rebuilt.version(), live.version());
        assert_eq!(rebuilt.root().creation(), live.root().creation());
        assert_eq!(rebuilt.root().last_mutation(), live.root().last_mutation());
        assert!(rebuilt.pending_events().is_empty());
    }

    #[test]
    fn replay_resets_version_first() {
        let mut tally = Tally::default();
        tally.apply_change(opened()).unwrap();
        tally.apply_change(counted(1, 1)).unwrap();

        tally.replay(vec![counted(2, 2)]).unwrap();

        assert_eq!(tally.version(), Version::first());
        assert_eq!(tally.total, 3);
        assert_eq!(tally.pending_events().len(), 2);
    }

    #[test]
    fn replay_reports_failing_position() {
        let mut tally = Tally::default();

        let err = tally
            .replay(vec![opened(), counted(1, 1), counted(-5, 2), counted(1, 3)])
            .unwrap_err();

        assert_eq!(err.position, 2);
        assert_eq!(err.source.0, -5);
        assert_eq!(tally.version(), Version::new(2));
    }

    #[test]
    fn flush_is_idempotent() {
        let mut tally = Tally::default();
        tally.apply_change(opened()).unwrap();
        tally.apply_change(counted(9, 1)).unwrap();

        tally.flush();
        tally.flush();

        assert!(tally.pending_events().is_empty());
        assert_eq!(tally.version(), Version::new(2));
        assert_eq!(tally.total, 9);
    }

    #[test]
    fn event_metadata() {
        let event = counted(1, 4);
        assert_eq!(event.event_type(), "TallyCounted");
        assert_eq!(event.operation().kind(), OperationKind::Mutation);
        assert!(TallyEvent::event_types().contains(&"TallyOpened"));
    }
}
