//! Audit stamps: who did what, when, and in which context.
//!
//! Every domain event carries an [`AuditStamp`] obtained from an
//! [`OperationContextProvider`]. The context itself is opaque to the
//! aggregates; they copy the shared reference and never mutate it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Kind of operation an audit stamp records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationKind {
    /// No operation took place.
    #[default]
    Void,
    /// The entity was initialized automatically by the system.
    Initialization,
    /// The entity (or a part of it) was created by a user.
    Creation,
    /// The entity was modified by a user.
    Mutation,
    /// The entity was synchronized from an external source.
    Synchronization,
    /// The entity was marked as deleted but kept.
    SoftDeletion,
    /// The entity was removed for good.
    HardDeletion,
    /// A soft-deleted entity was brought back with a new lifetime.
    Restoration,
}

impl OperationKind {
    /// Returns the operation kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Void => "Void",
            OperationKind::Initialization => "Initialization",
            OperationKind::Creation => "Creation",
            OperationKind::Mutation => "Mutation",
            OperationKind::Synchronization => "Synchronization",
            OperationKind::SoftDeletion => "SoftDeletion",
            OperationKind::HardDeletion => "HardDeletion",
            OperationKind::Restoration => "Restoration",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context in which an operation was executed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// The user who performed the operation.
    pub user_id: Option<String>,

    /// Display alias of the user.
    pub user_alias: Option<String>,

    /// The account the user acted through.
    pub account_id: Option<String>,

    /// Email of that account.
    pub account_email: Option<String>,

    /// Free-form additional details (application, device, origin...).
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl OperationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the acting user.
    pub fn with_user(mut self, user_id: impl Into<String>, alias: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_alias = Some(alias.into());
        self
    }

    /// Sets the acting account.
    pub fn with_account(mut self, account_id: impl Into<String>, email: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self.account_email = Some(email.into());
        self
    }

    /// Adds a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Wraps the context for sharing between stamps.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Immutable record of an operation: its kind, its instant and its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStamp {
    kind: OperationKind,
    instant: DateTime<Utc>,
    context: Arc<OperationContext>,
}

impl AuditStamp {
    /// Creates a new audit stamp.
    pub fn new(kind: OperationKind, instant: DateTime<Utc>, context: Arc<OperationContext>) -> Self {
        Self {
            kind,
            instant,
            context,
        }
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns when the operation happened.
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// Returns the operation context.
    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Time elapsed between the operation and `target`.
    pub fn elapsed_since(&self, target: DateTime<Utc>) -> Duration {
        target - self.instant
    }

    /// Time remaining from `target` until the operation instant.
    pub fn remaining_until(&self, target: DateTime<Utc>) -> Duration {
        self.instant - target
    }
}

impl std::fmt::Display for AuditStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.kind, self.instant.to_rfc3339())?;
        if let Some(user) = &self.context.user_id {
            write!(f, " by {user}")?;
        }
        Ok(())
    }
}

/// Window during which an entity is alive.
///
/// An absent `end` means the entity has not been retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

impl Lifetime {
    /// Creates an open-ended lifetime starting at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// Creates a bounded lifetime.
    pub fn bounded(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Returns the start of the lifetime.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end of the lifetime, if any.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Returns the duration of a bounded lifetime.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Returns true if `at` falls inside the lifetime.
    pub fn is_alive(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.is_none_or(|end| at <= end)
    }
}

/// Source of audit stamps for command methods.
///
/// Implementations resolve the context of the current caller (an HTTP
/// request, a CLI user, a background job).
pub trait OperationContextProvider: Send + Sync {
    /// Returns the context attached to new stamps.
    fn context(&self) -> Arc<OperationContext>;

    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Creates a stamp of the given kind at the current instant.
    fn create_operation(&self, kind: OperationKind) -> AuditStamp {
        AuditStamp::new(kind, self.now(), self.context())
    }
}

impl OperationContextProvider for Arc<OperationContext> {
    fn context(&self) -> Arc<OperationContext> {
        Arc::clone(self)
    }
}

/// Provider whose clock is pinned to a fixed instant.
#[derive(Debug, Clone)]
pub struct FixedClockProvider {
    context: Arc<OperationContext>,
    instant: DateTime<Utc>,
}

impl FixedClockProvider {
    /// Creates a provider stamping every operation at `instant`.
    pub fn new(context: Arc<OperationContext>, instant: DateTime<Utc>) -> Self {
        Self { context, instant }
    }
}

impl OperationContextProvider for FixedClockProvider {
    fn context(&self) -> Arc<OperationContext> {
        Arc::clone(&self.context)
    }

    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn fixed_clock_provider_stamps_requested_kind() {
        let context = OperationContext::new().with_user("u-1", "alice").shared();
        let provider = FixedClockProvider::new(context, instant(10));

        let stamp = provider.create_operation(OperationKind::Mutation);

        assert_eq!(stamp.kind(), OperationKind::Mutation);
        assert_eq!(stamp.instant(), instant(10));
        assert_eq!(stamp.context().user_alias.as_deref(), Some("alice"));
    }

    #[test]
    fn shared_context_provider_reuses_the_same_context() {
        let context = OperationContext::new().with_account("acc-1", "a@example.com").shared();

        let first = context.create_operation(OperationKind::Creation);
        let second = context.create_operation(OperationKind::Mutation);

        assert_eq!(first.context(), second.context());
        assert!(first.instant() <= second.instant());
    }

    #[test]
    fn stamp_elapsed_and_remaining_time() {
        let stamp = AuditStamp::new(OperationKind::Creation, instant(10), OperationContext::new().shared());

        assert_eq!(stamp.elapsed_since(instant(12)), Duration::hours(2));
        assert_eq!(stamp.remaining_until(instant(7)), Duration::hours(3));
    }

    #[test]
    fn stamp_display_includes_kind_and_user() {
        let context = OperationContext::new().with_user("u-9", "bob").shared();
        let stamp = AuditStamp::new(OperationKind::Creation, instant(10), context);

        let rendered = stamp.to_string();
        assert!(rendered.starts_with("Creation @ 2024-03-01T10:00:00"));
        assert!(rendered.ends_with("by u-9"));
    }

    #[test]
    fn open_lifetime_is_alive_after_start() {
        let lifetime = Lifetime::starting_at(instant(10));

        assert!(!lifetime.is_alive(instant(9)));
        assert!(lifetime.is_alive(instant(10)));
        assert!(lifetime.is_alive(instant(23)));
        assert_eq!(lifetime.duration(), None);
    }

    #[test]
    fn bounded_lifetime_ends() {
        let lifetime = Lifetime::bounded(instant(10), instant(12));

        assert!(lifetime.is_alive(instant(12)));
        assert!(!lifetime.is_alive(instant(13)));
        assert_eq!(lifetime.duration(), Some(Duration::hours(2)));
    }

    #[test]
    fn stamp_serialization_roundtrip() {
        let context = OperationContext::new()
            .with_user("u-1", "alice")
            .with_detail("application", serde_json::json!("storefront"))
            .shared();
        let stamp = AuditStamp::new(OperationKind::Creation, instant(8), context);

        let json = serde_json::to_string(&stamp).unwrap();
        let restored: AuditStamp = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, stamp);
    }
}
