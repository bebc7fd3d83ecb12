//! Outstanding requests keyed by `message_id`.

use std::time::{Duration, Instant};

use {dashmap::DashMap, switchyard_protocol::Envelope, tokio::sync::oneshot};

use crate::error::{Error, Result};

/// A caller waiting for the terminal envelope of one message.
struct PendingEntry {
    /// Taken when the entry is cancelled, which wakes the waiter.
    sender: Option<oneshot::Sender<Envelope>>,
    /// Streaming connection that submitted the request.
    owner: Option<String>,
    cancelled_at: Option<Instant>,
}

/// What became of a terminal envelope handed to [`CorrelationTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Delivered,
    /// The caller went away before the mesh finished.
    Cancelled,
    /// No entry: the deadline already passed, or this is a duplicate.
    Unknown,
    /// The entry existed but its waiter was already gone.
    Abandoned,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Sharded map of correlation entries.
///
/// Cancelled entries linger for `cancelled_ttl` so a late terminal envelope
/// is recognised as cancelled rather than unknown.
pub struct CorrelationTable {
    entries: DashMap<String, PendingEntry>,
    cancelled_ttl: Duration,
}

impl CorrelationTable {
    pub fn new(cancelled_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cancelled_ttl,
        }
    }

    /// Open an entry for `message_id`. The receiver yields the terminal
    /// envelope, or an error once the entry is cancelled.
    pub fn register(
        &self,
        message_id: &str,
        owner: Option<&str>,
    ) -> Result<oneshot::Receiver<Envelope>> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(message_id.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateCorrelation(message_id.to_string())),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingEntry {
                    sender: Some(tx),
                    owner: owner.map(str::to_string),
                    cancelled_at: None,
                });
                Ok(rx)
            },
        }
    }

    /// Hand a terminal envelope to its waiter. The entry is removed whatever
    /// the outcome.
    pub fn resolve(&self, envelope: Envelope) -> Resolution {
        let Some((_, entry)) = self.entries.remove(&envelope.message_id) else {
            return Resolution::Unknown;
        };
        if entry.cancelled_at.is_some() {
            return Resolution::Cancelled;
        }
        match entry.sender.map(|tx| tx.send(envelope)) {
            Some(Ok(())) => Resolution::Delivered,
            _ => Resolution::Abandoned,
        }
    }

    /// Mark the entry cancelled. Returns false if it was unknown or already
    /// cancelled.
    pub fn cancel(&self, message_id: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(message_id) else {
            return false;
        };
        if entry.cancelled_at.is_some() {
            return false;
        }
        entry.cancelled_at = Some(Instant::now());
        entry.sender = None;
        true
    }

    /// Cancel every live entry submitted by `owner`, returning their ids.
    pub fn cancel_owned_by(&self, owner: &str) -> Vec<String> {
        let mut cancelled = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.cancelled_at.is_none() && entry.owner.as_deref() == Some(owner) {
                entry.cancelled_at = Some(Instant::now());
                entry.sender = None;
                cancelled.push(entry.key().clone());
            }
        }
        cancelled
    }

    /// Drop the entry outright, e.g. when its deadline passes.
    pub fn remove(&self, message_id: &str) -> bool {
        self.entries.remove(message_id).is_some()
    }

    /// Drop cancelled entries older than the TTL. Returns how many went.
    pub fn purge_cancelled(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.cancelled_ttl;
        self.entries
            .retain(|_, e| e.cancelled_at.is_none_or(|at| at.elapsed() < ttl));
        before.saturating_sub(self.entries.len())
    }

    /// All entries, cancelled ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a caller is still waiting on `message_id`.
    pub fn is_pending(&self, message_id: &str) -> bool {
        self.entries
            .get(message_id)
            .is_some_and(|e| e.cancelled_at.is_none())
    }

    /// Entries still waiting for a response.
    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.cancelled_at.is_none())
            .count()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        switchyard_protocol::{Origin, Payload, Route},
    };

    fn envelope() -> Envelope {
        Envelope::new(
            Route::new(vec!["drafting-stage".into()], None),
            Payload::new("hi", "c", "s"),
            Origin::Http,
        )
    }

    fn table() -> CorrelationTable {
        CorrelationTable::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn resolve_wakes_the_waiter_once() {
        let table = table();
        let env = envelope();
        let rx = table.register(&env.message_id, None).unwrap();
        assert_eq!(table.pending(), 1);

        assert_eq!(table.resolve(env.clone()), Resolution::Delivered);
        assert_eq!(rx.await.unwrap(), env);
        assert!(table.is_empty());

        // Duplicate delivery after resolution.
        assert_eq!(table.resolve(env), Resolution::Unknown);
    }

    #[test]
    fn one_entry_per_message_id() {
        let table = table();
        let _rx = table.register("m-1", None).unwrap();
        assert!(matches!(
            table.register("m-1", None),
            Err(Error::DuplicateCorrelation(id)) if id == "m-1"
        ));
    }

    #[tokio::test]
    async fn cancelled_entry_discards_late_delivery() {
        let table = table();
        let env = envelope();
        let rx = table.register(&env.message_id, None).unwrap();

        assert!(table.cancel(&env.message_id));
        assert!(!table.cancel(&env.message_id));
        assert!(rx.await.is_err());
        assert_eq!(table.pending(), 0);
        assert_eq!(table.len(), 1);

        assert_eq!(table.resolve(env), Resolution::Cancelled);
        assert!(table.is_empty());
    }

    #[test]
    fn dropped_waiter_is_abandoned() {
        let table = table();
        let env = envelope();
        drop(table.register(&env.message_id, None).unwrap());
        assert_eq!(table.resolve(env), Resolution::Abandoned);
    }

    #[test]
    fn owner_cancellation_only_touches_its_entries() {
        let table = table();
        let _a = table.register("a", Some("conn-1")).unwrap();
        let _b = table.register("b", Some("conn-1")).unwrap();
        let _c = table.register("c", Some("conn-2")).unwrap();
        let _d = table.register("d", None).unwrap();

        let mut cancelled = table.cancel_owned_by("conn-1");
        cancelled.sort();
        assert_eq!(cancelled, vec!["a", "b"]);
        assert_eq!(table.pending(), 2);
        assert!(table.cancel_owned_by("conn-1").is_empty());
    }

    #[test]
    fn purge_drops_only_expired_cancellations() {
        let table = CorrelationTable::new(Duration::ZERO);
        let _a = table.register("a", None).unwrap();
        let _b = table.register("b", None).unwrap();
        table.cancel("a");
        assert_eq!(table.purge_cancelled(), 1);
        assert_eq!(table.len(), 1);
        assert!(table.remove("b"));
        assert!(!table.remove("b"));
    }
}
