//! Synchronization engine
//!
//! Owns one cache entry per subscribed [`QueryKey`] and decides when each
//! needs fetching. The engine never performs I/O: it hands out
//! [`FetchTicket`]s and the caller reports each outcome back through
//! [`SyncEngine::complete`].
//!
//! Ordering: every ticket carries a sequence number from one monotonic
//! counter. An outcome is recorded only if its sequence number is higher
//! than the last one recorded for that entry, so a slow, older fetch can
//! never overwrite what a newer one already wrote, whatever order the
//! responses arrive in.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::cache::{CacheEntry, CacheRead, FetchError, Payload, RunStates, SubscriptionId};
use super::clock::add;
use super::interval::RefreshInterval;
use super::mutation::Mutation;
use super::query::{QueryKey, QueryPrefix};

/// Why a fetch was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// First subscriber, or a subscriber arriving at a stale entry
    Initial,
    Poll,
    Manual,
    Invalidate,
    /// The session became authenticated
    Resume,
}

/// Permission to fetch one key. Report the outcome with `complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: QueryKey,
    pub seq: u64,
    pub origin: FetchOrigin,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Nobody subscribes to the key any more
    Unsubscribed,
    /// Issued before a suspend, or for an entry since dropped and recreated
    Reset,
    /// A newer fetch for the same key already reported
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Value stored. `follow_up` holds fetches triggered by run state
    /// changes the new value revealed.
    Applied { follow_up: Vec<FetchTicket> },
    /// Error stored next to the previous value
    Failed,
    Discarded(DiscardReason),
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub issued: u64,
    pub applied: u64,
    pub failed: u64,
    pub discarded: u64,
    /// Manual refreshes folded into a fetch already in flight
    pub coalesced: u64,
}

#[derive(Debug, Default)]
pub struct SyncEngine {
    entries: HashMap<QueryKey, CacheEntry>,
    subscriptions: HashMap<SubscriptionId, QueryKey>,
    run_states: RunStates,
    open: bool,
    next_seq: u64,
    next_subscription: u64,
    stats: SyncStats,
}

impl SyncEngine {
    /// A suspended engine; nothing is fetched until [`SyncEngine::resume`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    fn issue(&mut self, key: &QueryKey, origin: FetchOrigin, now: DateTime<Utc>) -> Option<FetchTicket> {
        if !self.open {
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        self.next_seq += 1;
        let seq = self.next_seq;
        entry.issued = seq;
        entry.next_due = entry.interval().period().map(|d| add(now, d));
        self.stats.issued += 1;
        tracing::debug!(key = %key, seq, origin = ?origin, "Fetch issued");
        Some(FetchTicket {
            key: key.clone(),
            seq,
            origin,
            issued_at: now,
        })
    }

    /// Recompute the due time after the subscriber set changed.
    fn reschedule(&mut self, key: &QueryKey, before: RefreshInterval, now: DateTime<Utc>) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        let after = entry.interval();
        if after == before {
            return;
        }
        entry.next_due = after
            .period()
            .map(|d| add(entry.fetched_at.unwrap_or(now), d));
    }

    // === Subscriptions ===

    /// Start watching `key`. The first subscriber of a key (or one arriving
    /// at an entry with nothing usable) gets a ticket for the initial fetch.
    pub fn subscribe(
        &mut self,
        key: QueryKey,
        interval: RefreshInterval,
        now: DateTime<Utc>,
    ) -> (SubscriptionId, Option<FetchTicket>) {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.insert(id, key.clone());

        let floor = self.next_seq;
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(floor));
        let before = entry.interval();
        entry.subscribers.insert(id, interval);
        let needs_fetch = (entry.value.is_none() || entry.stale) && !entry.in_flight();

        self.reschedule(&key, before, now);
        tracing::debug!(key = %key, subscription = id.0, "Subscribed");

        let ticket = if needs_fetch {
            self.issue(&key, FetchOrigin::Initial, now)
        } else {
            None
        };
        (id, ticket)
    }

    /// Stop watching. The last subscriber leaving drops the entry and its
    /// schedule; fetches still out for it are discarded on completion.
    pub fn unsubscribe(&mut self, id: SubscriptionId, now: DateTime<Utc>) -> bool {
        let Some(key) = self.subscriptions.remove(&id) else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        let before = entry.interval();
        entry.subscribers.remove(&id);

        if entry.subscribers.is_empty() {
            self.entries.remove(&key);
            tracing::debug!(key = %key, "Dropped cache entry");
        } else {
            self.reschedule(&key, before, now);
        }
        true
    }

    pub fn set_interval(
        &mut self,
        id: SubscriptionId,
        interval: RefreshInterval,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(key) = self.subscriptions.get(&id).cloned() else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        let before = entry.interval();
        entry.subscribers.insert(id, interval);
        self.reschedule(&key, before, now);
        true
    }

    pub fn is_subscribed(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn subscribed_keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.entries.keys().cloned().collect();
        sort_keys(&mut keys);
        keys
    }

    // === Reads ===

    pub fn get(&self, key: &QueryKey) -> CacheRead<'_> {
        CacheRead::of(self.entries.get(key))
    }

    /// Earliest scheduled poll
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        if !self.open {
            return None;
        }
        self.entries.values().filter_map(|e| e.next_due).min()
    }

    // === Triggers ===

    /// Manual refresh. A fetch already in flight for the key absorbs the
    /// request and no ticket is issued.
    pub fn refresh(&mut self, key: &QueryKey, now: DateTime<Utc>) -> Option<FetchTicket> {
        let entry = self.entries.get(key)?;
        if entry.in_flight() {
            self.stats.coalesced += 1;
            tracing::debug!(key = %key, "Refresh coalesced into in-flight fetch");
            return None;
        }
        self.issue(key, FetchOrigin::Manual, now)
    }

    /// Mark every entry under `prefix` stale and refetch it now, even if a
    /// poll for it is in flight.
    pub fn invalidate(&mut self, prefix: &QueryPrefix, now: DateTime<Utc>) -> Vec<FetchTicket> {
        self.invalidate_matching(std::slice::from_ref(prefix), None, now)
    }

    /// Invalidate exactly what `mutation` affects.
    pub fn apply_mutation(&mut self, mutation: &Mutation, now: DateTime<Utc>) -> Vec<FetchTicket> {
        tracing::info!(mutation = %mutation, "Invalidating after mutation");
        self.invalidate_matching(&mutation.invalidations(), None, now)
    }

    fn invalidate_matching(
        &mut self,
        prefixes: &[QueryPrefix],
        except: Option<&QueryKey>,
        now: DateTime<Utc>,
    ) -> Vec<FetchTicket> {
        let mut keys: Vec<QueryKey> = self
            .entries
            .keys()
            .filter(|k| Some(*k) != except && prefixes.iter().any(|p| k.matches(p)))
            .cloned()
            .collect();
        sort_keys(&mut keys);

        let mut tickets = Vec::new();
        for key in keys {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.stale = true;
            }
            tickets.extend(self.issue(&key, FetchOrigin::Invalidate, now));
        }
        tickets
    }

    /// Poll every entry that is due. An entry whose previous fetch is still
    /// out skips this round and is rescheduled.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<FetchTicket> {
        if !self.open {
            return Vec::new();
        }
        let mut due: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.next_due.is_some_and(|t| t <= now))
            .map(|(k, _)| k.clone())
            .collect();
        sort_keys(&mut due);

        let mut tickets = Vec::new();
        for key in due {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            if entry.in_flight() {
                entry.next_due = entry.interval().period().map(|d| add(now, d));
                continue;
            }
            tickets.extend(self.issue(&key, FetchOrigin::Poll, now));
        }
        tickets
    }

    // === Outcomes ===

    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        outcome: Result<Payload, String>,
        now: DateTime<Utc>,
    ) -> Completion {
        let Some(entry) = self.entries.get_mut(&ticket.key) else {
            return self.discard(ticket, DiscardReason::Unsubscribed);
        };
        if ticket.seq <= entry.floor {
            return self.discard(ticket, DiscardReason::Reset);
        }
        if ticket.seq <= entry.settled {
            return self.discard(ticket, DiscardReason::Superseded);
        }
        entry.settled = ticket.seq;

        let payload = match outcome {
            Ok(payload) => payload,
            Err(message) => {
                tracing::warn!(key = %ticket.key, seq = ticket.seq, error = %message, "Fetch failed");
                entry.error = Some(FetchError { message, at: now });
                self.stats.failed += 1;
                return Completion::Failed;
            }
        };

        let changed = match &payload {
            Payload::Runs(runs) => self.run_states.observe(runs),
            _ => Vec::new(),
        };
        tracing::debug!(key = %ticket.key, seq = ticket.seq, rows = payload.len(), "Fetch applied");
        entry.value = Some(payload);
        entry.fetched_at = Some(now);
        entry.error = None;
        if !entry.in_flight() {
            entry.stale = false;
        }
        self.stats.applied += 1;

        let mut prefixes: Vec<QueryPrefix> = Vec::new();
        for job in changed {
            tracing::debug!(job = %job, seen_in = %ticket.key, "Run state changed");
            for prefix in Mutation::RunStateChanged(job).invalidations() {
                if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }
        }
        let follow_up = if prefixes.is_empty() {
            Vec::new()
        } else {
            self.invalidate_matching(&prefixes, Some(&ticket.key), now)
        };
        Completion::Applied { follow_up }
    }

    fn discard(&mut self, ticket: &FetchTicket, reason: DiscardReason) -> Completion {
        self.stats.discarded += 1;
        tracing::debug!(key = %ticket.key, seq = ticket.seq, reason = ?reason, "Fetch result discarded");
        Completion::Discarded(reason)
    }

    // === Session gate ===

    /// Stop all fetching and forget cached values. Subscriptions survive.
    pub fn suspend(&mut self) {
        self.open = false;
        self.run_states.clear();
        for entry in self.entries.values_mut() {
            entry.reset();
        }
        tracing::info!(entries = self.entries.len(), "Sync suspended");
    }

    /// Reopen and fetch every subscribed entry immediately.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Vec<FetchTicket> {
        self.open = true;
        let keys = self.subscribed_keys();
        tracing::info!(entries = keys.len(), "Sync resumed");
        keys.iter()
            .filter_map(|key| self.issue(key, FetchOrigin::Resume, now))
            .collect()
    }
}

fn sort_keys(keys: &mut [QueryKey]) {
    keys.sort_by_cached_key(|k| k.path());
}
