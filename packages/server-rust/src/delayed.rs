//! Registry of parked long polls.
//!
//! A request whose content matches the client's baseline is not answered; it
//! is parked here until an activation produces something new, its timeout
//! budget runs out, or the server drains. Every exit path removes the entry
//! from the map first, so exactly one path resolves any given request: the
//! map removal is the race arbiter, and the one-shot latch on the request
//! keeps the same request from being parked twice.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use confab_core::{ApplicationId, ClockSource, ServerConfigRequest, SystemClock};
use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::oneshot;

use crate::guard::ResolutionContext;

/// One parked long poll together with its wakeup channel.
#[derive(Debug)]
pub struct DelayedEntry {
    request: Arc<ServerConfigRequest>,
    context: ResolutionContext,
    enqueued_at_ms: u64,
    expires_at_ms: u64,
    completion: oneshot::Sender<()>,
}

impl DelayedEntry {
    /// The parked request.
    #[must_use]
    pub fn request(&self) -> &Arc<ServerConfigRequest> {
        &self.request
    }

    /// What the request was parked under.
    #[must_use]
    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    /// How long the entry has been parked.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.enqueued_at_ms)
    }

    /// Whether the timeout budget has run out.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Wakes the connection handler waiting on this entry. Call after the
    /// request has been resolved.
    pub fn complete(self) {
        // The receiver is gone when the connection already went away.
        let _ = self.completion.send(());
    }
}

/// Queue depth and age summary for the statistics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedStats {
    /// Number of parked requests.
    pub count: u64,
    /// Mean time parked, in milliseconds.
    pub average_age_ms: u64,
}

impl fmt::Display for DelayedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delayed responses: {} (average age {} ms)",
            self.count, self.average_age_ms
        )
    }
}

/// Concurrent registry of parked long polls.
pub struct DelayedResponses {
    entries: DashMap<u64, DelayedEntry>,
    next_id: AtomicU64,
    clock: Arc<dyn ClockSource>,
}

impl DelayedResponses {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Builds a registry on an injected clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Parks `request` until activation, timeout, or drain. The effective
    /// budget is the request's timeout clamped to `max_timeout_ms`.
    ///
    /// Returns the receiver the connection handler should await, or `None`
    /// when the request was already parked; parking is idempotent and the
    /// first caller keeps the only receiver.
    pub fn delay(
        &self,
        request: Arc<ServerConfigRequest>,
        context: ResolutionContext,
        max_timeout_ms: u64,
    ) -> Option<oneshot::Receiver<()>> {
        if !request.set_delayed_response() {
            tracing::debug!(%request, "request already parked, ignoring duplicate enqueue");
            return None;
        }

        let now = self.clock.now();
        let budget = request.timeout_ms().min(max_timeout_ms);
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            DelayedEntry {
                request,
                context,
                enqueued_at_ms: now,
                expires_at_ms: now + budget,
                completion: tx,
            },
        );
        self.record_depth();
        Some(rx)
    }

    /// Ids of every entry parked under `application`.
    #[must_use]
    pub fn ids_for(&self, application: &ApplicationId) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|entry| entry.value().context.application == *application)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Ids of every parked entry.
    #[must_use]
    pub fn all_ids(&self) -> Vec<u64> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Claims one parked entry. Exactly one caller can win a given id; every
    /// later caller gets `None`.
    pub fn cancel_and_remove(&self, id: u64) -> Option<DelayedEntry> {
        let removed = self.entries.remove(&id).map(|(_, entry)| entry);
        if removed.is_some() {
            self.record_depth();
        }
        removed
    }

    /// Claims every entry whose budget has run out.
    pub fn remove_expired(&self) -> Vec<DelayedEntry> {
        let now = self.clock.now();
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        let mut out = Vec::with_capacity(expired.len());
        for id in expired {
            // An activation may have claimed the entry in the meantime.
            if let Some(entry) = self.cancel_and_remove(id) {
                out.push(entry);
            }
        }
        if !out.is_empty() {
            counter!("confab_delayed_timeouts_total").increment(out.len() as u64);
        }
        out
    }

    /// Claims every parked entry, for shutdown.
    pub fn drain_all(&self) -> Vec<DelayedEntry> {
        let mut out = Vec::with_capacity(self.entries.len());
        for id in self.all_ids() {
            if let Some(entry) = self.cancel_and_remove(id) {
                out.push(entry);
            }
        }
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue depth and mean parked time.
    #[must_use]
    pub fn stats(&self) -> DelayedStats {
        let now = self.clock.now();
        let mut count = 0u64;
        let mut total_age_ms = 0u64;
        for entry in self.entries.iter() {
            count += 1;
            total_age_ms += entry.value().age_ms(now);
        }
        DelayedStats {
            count,
            average_age_ms: if count == 0 { 0 } else { total_age_ms / count },
        }
    }

    fn record_depth(&self) {
        gauge!("confab_delayed_responses").set(self.entries.len() as f64);
    }
}

impl Default for DelayedResponses {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::clock::ManualClock;
    use confab_core::protocol::RequestEnvelope;

    fn parked_request(timeout_ms: u64) -> Arc<ServerConfigRequest> {
        let envelope = RequestEnvelope::parse(
            format!(
                r#"{{"version":3,"defName":"search","defNamespace":"config","clientHostname":"node1","timeoutMs":{timeout_ms}}}"#
            )
            .as_bytes(),
        )
        .unwrap();
        Arc::new(ServerConfigRequest::from_envelope(envelope).unwrap())
    }

    fn context() -> ResolutionContext {
        ResolutionContext {
            application: ApplicationId::new("acme", "music"),
        }
    }

    #[tokio::test]
    async fn delay_parks_and_marks_the_request() {
        let registry = DelayedResponses::new();
        let request = parked_request(5_000);

        let rx = registry.delay(Arc::clone(&request), context(), 60_000);
        assert!(rx.is_some());
        assert!(request.is_delayed_response());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn parking_twice_is_a_no_op() {
        let registry = DelayedResponses::new();
        let request = parked_request(5_000);

        assert!(registry
            .delay(Arc::clone(&request), context(), 60_000)
            .is_some());
        assert!(registry
            .delay(Arc::clone(&request), context(), 60_000)
            .is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn cancel_and_remove_has_a_single_winner() {
        let registry = DelayedResponses::new();
        let _rx = registry.delay(parked_request(5_000), context(), 60_000);
        let id = registry.all_ids()[0];

        assert!(registry.cancel_and_remove(id).is_some());
        assert!(registry.cancel_and_remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn entries_expire_on_their_clamped_budget() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = DelayedResponses::with_clock(clock.clone());

        // Asks for two minutes but the registry clamps to one.
        let _rx = registry.delay(parked_request(120_000), context(), 60_000);

        clock.advance(59_999);
        assert!(registry.remove_expired().is_empty());

        clock.advance(1);
        let expired = registry.remove_expired();
        assert_eq!(expired.len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn completion_wakes_the_waiter() {
        let registry = DelayedResponses::new();
        let rx = registry
            .delay(parked_request(5_000), context(), 60_000)
            .unwrap();
        let id = registry.all_ids()[0];

        let entry = registry.cancel_and_remove(id).unwrap();
        entry.complete();
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn ids_for_filters_by_application() {
        let registry = DelayedResponses::new();
        let _rx1 = registry.delay(parked_request(5_000), context(), 60_000);
        let _rx2 = registry.delay(
            parked_request(5_000),
            ResolutionContext {
                application: ApplicationId::new("acme", "books"),
            },
            60_000,
        );

        let music = registry.ids_for(&ApplicationId::new("acme", "music"));
        assert_eq!(music.len(), 1);
        assert_eq!(registry.all_ids().len(), 2);
    }

    #[tokio::test]
    async fn drain_claims_everything() {
        let registry = DelayedResponses::new();
        let _rx1 = registry.delay(parked_request(5_000), context(), 60_000);
        let _rx2 = registry.delay(parked_request(5_000), context(), 60_000);

        let drained = registry.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn stats_average_the_parked_ages() {
        let clock = Arc::new(ManualClock::new(0));
        let registry = DelayedResponses::with_clock(clock.clone());

        let _rx1 = registry.delay(parked_request(60_000), context(), 60_000);
        clock.advance(1_000);
        let _rx2 = registry.delay(parked_request(60_000), context(), 60_000);
        clock.advance(500);

        // Ages are 1500 and 500: average 1000.
        let stats = registry.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.average_age_ms, 1_000);
        assert_eq!(
            stats.to_string(),
            "delayed responses: 2 (average age 1000 ms)"
        );
    }

    #[tokio::test]
    async fn empty_registry_reports_zero_stats() {
        let registry = DelayedResponses::new();
        let stats = registry.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.average_age_ms, 0);
        assert_eq!(
            stats.to_string(),
            "delayed responses: 0 (average age 0 ms)"
        );
    }
}
