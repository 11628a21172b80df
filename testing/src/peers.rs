//! Peer lookup stubs with failure and latency injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use agora_core::model::{Media, UserSummary};
use agora_core::peers::{MediaLookup, PeerError, UserLookup};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Default)]
struct StubState<T> {
    records: HashMap<String, T>,
    failing: bool,
    poisoned: HashSet<String>,
    delay: Option<Duration>,
    requests: Vec<Vec<String>>,
}

#[derive(Debug)]
struct Stub<T> {
    peer: &'static str,
    state: RwLock<StubState<T>>,
    calls: AtomicUsize,
}

impl<T: Clone + Send + Sync> Stub<T> {
    fn new(peer: &'static str) -> Self {
        Self {
            peer,
            state: RwLock::new(StubState {
                records: HashMap::new(),
                failing: false,
                poisoned: HashSet::new(),
                delay: None,
                requests: Vec::new(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    async fn lookup(&self, ids: &[String]) -> Result<HashMap<String, T>, PeerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, failing) = {
            let mut state = self.state.write().unwrap();
            state.requests.push(ids.to_vec());
            let poisoned = ids.iter().any(|id| state.poisoned.contains(id));
            (state.delay, state.failing || poisoned)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(PeerError::Unavailable {
                peer: self.peer.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let state = self.state.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}

macro_rules! stub_controls {
    ($name:ident, $record:ty) => {
        impl $name {
            /// Make every lookup fail (`true`) or succeed (`false`).
            pub fn set_failing(&self, failing: bool) {
                self.inner.state.write().unwrap().failing = failing;
            }

            /// Fail any lookup whose batch carries `id`.
            pub fn fail_batches_with(&self, id: &str) {
                self.inner.state.write().unwrap().poisoned.insert(id.to_string());
            }

            /// Delay every lookup, to exercise caller timeouts.
            pub fn set_delay(&self, delay: Option<Duration>) {
                self.inner.state.write().unwrap().delay = delay;
            }

            /// Number of lookups made.
            #[must_use]
            pub fn calls(&self) -> usize {
                self.inner.calls.load(Ordering::SeqCst)
            }

            /// Id lists of every lookup, in call order.
            #[must_use]
            pub fn requests(&self) -> Vec<Vec<String>> {
                self.inner.state.read().unwrap().requests.clone()
            }

            fn put(&self, id: String, record: $record) {
                self.inner.state.write().unwrap().records.insert(id, record);
            }
        }
    };
}

/// Stub identity-service lookup.
#[derive(Clone, Debug)]
pub struct StubUserLookup {
    inner: Arc<Stub<UserSummary>>,
}

impl Default for StubUserLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl StubUserLookup {
    /// Stub that knows no users.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Stub::new("identity-service")),
        }
    }

    /// Register a user the stub resolves.
    pub fn insert(&self, user: UserSummary) {
        self.put(user.id.clone(), user);
    }
}

stub_controls!(StubUserLookup, UserSummary);

impl UserLookup for StubUserLookup {
    fn users_by_ids<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, UserSummary>, PeerError>> {
        Box::pin(self.inner.lookup(ids))
    }
}

/// Stub media-service lookup.
#[derive(Clone, Debug)]
pub struct StubMediaLookup {
    inner: Arc<Stub<Media>>,
}

impl Default for StubMediaLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl StubMediaLookup {
    /// Stub that knows no media.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Stub::new("media-service")),
        }
    }

    /// Register media the stub resolves.
    pub fn insert(&self, media: Media) {
        self.put(media.id.clone(), media);
    }
}

stub_controls!(StubMediaLookup, Media);

impl MediaLookup for StubMediaLookup {
    fn media_by_ids<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Media>, PeerError>> {
        Box::pin(self.inner.lookup(ids))
    }
}
