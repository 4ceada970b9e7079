use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::{
    auth::{jwt::hash_token, types::TokenPair},
    edge::gateway::AuthGateway,
    error::AppError,
};

pub type Flight<T> = Shared<BoxFuture<'static, Option<T>>>;

type Slots<K, T> = Arc<Mutex<HashMap<K, Flight<T>>>>;

/// Deduplicates concurrent work per key. Callers arriving while a flight for
/// their key is running await the same future and receive a clone of its
/// output. The work runs on its own task, so it finishes and frees its slot
/// even when every caller has gone away. A flight whose task panicked
/// resolves to `None`.
pub struct SingleFlight<K, T>
where
    T: Clone,
{
    inflight: Slots<K, T>,
}

impl<K, T> Default for SingleFlight<K, T>
where
    T: Clone,
{
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the flight for `key`, spawning `start` when none is running.
    /// The flag is `true` for the caller that started it. Must be called
    /// within a tokio runtime.
    pub fn try_acquire_or_join<F, Fut>(&self, key: K, start: F) -> (Flight<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut inflight = lock(&self.inflight);
        if let Some(existing) = inflight.get(&key) {
            return (existing.clone(), false);
        }

        let slot = SlotRelease {
            slots: Arc::clone(&self.inflight),
            key: Some(key.clone()),
        };
        let work = start();
        let handle = tokio::spawn(async move {
            let _slot = slot;
            work.await
        });
        let flight = async move {
            match handle.await {
                Ok(output) => Some(output),
                Err(err) => {
                    tracing::error!(error = %err, "single-flight task failed");
                    None
                }
            }
        }
        .boxed()
        .shared();

        inflight.insert(key, flight.clone());
        (flight, true)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }
}

/// Removes its key from the slot map when the spawned task ends, including
/// by panic.
struct SlotRelease<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    slots: Slots<K, T>,
    key: Option<K>,
}

impl<K, T> Drop for SlotRelease<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.slots).remove(&key);
        }
    }
}

fn lock<K, T: Clone>(
    map: &Mutex<HashMap<K, Flight<T>>>,
) -> MutexGuard<'_, HashMap<K, Flight<T>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collapses concurrent rotations of the same refresh token into one call to
/// the auth gateway.
pub struct RefreshCoordinator {
    flights: SingleFlight<String, Result<TokenPair, AppError>>,
    gateway: Arc<dyn AuthGateway>,
    timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(gateway: Arc<dyn AuthGateway>, timeout: Duration) -> Self {
        Self {
            flights: SingleFlight::new(),
            gateway,
            timeout,
        }
    }

    pub async fn ensure_refreshed(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let gateway = Arc::clone(&self.gateway);
        let token = refresh_token.to_string();
        let timeout = self.timeout;

        let (flight, leader) = self
            .flights
            .try_acquire_or_join(hash_token(refresh_token), move || async move {
                match tokio::time::timeout(timeout, gateway.rotate(&token)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            timeout_ms = timeout.as_millis() as u64,
                            "token refresh timed out"
                        );
                        Err(AppError::upstream("Token refresh timed out"))
                    }
                }
            });
        if !leader {
            tracing::debug!("joined in-flight token refresh");
        }
        flight
            .await
            .unwrap_or_else(|| Err(AppError::internal("Token refresh failed")))
    }

    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }
}
