use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use serde_json::Value;
use tokio::sync::Mutex;

use super::client::{ExchangeClient, ExchangeCredentials};

/// Stable hash over `(use_testnet, api_key, secret, passphrase,
/// extra_config)`, matching the original's
/// `hashlib.sha256(json.dumps(..., sort_keys=True))` dedup key (spec.md
/// §4.2 "Session cache").
pub fn fingerprint(credentials: &ExchangeCredentials) -> String {
    let canonical = serde_json::json!({
        "use_testnet": credentials.use_testnet,
        "api_key": credentials.api_key,
        "secret": credentials.secret,
        "passphrase": credentials.passphrase,
        "extra_config": credentials.extra_config,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&canonical).as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys.into_iter().map(|k| format!("{k:?}:{}", canonical_json(&map[k]))).collect();
            format!("{{{}}}", entries.join(","))
        }
        Value::Array(items) => format!("[{}]", items.iter().map(canonical_json).collect::<Vec<_>>().join(",")),
        other => other.to_string(),
    }
}

struct SessionEntry {
    handle: Arc<dyn ExchangeClient>,
    fingerprint: String,
    last_used_at: Instant,
}

/// Keyed by `(engine.exchange_id, session_key)`; a per-key lock serializes
/// creation and reuse (spec.md §4.2). Only streaming-engine (`ccxtpro`)
/// sessions are persistent — REST sessions are built, used once, and
/// closed, never entering this cache (spec.md §2 item 2, §4.2).
pub struct SessionCache {
    entries: DashMap<String, Arc<Mutex<Option<SessionEntry>>>>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns a cached handle if present and fingerprint-matching,
    /// otherwise builds a fresh one via `build`. On fingerprint mismatch the
    /// stale entry is discarded and rebuilt (spec.md §4.2 "if the
    /// fingerprint differs, the cached session is closed and rebuilt").
    pub async fn get_or_build<F, Fut>(
        &self,
        key: &str,
        credentials: &ExchangeCredentials,
        build: F,
    ) -> Result<Arc<dyn ExchangeClient>, crate::error::AdapterError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<dyn ExchangeClient>, crate::error::AdapterError>>,
    {
        let slot = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut guard = slot.lock().await;
        let wanted_fingerprint = fingerprint(credentials);
        if let Some(entry) = guard.as_ref() {
            if entry.fingerprint == wanted_fingerprint {
                let handle = entry.handle.clone();
                drop(guard);
                self.touch(&slot).await;
                return Ok(handle);
            }
        }
        // On exception building the new handle, the stale entry stays
        // discarded rather than reinstated (spec.md §4.2 "On exception, the
        // session is discarded").
        *guard = None;
        let handle = build().await?;
        *guard = Some(SessionEntry {
            handle: handle.clone(),
            fingerprint: wanted_fingerprint,
            last_used_at: Instant::now(),
        });
        Ok(handle)
    }

    async fn touch(&self, slot: &Arc<Mutex<Option<SessionEntry>>>) {
        if let Some(entry) = slot.lock().await.as_mut() {
            entry.last_used_at = Instant::now();
        }
    }

    /// Evicts entries idle past `session_ttl_seconds`. Invoked on every
    /// entry rather than on a separate timer task (spec.md §4.2 "A
    /// background sweep (on every entry) evicts entries older than
    /// session_ttl_seconds").
    pub async fn sweep_expired(&self) {
        let mut expired = Vec::new();
        for entry in self.entries.iter() {
            let slot = entry.value().clone();
            let guard = slot.lock().await;
            if let Some(session) = guard.as_ref() {
                if session.last_used_at.elapsed() > self.ttl {
                    expired.push(entry.key().clone());
                }
            }
        }
        for key in expired {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use async_trait::async_trait;

    struct StubClient(u32);

    #[async_trait]
    impl ExchangeClient for StubClient {
        async fn call(&self, _method: &str, _args: Vec<Value>, _kwargs: Value) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn create_order(
            &self,
            _s: &str,
            _side: &str,
            _t: &str,
            _qty: Value,
            _price: Option<Value>,
            _params: Value,
        ) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn cancel_order(&self, _id: &str, _symbol: &str, _params: Value) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn edit_order(
            &self,
            _id: &str,
            _symbol: &str,
            _order_type: &str,
            _side: &str,
            _qty: Value,
            _price: Option<Value>,
            _params: Value,
        ) -> Result<Option<Value>, AdapterError> {
            Ok(None)
        }
        async fn fetch_my_trades(&self, _symbol: Option<&str>, _since: i64, _limit: u32) -> Result<Vec<Value>, AdapterError> {
            Ok(vec![])
        }
        async fn fetch_ticker(&self, _symbol: &str) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn fetch_balance(&self) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<Value>, AdapterError> {
            Ok(vec![])
        }
        async fn fetch_order(&self, _id: &str, _symbol: &str) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn load_markets(&self) -> Result<(), AdapterError> {
            Ok(())
        }
        fn has(&self, _capability: &str) -> super::super::client::HasCapability {
            super::super::client::HasCapability::Yes
        }
    }

    fn creds(api_key: &str) -> ExchangeCredentials {
        ExchangeCredentials {
            use_testnet: true,
            api_key: Some(api_key.to_owned()),
            secret: Some("s".to_owned()),
            passphrase: None,
            extra_config: Value::Null,
        }
    }

    #[tokio::test]
    async fn reuses_handle_when_fingerprint_matches() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let creds = creds("key-a");
        let built = std::sync::atomic::AtomicU32::new(0);
        for _ in 0..3 {
            let n = built.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            cache
                .get_or_build("account:1", &creds, || async move { Ok(Arc::new(StubClient(n)) as Arc<dyn ExchangeClient>) })
                .await
                .unwrap();
        }
        assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rebuilds_on_fingerprint_change() {
        let cache = SessionCache::new(Duration::from_secs(60));
        cache
            .get_or_build("account:1", &creds("key-a"), || async { Ok(Arc::new(StubClient(1)) as Arc<dyn ExchangeClient>) })
            .await
            .unwrap();
        cache
            .get_or_build("account:1", &creds("key-b"), || async { Ok(Arc::new(StubClient(2)) as Arc<dyn ExchangeClient>) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }
}
