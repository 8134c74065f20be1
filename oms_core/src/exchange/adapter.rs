use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use oms_domain::ExchangeId;

use crate::error::AdapterError;

use super::client::{ExchangeClient, ExchangeClientFactory, ExchangeCredentials, HasCapability};
use super::session::SessionCache;

/// Result of `ExchangeAdapter::edit_or_replace_order`: which of the two
/// `ccxt_adapter.py:389` branches actually ran.
pub enum EditOrReplaceOutcome {
    Edited(Value),
    Replaced { cancel_response: Value, create_response: Value },
}

/// Orchestrates session reuse and capability-aware dispatch on top of an
/// injected `ExchangeClientFactory` (spec.md §4.2). REST (`ccxt`) sessions
/// are built fresh per call; streaming (`ccxtpro`) sessions persist in the
/// cache keyed by `(exchange_id, session_key)`.
pub struct ExchangeAdapter {
    factory: Arc<dyn ExchangeClientFactory>,
    sessions: SessionCache,
}

impl ExchangeAdapter {
    pub fn new(factory: Arc<dyn ExchangeClientFactory>, session_ttl: Duration) -> Self {
        Self {
            factory,
            sessions: SessionCache::new(session_ttl),
        }
    }

    /// Resolves a handle for `exchange_id`/`session_key`: cached and reused
    /// for persistent engines, built-and-discarded for one-shot ones (spec.md
    /// §4.2 "Non-persistent (REST) sessions are built, used once, and
    /// closed").
    async fn handle(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Arc<dyn ExchangeClient>, AdapterError> {
        if exchange_id.is_persistent_session() {
            let key = format!("{}:{}", exchange_id.canonical(), session_key);
            self.sessions.sweep_expired().await;
            self.sessions
                .get_or_build(&key, credentials, || async { self.factory.build(exchange_id, credentials).await })
                .await
        } else {
            self.factory.build(exchange_id, credentials).await
        }
    }

    /// `execute_method`: reflective dispatch used by `ccxt_call` and
    /// `ccxt_raw_query` (spec.md §4.2, §6).
    pub async fn execute_method(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        method: &str,
        args: Vec<Value>,
        kwargs: Value,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.call(method, args, kwargs).await
    }

    /// Fails fast with `CapabilityMissing` instead of forwarding a call the
    /// exchange cannot support (spec.md §4.2 "Capability probing").
    pub async fn execute_unified_with_capability(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        capability: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Value,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        if !handle.has(capability).is_supported() {
            return Err(AdapterError::CapabilityMissing(vec![capability.to_owned()]));
        }
        handle.call(method, args, kwargs).await
    }

    pub async fn create_order(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        symbol: &str,
        side: &str,
        order_type: &str,
        qty: Value,
        price: Option<Value>,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.create_order(symbol, side, order_type, qty, price, params).await
    }

    pub async fn cancel_order(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        exchange_order_id: &str,
        symbol: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.cancel_order(exchange_order_id, symbol, params).await
    }

    pub async fn fetch_my_trades(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        symbol: Option<&str>,
        since: i64,
        limit: u32,
    ) -> Result<Vec<Value>, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.fetch_my_trades(symbol, since, limit).await
    }

    /// `None` when `editOrder` is unsupported; callers fall back to
    /// cancel-and-recreate (spec.md §4.2 `edit_order_if_supported`, §4.5
    /// `change_order`). Calls `load_markets` first, same order as
    /// `ccxt_adapter.py:458` (`await exchange.load_markets()` before the
    /// `has["editOrder"]` probe) — some ccxt exchanges only populate
    /// `exchange.has` after markets are loaded.
    pub async fn edit_order_if_supported(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        exchange_order_id: &str,
        symbol: &str,
        order_type: &str,
        side: &str,
        qty: Value,
        price: Option<Value>,
        params: Value,
    ) -> Result<Option<Value>, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.load_markets().await?;
        if !handle.has("editOrder").is_supported() {
            return Ok(None);
        }
        handle
            .edit_order(exchange_order_id, symbol, order_type, side, qty, price, params)
            .await
    }

    /// `ccxt_adapter.py:389`'s `edit_or_replace_order`: edit in place when
    /// the exchange supports it, otherwise cancel then create, and report
    /// which path ran so the caller (`executor.rs::change_order`) can decide
    /// how to persist the result — this method only talks to the exchange,
    /// it never touches the store.
    pub async fn edit_or_replace_order(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        exchange_order_id: &str,
        symbol: &str,
        order_type: &str,
        side: &str,
        qty: Value,
        price: Option<Value>,
        params: Value,
    ) -> Result<EditOrReplaceOutcome, AdapterError> {
        if let Some(response) = self
            .edit_order_if_supported(
                exchange_id,
                session_key,
                credentials,
                exchange_order_id,
                symbol,
                order_type,
                side,
                qty.clone(),
                price.clone(),
                params.clone(),
            )
            .await?
        {
            return Ok(EditOrReplaceOutcome::Edited(response));
        }

        let cancel_response = self.cancel_order(exchange_id, session_key, credentials, exchange_order_id, symbol, Value::Null).await?;
        let create_response = self
            .create_order(exchange_id, session_key, credentials, symbol, side, order_type, qty, price, params)
            .await?;
        Ok(EditOrReplaceOutcome::Replaced {
            cancel_response,
            create_response,
        })
    }

    pub async fn fetch_open_orders(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        symbol: Option<&str>,
    ) -> Result<Vec<Value>, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.fetch_open_orders(symbol).await
    }

    pub async fn fetch_order(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.fetch_order(exchange_order_id, symbol).await
    }

    pub async fn fetch_ticker(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
        symbol: &str,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.fetch_ticker(symbol).await
    }

    pub async fn fetch_balance(
        &self,
        exchange_id: &ExchangeId,
        session_key: &str,
        credentials: &ExchangeCredentials,
    ) -> Result<Value, AdapterError> {
        let handle = self.handle(exchange_id, session_key, credentials).await?;
        handle.fetch_balance().await
    }

    pub fn has_capability(&self, capability: HasCapability) -> bool {
        capability.is_supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFactory {
        builds: AtomicU32,
    }

    struct StubClient;

    #[async_trait]
    impl ExchangeClient for StubClient {
        async fn call(&self, method: &str, _args: Vec<Value>, _kwargs: Value) -> Result<Value, AdapterError> {
            Ok(Value::String(method.to_owned()))
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
        fn has(&self, capability: &str) -> HasCapability {
            if capability == "editOrder" {
                HasCapability::No
            } else {
                HasCapability::Yes
            }
        }
    }

    #[async_trait]
    impl ExchangeClientFactory for CountingFactory {
        async fn build(&self, _exchange_id: &ExchangeId, _credentials: &ExchangeCredentials) -> Result<Arc<dyn ExchangeClient>, AdapterError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubClient))
        }
    }

    fn creds() -> ExchangeCredentials {
        ExchangeCredentials {
            use_testnet: true,
            api_key: Some("k".to_owned()),
            secret: Some("s".to_owned()),
            passphrase: None,
            extra_config: Value::Null,
        }
    }

    #[tokio::test]
    async fn rest_sessions_rebuild_every_call() {
        let factory = Arc::new(CountingFactory { builds: AtomicU32::new(0) });
        let adapter = ExchangeAdapter::new(factory.clone(), Duration::from_secs(60));
        let exchange_id = ExchangeId::parse("ccxt.binance").unwrap();
        adapter
            .execute_method(&exchange_id, "account:1", &creds(), "fetchTicker", vec![], Value::Null)
            .await
            .unwrap();
        adapter
            .execute_method(&exchange_id, "account:1", &creds(), "fetchTicker", vec![], Value::Null)
            .await
            .unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_sessions_are_cached() {
        let factory = Arc::new(CountingFactory { builds: AtomicU32::new(0) });
        let adapter = ExchangeAdapter::new(factory.clone(), Duration::from_secs(60));
        let exchange_id = ExchangeId::parse("ccxtpro.binance").unwrap();
        adapter
            .execute_method(&exchange_id, "account:1", &creds(), "watchTicker", vec![], Value::Null)
            .await
            .unwrap();
        adapter
            .execute_method(&exchange_id, "account:1", &creds(), "watchTicker", vec![], Value::Null)
            .await
            .unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn edit_order_returns_none_when_unsupported() {
        let factory = Arc::new(CountingFactory { builds: AtomicU32::new(0) });
        let adapter = ExchangeAdapter::new(factory, Duration::from_secs(60));
        let exchange_id = ExchangeId::parse("ccxt.binance").unwrap();
        let result = adapter
            .edit_order_if_supported(
                &exchange_id,
                "account:1",
                &creds(),
                "oid",
                "BTC/USDT",
                "limit",
                "buy",
                Value::from(1),
                None,
                Value::Null,
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn capability_missing_fails_fast() {
        let factory = Arc::new(CountingFactory { builds: AtomicU32::new(0) });
        let adapter = ExchangeAdapter::new(factory, Duration::from_secs(60));
        let exchange_id = ExchangeId::parse("ccxt.binance").unwrap();
        let err = adapter
            .execute_unified_with_capability(&exchange_id, "account:1", &creds(), "editOrder", "editOrder", vec![], Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::CapabilityMissing(_)));
    }
}
