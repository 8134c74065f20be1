//! Placeholder `ExchangeClientFactory` wired into the binary at startup.
//!
//! spec.md §1 treats the exchange SDK itself as an external collaborator —
//! "modeled as an abstract Exchange Adapter with a named method set" — so
//! `oms_core` only ships the trait (`exchange::client::ExchangeClient`) plus
//! the session-cache/capability-probing machinery around it. A real
//! deployment plugs in a factory that talks to an actual ccxt/ccxtpro
//! process (out of scope here, same as the teacher's concrete exchange
//! connectors in `exchanges/*` are out of scope for this port — see
//! DESIGN.md). This module gives the binary something concrete to build
//! against so it starts and serves RPCs that don't require a live exchange
//! call; any `ccxt_call`/`create_order`/`fetch_my_trades` reaching it fails
//! with `engine_unavailable` until a real factory is substituted.

use async_trait::async_trait;
use serde_json::Value;

use oms_core::error::AdapterError;
use oms_core::exchange::client::{ExchangeClient, ExchangeClientFactory, ExchangeCredentials, HasCapability};
use oms_domain::ExchangeId;
use std::sync::Arc;

pub struct NullExchangeFactory;

#[async_trait]
impl ExchangeClientFactory for NullExchangeFactory {
    async fn build(&self, exchange_id: &ExchangeId, _credentials: &ExchangeCredentials) -> Result<Arc<dyn ExchangeClient>, AdapterError> {
        Err(AdapterError::EngineUnavailable(format!(
            "no exchange connector configured for {}",
            exchange_id.canonical()
        )))
    }
}

/// Kept for RPC ops that only probe capabilities (`meta_ccxt_exchanges`)
/// without needing a live connection; not currently wired in since the
/// adapter always asks the factory for a handle first, but documents the
/// shape a real implementation's `has()` would take.
pub struct NullExchangeClient;

#[async_trait]
impl ExchangeClient for NullExchangeClient {
    async fn call(&self, method: &str, _args: Vec<Value>, _kwargs: Value) -> Result<Value, AdapterError> {
        Err(AdapterError::UnsupportedMethod(method.to_owned()))
    }

    async fn create_order(
        &self,
        _symbol: &str,
        _side: &str,
        _order_type: &str,
        _qty: Value,
        _price: Option<Value>,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn cancel_order(&self, _exchange_order_id: &str, _symbol: &str, _params: Value) -> Result<Value, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn edit_order(
        &self,
        _exchange_order_id: &str,
        _symbol: &str,
        _order_type: &str,
        _side: &str,
        _qty: Value,
        _price: Option<Value>,
        _params: Value,
    ) -> Result<Option<Value>, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn fetch_my_trades(&self, _symbol: Option<&str>, _since: i64, _limit: u32) -> Result<Vec<Value>, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<Value, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn fetch_balance(&self) -> Result<Value, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn fetch_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<Value>, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn fetch_order(&self, _exchange_order_id: &str, _symbol: &str) -> Result<Value, AdapterError> {
        Err(AdapterError::EngineUnavailable("no exchange connector configured".to_owned()))
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn has(&self, _capability: &str) -> HasCapability {
        HasCapability::No
    }
}
