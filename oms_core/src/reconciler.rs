//! Trade reconciliation (spec.md §4.6), grounded on
//! `worker_position.py::reconcile_account_trades` and its
//! `_apply_trade_to_position` helper: pull fills the exchange reports since
//! the account's cursor, normalize them, and project each one onto a
//! position under hedge/netting/strategy_netting/isolated-external rules.

use serde_json::Value;
use tokio_postgres::GenericClient;

use oms_database::{deals, events, orders, positions, reconciliation};
use oms_domain::event::EventNamespace;
use oms_domain::order::EXTERNAL_REASON;
use oms_domain::{
    Account, ClientOrderId, Deal, ExchangeOrderId, ExchangeTradeId, NormalizedTrade, Order, OrderSide, Position,
    PositionMode, StrategyId,
};
use oms_utils::decimal::GetOrErr;
use oms_utils::time::current_millis;

use crate::exchange::adapter::ExchangeAdapter;
use crate::exchange::client::ExchangeCredentials;

/// Reconciliation-cursor entity key (spec.md §4.1's `my_trades_since` cursor
/// contract); exported so `dispatcher.rs`'s status ops read the same cursor
/// this module writes rather than duplicating the string literal.
pub const CURSOR_ENTITY: &str = "my_trades_since";

/// Summary returned to the caller and mirrored into the `reconciliation_tick`
/// event (spec.md §4.6 last step).
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub trades_fetched: usize,
    pub trades_applied: usize,
    pub new_cursor_ms: Option<i64>,
}

pub async fn reconcile_account(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    account: &Account,
    credentials: &ExchangeCredentials,
    lookback_seconds: i64,
    limit: u32,
    symbol_fallback_limit: i64,
) -> anyhow::Result<ReconciliationOutcome> {
    let lookback_ms = lookback_seconds.max(1) * 1000;
    let now_ms = current_millis();
    let floor_since = now_ms - lookback_ms;

    let cursor_since = reconciliation::fetch_reconciliation_cursor(client, account.id, CURSOR_ENTITY)
        .await?
        .and_then(|value| value.parse::<i64>().ok());
    let since = match cursor_since {
        Some(cursor) => cursor.min(floor_since),
        None => floor_since,
    };

    let exchange_id = account.parsed_exchange_id()?;
    let session_key = format!("account:{}", account.id.get());

    let raw_trades =
        fetch_trades_with_fallback(client, adapter, &exchange_id, &session_key, credentials, account, since, limit, symbol_fallback_limit)
            .await?;

    let mut normalized: Vec<NormalizedTrade> = raw_trades.iter().filter_map(normalize_trade).collect();
    normalized.sort_by(|a, b| a.timestamp_ms.cmp(&b.timestamp_ms).then_with(|| a.exchange_trade_id.cmp(&b.exchange_trade_id)));

    let mut applied = 0usize;
    let mut max_observed_ms = None;

    for trade in &normalized {
        max_observed_ms = Some(max_observed_ms.map_or(trade.timestamp_ms, |m: i64| m.max(trade.timestamp_ms)));

        let raw = raw_trades
            .iter()
            .find(|raw| raw.get("id").and_then(Value::as_str) == Some(trade.exchange_trade_id.as_str()))
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"id": trade.exchange_trade_id}));
        events::insert_ccxt_trade_raw(client, account.id, &raw).await?;

        if project_trade(client, account, trade).await? {
            applied += 1;
        }
    }

    let new_cursor_ms = max_observed_ms.map(|ms| ms + 1);
    if let Some(cursor) = new_cursor_ms {
        reconciliation::update_reconciliation_cursor(client, account.id, CURSOR_ENTITY, &cursor.to_string()).await?;
    }

    events::insert_event(
        client,
        account.id,
        EventNamespace::Position.as_str(),
        "reconciliation_tick",
        &serde_json::json!({
            "scope": exchange_id.canonical(),
            "lookback_seconds": lookback_seconds,
            "trades_fetched": normalized.len(),
            "trades_applied": applied,
            "new_cursor_ms": new_cursor_ms,
        }),
    )
    .await?;

    Ok(ReconciliationOutcome {
        trades_fetched: normalized.len(),
        trades_applied: applied,
        new_cursor_ms,
    })
}

/// Bulk `fetch_my_trades(symbol=None)` first; on rejection, fall back to a
/// bounded per-symbol sweep over recently active symbols and union the
/// results (spec.md §4.6 "Fetch trades... on failure, fall back to
/// iterating recently active symbols").
async fn fetch_trades_with_fallback(
    client: &impl GenericClient,
    adapter: &ExchangeAdapter,
    exchange_id: &oms_domain::ExchangeId,
    session_key: &str,
    credentials: &ExchangeCredentials,
    account: &Account,
    since: i64,
    limit: u32,
    symbol_fallback_limit: i64,
) -> anyhow::Result<Vec<Value>> {
    match adapter.fetch_my_trades(exchange_id, session_key, credentials, None, since, limit).await {
        Ok(trades) => Ok(trades),
        Err(_) => {
            let symbols = positions::list_recent_symbols_for_account(client, account.id, symbol_fallback_limit).await?;
            let mut union = Vec::new();
            let mut seen_ids = std::collections::HashSet::new();
            for symbol in symbols {
                let trades = adapter
                    .fetch_my_trades(exchange_id, session_key, credentials, Some(&symbol), since, limit)
                    .await?;
                for trade in trades {
                    if let Some(id) = trade.get("id").and_then(Value::as_str) {
                        if !seen_ids.insert(id.to_owned()) {
                            continue;
                        }
                    }
                    union.push(trade);
                }
            }
            Ok(union)
        }
    }
}

/// Parses one ccxt trade dict into `NormalizedTrade`, dropping it (returning
/// `None`) if a required field is missing or malformed (spec.md §4.6 step 3
/// "drop incomplete trades").
fn normalize_trade(raw: &Value) -> Option<NormalizedTrade> {
    let exchange_trade_id = raw.get("id").and_then(Value::as_str)?.to_owned();
    let symbol = raw.get("symbol").and_then(Value::as_str)?.to_owned();
    let side: OrderSide = raw.get("side").and_then(Value::as_str)?.parse().ok()?;
    let amount = raw.get_as_decimal("amount")?;
    let price = raw.get_as_decimal("price")?;
    if amount <= rust_decimal::Decimal::ZERO {
        return None;
    }

    let info = raw.get("info");
    let exchange_order_id = raw
        .get("order")
        .and_then(Value::as_str)
        .or_else(|| info.and_then(|info| info.get("orderId")).and_then(Value::as_str))
        .map(ExchangeOrderId::new);
    let client_order_id = raw
        .get("clientOrderId")
        .and_then(Value::as_str)
        .or_else(|| info.and_then(|info| info.get("clientOrderId")).and_then(Value::as_str))
        .map(ClientOrderId::new);
    let fee_cost = raw.get("fee").and_then(|fee| fee.get("cost")).and_then(oms_utils::decimal::value_to_decimal);
    let fee_currency = raw
        .get("fee")
        .and_then(|fee| fee.get("currency"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let timestamp_ms = raw.get("timestamp").and_then(Value::as_i64)?;

    Some(NormalizedTrade {
        exchange_trade_id,
        symbol,
        side,
        amount,
        price,
        exchange_order_id,
        client_order_id,
        fee_cost,
        fee_currency,
        timestamp_ms,
    })
}

/// Projects one trade onto a position (spec.md §4.6 steps 2-6). Returns
/// `false` without side effects if a deal for this trade was already
/// recorded (idempotent re-delivery, spec.md §3 Deal invariants).
async fn project_trade(client: &impl GenericClient, account: &Account, trade: &NormalizedTrade) -> anyhow::Result<bool> {
    let exchange_trade_id = ExchangeTradeId::new(trade.exchange_trade_id.as_str());
    if deals::deal_exists_by_exchange_trade_id(client, account.id, &exchange_trade_id).await? {
        return Ok(false);
    }

    let linked_order = linked_order(client, account, trade).await?;
    let position = resolve_position(client, account, trade, &linked_order).await?;

    let deal = Deal {
        id: oms_domain::DealId::default(),
        account_id: account.id,
        order_id: if linked_order.id.is_set() { Some(linked_order.id) } else { None },
        position_id: position.id,
        symbol: trade.symbol.clone(),
        side: trade.side,
        qty: trade.amount,
        price: trade.price,
        fee: trade.fee_cost,
        fee_currency: trade.fee_currency.clone(),
        pnl: rust_decimal::Decimal::ZERO,
        strategy_id: linked_order.strategy_id,
        reason: EXTERNAL_REASON.to_owned(),
        reconciled: false,
        exchange_trade_id: Some(exchange_trade_id),
    };
    deals::insert_position_deal(client, &deal).await?;

    events::insert_event(
        client,
        account.id,
        EventNamespace::Position.as_str(),
        "deal_created",
        &serde_json::json!({
            "exchange_trade_id": trade.exchange_trade_id,
            "position_id": position.id.get(),
            "symbol": trade.symbol,
            "side": trade.side,
            "strategy_id": linked_order.strategy_id.get(),
        }),
    )
    .await?;

    Ok(true)
}

/// `linked_order` lookup (spec.md §4.6 step 2): by `exchange_order_id`, then
/// `client_order_id`, else synthesize an isolated external order.
async fn linked_order(client: &impl GenericClient, account: &Account, trade: &NormalizedTrade) -> anyhow::Result<Order> {
    if let Some(exchange_order_id) = &trade.exchange_order_id {
        if let Some(order) = orders::fetch_order_by_exchange_order_id(client, account.id, exchange_order_id).await? {
            return Ok(order);
        }
    }
    if let Some(client_order_id) = &trade.client_order_id {
        if let Some(order) = orders::fetch_order_by_client_order_id(client, account.id, client_order_id).await? {
            return Ok(order);
        }
    }
    let synthetic_client_order_id = trade.client_order_id.clone().unwrap_or_else(|| trade.synthetic_client_order_id());
    let order = orders::get_or_create_external_unmatched_order(
        client,
        account.id,
        &trade.symbol,
        trade.side,
        trade.amount,
        trade.price,
        trade.exchange_order_id.as_ref(),
        Some(&synthetic_client_order_id),
    )
    .await?;
    Ok(order)
}

/// Resolves (creating if necessary) the position a trade is applied to
/// (spec.md §4.6 step 3-4): isolated-external positions are 1:1 with their
/// order; hedge keys on `(symbol, side)`; netting/strategy_netting key on
/// `symbol` (optionally scoped by strategy).
async fn resolve_position(
    client: &impl GenericClient,
    account: &Account,
    trade: &NormalizedTrade,
    linked_order: &Order,
) -> anyhow::Result<Position> {
    if linked_order.is_external_unmatched() {
        let existing = match linked_order.position_id {
            Some(position_id) => positions::fetch_open_position(client, position_id).await?,
            None => None,
        };
        let position = apply_trade_to_position(client, account, trade, existing, linked_order.strategy_id, EXTERNAL_REASON).await?;
        if linked_order.position_id != Some(position.id) {
            orders::update_order_position_link(client, linked_order.id, position.id).await?;
        }
        return Ok(position);
    }

    let existing = match account.position_mode {
        PositionMode::Hedge => positions::fetch_open_position_for_symbol_non_external(client, account.id, &trade.symbol, trade.side).await?,
        PositionMode::Netting => positions::fetch_open_net_position_by_symbol_non_external(client, account.id, &trade.symbol).await?,
        PositionMode::StrategyNetting => {
            positions::fetch_open_net_position_by_symbol_strategy(client, account.id, &trade.symbol, linked_order.strategy_id).await?
        }
    };
    apply_trade_to_position(client, account, trade, existing, linked_order.strategy_id, "trade").await
}

/// Scalar update (spec.md §4.6 step 4): same-side grows the position at the
/// weighted-average price; opposite-side reduces, exactly closes, or closes
/// and reverses into a brand new position, depending on the trade quantity
/// relative to the existing position.
async fn apply_trade_to_position(
    client: &impl GenericClient,
    account: &Account,
    trade: &NormalizedTrade,
    existing: Option<Position>,
    strategy_id: StrategyId,
    reason: &str,
) -> anyhow::Result<Position> {
    let Some(position) = existing else {
        return Ok(positions::create_position_open(
            client,
            account.id,
            strategy_id,
            &trade.symbol,
            trade.side,
            trade.amount,
            trade.price,
            reason,
        )
        .await?);
    };

    if position.side == trade.side {
        let (new_qty, new_avg) = position.weighted_avg_with(trade.amount, trade.price);
        if new_qty <= rust_decimal::Decimal::ZERO {
            positions::close_position(client, position.id).await?;
        } else {
            positions::update_position_open_qty_price(client, position.id, new_qty, new_avg).await?;
        }
        return Ok(position);
    }

    if position.qty > trade.amount {
        let remaining = position.qty - trade.amount;
        positions::update_position_open_qty_price(client, position.id, remaining, position.avg_price).await?;
        Ok(position)
    } else if position.qty == trade.amount {
        positions::close_position(client, position.id).await?;
        Ok(position)
    } else {
        positions::close_position(client, position.id).await?;
        let remaining = trade.amount - position.qty;
        let reversed = positions::create_position_open(client, account.id, strategy_id, &trade.symbol, trade.side, remaining, trade.price, reason).await?;
        Ok(reversed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_trade_drops_missing_side() {
        let raw = serde_json::json!({"id": "1", "symbol": "BTC/USDT", "amount": "1", "price": "100"});
        assert!(normalize_trade(&raw).is_none());
    }

    #[test]
    fn normalize_trade_drops_zero_amount() {
        let raw = serde_json::json!({
            "id": "1", "symbol": "BTC/USDT", "side": "buy", "amount": "0", "price": "100", "timestamp": 1,
        });
        assert!(normalize_trade(&raw).is_none());
    }

    #[test]
    fn normalize_trade_parses_complete_payload() {
        let raw = serde_json::json!({
            "id": "t1",
            "symbol": "BTC/USDT",
            "side": "sell",
            "amount": "1.5",
            "price": "20000",
            "order": "o1",
            "fee": {"cost": "0.1", "currency": "USDT"},
            "timestamp": 1_700_000_000_000i64,
        });
        let trade = normalize_trade(&raw).unwrap();
        assert_eq!(trade.exchange_trade_id, "t1");
        assert_eq!(trade.amount, dec!(1.5));
        assert_eq!(trade.exchange_order_id.unwrap().as_str(), "o1");
        assert_eq!(trade.fee_cost, Some(dec!(0.1)));
    }

    #[test]
    fn normalize_trade_falls_back_to_info_for_order_id() {
        let raw = serde_json::json!({
            "id": "t2",
            "symbol": "BTC/USDT",
            "side": "buy",
            "amount": "1",
            "price": "100",
            "info": {"orderId": "o2"},
            "timestamp": 1,
        });
        let trade = normalize_trade(&raw).unwrap();
        assert_eq!(trade.exchange_order_id.unwrap().as_str(), "o2");
    }
}
