//! In-memory order table
//!
//! Maps client order id to the live order state. Mutated by the WAL
//! writer under its serialization lock and by replay during recovery;
//! read concurrently by monitoring and strategy code through shared
//! references.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::models::{NewOrder, OrderState, OrderStatus, Side, TimeInForce, OrderType, QTY_EPSILON};

#[derive(Default)]
pub struct OrderStore {
    orders: RwLock<FxHashMap<String, OrderState>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the initial record for a client order id.
    pub fn note_order_params(&self, order: &NewOrder, ts_ns: i64) {
        let state = OrderState::from_new_order(order, ts_ns);
        self.orders
            .write()
            .insert(order.client_order_id.clone(), state);
    }

    /// Apply a status change, binding the exchange id when provided.
    /// Updates against a terminal record are no-ops: replay can see the
    /// same semantic event on both sides of a checkpoint.
    pub fn apply_update(
        &self,
        client_order_id: &str,
        exchange_order_id: &str,
        status: OrderStatus,
        reason: &str,
        ts_ns: i64,
    ) {
        let mut orders = self.orders.write();
        let state = orders
            .entry(client_order_id.to_string())
            .or_insert_with(|| {
                warn!(client_order_id, "update for unknown order, creating shell record");
                shell_record(client_order_id, "", ts_ns)
            });

        if state.status.is_terminal() {
            return;
        }
        if !state.status.allows(status) {
            warn!(
                client_order_id,
                from = %state.status,
                to = %status,
                "out-of-table status transition"
            );
        }

        if !exchange_order_id.is_empty() {
            state.exchange_order_id = exchange_order_id.to_string();
        }
        state.status = status;
        state.reason = reason.to_string();
        state.last_ts_ns = ts_ns;
    }

    /// Apply a fill: accumulate executed quantity, recompute the
    /// quantity-weighted average price, and derive the status from
    /// progress against the original quantity. A fill for an unknown id
    /// creates a shell record so out-of-order replay never drops fill
    /// information.
    pub fn apply_fill(&self, client_order_id: &str, symbol: &str, qty: f64, price: f64, ts_ns: i64) {
        let mut orders = self.orders.write();
        let state = orders
            .entry(client_order_id.to_string())
            .or_insert_with(|| {
                warn!(client_order_id, symbol, "fill for unknown order, creating shell record");
                shell_record(client_order_id, symbol, ts_ns)
            });

        if state.status.is_terminal() && state.status != OrderStatus::Filled {
            // Canceled/Rejected are final; a late fill is reported, not applied.
            warn!(
                client_order_id,
                status = %state.status,
                qty,
                "fill after terminal status ignored"
            );
            return;
        }

        let new_cum = state.executed_qty + qty;
        let notional = state.avg_price * state.executed_qty + price * qty;
        state.executed_qty = new_cum;
        state.avg_price = if new_cum > 0.0 { notional / new_cum } else { 0.0 };

        if state.original_qty > 0.0 && new_cum > state.original_qty + QTY_EPSILON {
            // Exchange fills are ground truth; flag the overfill but keep it.
            warn!(
                client_order_id,
                executed = new_cum,
                original = state.original_qty,
                "OVERFILL: executed quantity exceeds original"
            );
        }

        state.status = if state.original_qty > 0.0 && new_cum + QTY_EPSILON >= state.original_qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        state.last_ts_ns = ts_ns;
    }

    pub fn get(&self, client_order_id: &str) -> Option<OrderState> {
        self.orders.read().get(client_order_id).cloned()
    }

    /// Point-in-time copy of every order.
    pub fn snapshot(&self) -> Vec<OrderState> {
        self.orders.read().values().cloned().collect()
    }

    pub fn list_open(&self) -> Vec<OrderState> {
        self.orders
            .read()
            .values()
            .filter(|o| !o.is_terminal())
            .cloned()
            .collect()
    }

    pub fn list_terminal(&self) -> Vec<OrderState> {
        self.orders
            .read()
            .values()
            .filter(|o| o.is_terminal())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    pub fn count_open(&self) -> usize {
        self.orders.read().values().filter(|o| !o.is_terminal()).count()
    }

    pub fn count_terminal(&self) -> usize {
        self.orders.read().values().filter(|o| o.is_terminal()).count()
    }

    pub fn clear(&self) {
        self.orders.write().clear();
    }

    /// Seed the table from checkpoint rows, replacing current contents.
    pub fn restore(&self, states: Vec<OrderState>) {
        let mut orders = self.orders.write();
        orders.clear();
        for state in states {
            orders.insert(state.client_order_id.clone(), state);
        }
    }
}

fn shell_record(client_order_id: &str, symbol: &str, ts_ns: i64) -> OrderState {
    OrderState {
        client_order_id: client_order_id.to_string(),
        exchange_order_id: String::new(),
        symbol: symbol.to_string(),
        side: Side::Buy,
        order_type: OrderType::Limit,
        time_in_force: TimeInForce::Gtc,
        original_qty: 0.0,
        limit_price: None,
        executed_qty: 0.0,
        avg_price: 0.0,
        status: OrderStatus::PendingNew,
        reason: String::new(),
        created_ts_ns: ts_ns,
        last_ts_ns: ts_ns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;

    fn new_order(id: &str, qty: f64, price: f64) -> NewOrder {
        NewOrder::limit(id, "BTCUSDT", Side::Buy, qty, price)
    }

    #[test]
    fn test_note_and_get() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 1.0, 50000.0), 100);

        let state = store.get("O-1").unwrap();
        assert_eq!(state.status, OrderStatus::PendingNew);
        assert_eq!(state.original_qty, 1.0);
        assert_eq!(state.limit_price, Some(50000.0));
        assert_eq!(state.executed_qty, 0.0);
        assert_eq!(state.created_ts_ns, 100);
        assert!(store.get("O-2").is_none());
    }

    #[test]
    fn test_fill_weighted_average() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 1.0, 50000.0), 0);
        store.apply_update("O-1", "EX-1", OrderStatus::Acknowledged, "", 1000);

        store.apply_fill("O-1", "BTCUSDT", 0.5, 50000.0, 2000);
        store.apply_fill("O-1", "BTCUSDT", 0.3, 50010.0, 3000);
        store.apply_fill("O-1", "BTCUSDT", 0.2, 50020.0, 4000);

        let state = store.get("O-1").unwrap();
        assert!((state.executed_qty - 1.0).abs() < QTY_EPSILON);
        assert!((state.avg_price - 50008.0).abs() < QTY_EPSILON);
        assert_eq!(state.status, OrderStatus::Filled);
        assert_eq!(state.exchange_order_id, "EX-1");
    }

    #[test]
    fn test_partial_fill_status() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 2.0, 100.0), 0);
        store.apply_fill("O-1", "BTCUSDT", 0.5, 100.0, 1000);

        let state = store.get("O-1").unwrap();
        assert_eq!(state.status, OrderStatus::PartiallyFilled);
        assert_eq!(state.executed_qty, 0.5);
    }

    #[test]
    fn test_fill_unknown_id_creates_shell() {
        let store = OrderStore::new();
        store.apply_fill("GHOST", "ETHUSDT", 0.7, 2000.0, 5000);

        let state = store.get("GHOST").unwrap();
        assert_eq!(state.symbol, "ETHUSDT");
        assert_eq!(state.executed_qty, 0.7);
        assert_eq!(state.status, OrderStatus::PartiallyFilled);
        assert_eq!(state.original_qty, 0.0);
    }

    #[test]
    fn test_terminal_update_is_noop() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 1.0, 100.0), 0);
        store.apply_update("O-1", "", OrderStatus::Rejected, "risk", 1000);
        store.apply_update("O-1", "EX-9", OrderStatus::Acknowledged, "", 2000);

        let state = store.get("O-1").unwrap();
        assert_eq!(state.status, OrderStatus::Rejected);
        assert_eq!(state.reason, "risk");
        assert_eq!(state.exchange_order_id, "");
        assert_eq!(state.last_ts_ns, 1000);
    }

    #[test]
    fn test_fill_after_cancel_ignored() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 1.0, 100.0), 0);
        store.apply_update("O-1", "EX-1", OrderStatus::Acknowledged, "", 1000);
        store.apply_update("O-1", "", OrderStatus::Canceled, "user", 2000);
        store.apply_fill("O-1", "BTCUSDT", 0.5, 100.0, 3000);

        let state = store.get("O-1").unwrap();
        assert_eq!(state.status, OrderStatus::Canceled);
        assert_eq!(state.executed_qty, 0.0);
    }

    #[test]
    fn test_overfill_applied_not_clamped() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 1.0, 100.0), 0);
        store.apply_fill("O-1", "BTCUSDT", 1.0, 100.0, 1000);
        store.apply_fill("O-1", "BTCUSDT", 0.5, 100.0, 2000);

        let state = store.get("O-1").unwrap();
        assert!((state.executed_qty - 1.5).abs() < QTY_EPSILON);
        assert_eq!(state.status, OrderStatus::Filled);
    }

    #[test]
    fn test_open_terminal_views() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("O-1", 1.0, 100.0), 0);
        store.note_order_params(&new_order("O-2", 1.0, 100.0), 0);
        store.apply_update("O-2", "", OrderStatus::Rejected, "dup", 10);

        assert_eq!(store.len(), 2);
        assert_eq!(store.count_open(), 1);
        assert_eq!(store.count_terminal(), 1);
        assert_eq!(store.list_open()[0].client_order_id, "O-1");
        assert_eq!(store.list_terminal()[0].client_order_id, "O-2");
    }

    #[test]
    fn test_restore_replaces_contents() {
        let store = OrderStore::new();
        store.note_order_params(&new_order("OLD", 1.0, 100.0), 0);

        let replacement = OrderState::from_new_order(&new_order("NEW", 2.0, 200.0), 50);
        store.restore(vec![replacement]);

        assert!(store.get("OLD").is_none());
        assert_eq!(store.get("NEW").unwrap().original_qty, 2.0);
        assert_eq!(store.len(), 1);
    }
}
