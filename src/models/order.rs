use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WalError;

/// Maximum client order id length in bytes
pub const MAX_CLIENT_ID_LEN: usize = 64;
/// Maximum symbol length in bytes
pub const MAX_SYMBOL_LEN: usize = 32;
/// Maximum reason string length in bytes
pub const MAX_REASON_LEN: usize = 256;

/// Tolerance for floating-point quantity comparisons
pub const QTY_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 1,
    Sell = 2,
}

impl Side {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Side::Buy),
            2 => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(Side::Buy),
            "Sell" => Ok(Side::Sell),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    Limit = 1,
    Market = 2,
}

impl OrderType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(OrderType::Limit),
            2 => Some(OrderType::Market),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Limit => write!(f, "Limit"),
            OrderType::Market => write!(f, "Market"),
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Limit" => Ok(OrderType::Limit),
            "Market" => Ok(OrderType::Market),
            _ => Err(format!("Unknown order type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimeInForce {
    Gtc = 1,
    Ioc = 2,
    Fok = 3,
    Gtx = 4,
}

impl TimeInForce {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(TimeInForce::Gtc),
            2 => Some(TimeInForce::Ioc),
            3 => Some(TimeInForce::Fok),
            4 => Some(TimeInForce::Gtx),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
            TimeInForce::Gtx => write!(f, "GTX"),
        }
    }
}

/// Order lifecycle status. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    PendingNew = 1,
    Acknowledged = 2,
    PartiallyFilled = 3,
    Filled = 4,
    Canceled = 5,
    Rejected = 6,
}

impl OrderStatus {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(OrderStatus::PendingNew),
            2 => Some(OrderStatus::Acknowledged),
            3 => Some(OrderStatus::PartiallyFilled),
            4 => Some(OrderStatus::Filled),
            5 => Some(OrderStatus::Canceled),
            6 => Some(OrderStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// Whether `next` is a legal successor in the lifecycle table.
    /// Self-transitions are always allowed (idempotent updates).
    pub fn allows(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            OrderStatus::PendingNew => {
                matches!(next, OrderStatus::Acknowledged | OrderStatus::Rejected)
            }
            OrderStatus::Acknowledged | OrderStatus::PartiallyFilled => matches!(
                next,
                OrderStatus::PartiallyFilled | OrderStatus::Filled | OrderStatus::Canceled
            ),
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::PendingNew => write!(f, "PendingNew"),
            OrderStatus::Acknowledged => write!(f, "Acknowledged"),
            OrderStatus::PartiallyFilled => write!(f, "PartiallyFilled"),
            OrderStatus::Filled => write!(f, "Filled"),
            OrderStatus::Canceled => write!(f, "Canceled"),
            OrderStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Submission payload from a strategy. The client order id is the
/// primary key of the order for the rest of its life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub qty: f64,
    pub price: Option<f64>,
}

impl NewOrder {
    pub fn limit(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        qty: f64,
        price: f64,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            qty,
            price: Some(price),
        }
    }

    pub fn validate(&self) -> Result<(), WalError> {
        validate_client_id(&self.client_order_id)?;
        validate_symbol(&self.symbol)?;
        validate_qty(self.qty)?;
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

pub fn validate_client_id(id: &str) -> Result<(), WalError> {
    if id.is_empty() {
        return Err(WalError::InvalidArgument("empty client order id".into()));
    }
    if id.len() > MAX_CLIENT_ID_LEN {
        return Err(WalError::InvalidArgument(format!(
            "client order id too long: {} > {}",
            id.len(),
            MAX_CLIENT_ID_LEN
        )));
    }
    Ok(())
}

pub fn validate_symbol(symbol: &str) -> Result<(), WalError> {
    if symbol.is_empty() {
        return Err(WalError::InvalidArgument("empty symbol".into()));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(WalError::InvalidArgument(format!(
            "symbol too long: {} > {}",
            symbol.len(),
            MAX_SYMBOL_LEN
        )));
    }
    Ok(())
}

pub fn validate_reason(reason: &str) -> Result<(), WalError> {
    if reason.len() > MAX_REASON_LEN {
        return Err(WalError::InvalidArgument(format!(
            "reason too long: {} > {}",
            reason.len(),
            MAX_REASON_LEN
        )));
    }
    Ok(())
}

pub fn validate_qty(qty: f64) -> Result<(), WalError> {
    if !qty.is_finite() || qty <= 0.0 {
        return Err(WalError::InvalidArgument(format!("invalid quantity: {}", qty)));
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), WalError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(WalError::InvalidArgument(format!("invalid price: {}", price)));
    }
    Ok(())
}

/// One row of the in-memory order table: the full lifecycle view of a
/// single client order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub client_order_id: String,
    /// Venue-assigned id; empty until bound by an acknowledgement.
    pub exchange_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub original_qty: f64,
    pub limit_price: Option<f64>,
    pub executed_qty: f64,
    pub avg_price: f64,
    pub status: OrderStatus,
    pub reason: String,
    pub created_ts_ns: i64,
    pub last_ts_ns: i64,
}

impl OrderState {
    pub fn from_new_order(order: &NewOrder, ts_ns: i64) -> Self {
        Self {
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: String::new(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            time_in_force: order.time_in_force,
            original_qty: order.qty,
            limit_price: order.price,
            executed_qty: 0.0,
            avg_price: 0.0,
            status: OrderStatus::PendingNew,
            reason: String::new(),
            created_ts_ns: ts_ns,
            last_ts_ns: ts_ns,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_byte_roundtrip() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(Side::from_u8(side.as_u8()), Some(side));
        }
        for ot in [OrderType::Limit, OrderType::Market] {
            assert_eq!(OrderType::from_u8(ot.as_u8()), Some(ot));
        }
        for tif in [
            TimeInForce::Gtc,
            TimeInForce::Ioc,
            TimeInForce::Fok,
            TimeInForce::Gtx,
        ] {
            assert_eq!(TimeInForce::from_u8(tif.as_u8()), Some(tif));
        }
        for status in [
            OrderStatus::PendingNew,
            OrderStatus::Acknowledged,
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
        ] {
            assert_eq!(OrderStatus::from_u8(status.as_u8()), Some(status));
        }
        assert_eq!(Side::from_u8(0), None);
        assert_eq!(OrderStatus::from_u8(7), None);
    }

    #[test]
    fn test_status_transitions() {
        assert!(OrderStatus::PendingNew.allows(OrderStatus::Acknowledged));
        assert!(OrderStatus::PendingNew.allows(OrderStatus::Rejected));
        assert!(!OrderStatus::PendingNew.allows(OrderStatus::Filled));
        assert!(OrderStatus::Acknowledged.allows(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.allows(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.allows(OrderStatus::Canceled));
        assert!(!OrderStatus::Filled.allows(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.allows(OrderStatus::Acknowledged));
        assert!(!OrderStatus::Rejected.allows(OrderStatus::PendingNew));
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::PendingNew.is_terminal());
        assert!(!OrderStatus::Acknowledged.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_new_order_validation() {
        let order = NewOrder::limit("ORDER-001", "BTCUSDT", Side::Buy, 1.0, 50000.0);
        assert!(order.validate().is_ok());

        let mut bad = order.clone();
        bad.client_order_id = String::new();
        assert!(bad.validate().is_err());

        let mut bad = order.clone();
        bad.client_order_id = "x".repeat(65);
        assert!(bad.validate().is_err());

        let mut bad = order.clone();
        bad.qty = -1.0;
        assert!(bad.validate().is_err());

        let mut bad = order.clone();
        bad.qty = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = order.clone();
        bad.price = Some(f64::INFINITY);
        assert!(bad.validate().is_err());

        let mut bad = order;
        bad.symbol = "S".repeat(33);
        assert!(bad.validate().is_err());
    }
}
