// In crates/core-types/src/types.rs

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The longest symbol accepted, exchange suffix included (e.g. "RELIANCE.NS").
pub const MAX_SYMBOL_LEN: usize = 20;

/// Represents a ticker symbol, normalized to upper case (e.g., "AAPL").
///
/// Only `A-Z`, `0-9`, `.`, `-` and `^` survive normalization, so a symbol is
/// always safe to place in a URL path or query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Symbol(pub String);

impl Symbol {
    /// Creates a symbol from user input, trimming whitespace and upper-casing it.
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(Error::EmptySymbol);
        }
        let allowed = |c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^');
        if normalized.len() > MAX_SYMBOL_LEN || !normalized.chars().all(allowed) {
            return Err(Error::InvalidSymbol(raw.trim().chars().take(MAX_SYMBOL_LEN + 1).collect()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::new(&raw)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifies a user account.
    UserId
);
uuid_id!(OrderId);
uuid_id!(HoldingId);
uuid_id!(
    /// Identifies an entry in the fill log. A BUY fill's id also names the open lot it created.
    FillId
);
uuid_id!(TransactionId);

/// Implements `as_str` and `FromStr` for a fieldless enum using a fixed spelling per variant.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

/// The direction of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

string_enum!(Side, "side", { Buy => "BUY", Sell => "SELL" });

/// How an order is executed.
///
/// `Market` orders fill immediately at the requested price; `Limit` orders wait
/// in `Pending` until the engine observes a triggering market price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderMode {
    Market,
    Limit,
}

string_enum!(OrderMode, "order mode", { Market => "MARKET", Limit => "LIMIT" });

/// The lifecycle state of an order: `Pending -> {Accepted, Cancelled}`, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Accepted,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "Pending",
    Accepted => "Accepted",
    Cancelled => "Cancelled",
});

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// Mark-to-market classification of a holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldingStatus {
    Neutral,
    Profit,
    Loss,
}

string_enum!(HoldingStatus, "holding status", {
    Neutral => "Neutral",
    Profit => "Profit",
    Loss => "Loss",
});

impl HoldingStatus {
    /// A zero P&L counts as `Profit`, matching how the dashboard has always shown it.
    pub fn from_pnl(pnl: rust_decimal::Decimal) -> Self {
        if pnl.is_sign_negative() && !pnl.is_zero() {
            HoldingStatus::Loss
        } else {
            HoldingStatus::Profit
        }
    }
}

/// The kind of cash movement recorded by a `Transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TradeBuy,
    TradeSell,
}

string_enum!(TransactionKind, "transaction kind", {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    TradeBuy => "trade_buy",
    TradeSell => "trade_sell",
});

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn symbol_is_normalized() {
        assert_eq!(Symbol::new("  acme ").unwrap().as_str(), "ACME");
        assert_eq!(Symbol::new("   "), Err(Error::EmptySymbol));
        assert_eq!(Symbol::new("reliance.ns").unwrap().as_str(), "RELIANCE.NS");
        assert_eq!(Symbol::new("^gspc").unwrap().as_str(), "^GSPC");
        assert_eq!(Symbol::new("BRK-B").unwrap().as_str(), "BRK-B");
    }

    #[test]
    fn symbol_rejects_url_syntax_and_long_input() {
        for raw in ["AAPL&token=x", "A B", "A/B", "A%23", "A#", "ÄPFEL", "A?x=1"] {
            assert!(matches!(Symbol::new(raw), Err(Error::InvalidSymbol(_))), "{}", raw);
        }
        assert!(Symbol::new(&"A".repeat(MAX_SYMBOL_LEN)).is_ok());
        assert!(matches!(
            Symbol::new(&"A".repeat(MAX_SYMBOL_LEN + 1)),
            Err(Error::InvalidSymbol(_))
        ));
    }

    #[test]
    fn symbol_deserialization_is_validated() {
        let symbol: Symbol = serde_json::from_str("\" msft \"").unwrap();
        assert_eq!(symbol.as_str(), "MSFT");
        assert_eq!(serde_json::to_string(&symbol).unwrap(), "\"MSFT\"");
        assert!(serde_json::from_str::<Symbol>("\"MS&FT\"").is_err());
    }

    #[test]
    fn enums_parse_their_storage_spelling() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("LIMIT".parse::<OrderMode>().unwrap(), OrderMode::Limit);
        assert_eq!("Cancelled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert_eq!("trade_sell".parse::<TransactionKind>().unwrap(), TransactionKind::TradeSell);
        assert!(matches!(
            "HOLD".parse::<Side>(),
            Err(Error::UnknownVariant { kind: "side", .. })
        ));
    }

    #[test]
    fn status_follows_pnl_sign() {
        assert_eq!(HoldingStatus::from_pnl(dec!(-0.01)), HoldingStatus::Loss);
        assert_eq!(HoldingStatus::from_pnl(dec!(0)), HoldingStatus::Profit);
        assert_eq!(HoldingStatus::from_pnl(dec!(12.5)), HoldingStatus::Profit);
    }

    #[test]
    fn side_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
        assert!(OrderStatus::Accepted.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }
}
