//! Instrument identity and trading rules

use crate::domain::Side;
use crate::error::RejectReason;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Spot pair, settled in full
    Spot,
    /// Perpetual swap, margin settled
    Perpetual,
    /// Dated future, margin settled
    Future,
}

impl InstrumentKind {
    /// Short label used in instrument keys
    pub fn label(&self) -> &'static str {
        match self {
            InstrumentKind::Spot => "spot",
            InstrumentKind::Perpetual => "perp",
            InstrumentKind::Future => "future",
        }
    }
}

/// Immutable instrument identity: venue, trading pair and kind.
///
/// The pair is written `BASE/QUOTE` (e.g. `BTC/USDT`); base and quote asset
/// symbols are derived from it. Equality is structural and the stable string
/// key is what every map in the engine is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentId {
    /// Venue name, e.g. "binance"
    pub venue: String,
    /// Trading pair in BASE/QUOTE form
    pub pair: String,
    /// Instrument kind
    pub kind: InstrumentKind,
}

impl InstrumentId {
    /// Create a new instrument identity
    pub fn new(venue: impl Into<String>, pair: impl Into<String>, kind: InstrumentKind) -> Self {
        Self {
            venue: venue.into(),
            pair: pair.into(),
            kind,
        }
    }

    /// Base asset symbol (left of the slash)
    pub fn base_asset(&self) -> &str {
        self.pair.split_once('/').map(|(b, _)| b).unwrap_or(&self.pair)
    }

    /// Quote asset symbol (right of the slash)
    pub fn quote_asset(&self) -> &str {
        self.pair.split_once('/').map(|(_, q)| q).unwrap_or("")
    }

    /// Stable string key, `venue:pair:kind`
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.venue, self.pair, self.kind.label())
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Immutable trading-rule set for one instrument.
///
/// Never mutated after construction. Quantization and validation are pure;
/// validation reports a [`RejectReason`] instead of panicking so the
/// submission path stays total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Instrument identity
    pub id: InstrumentId,
    /// Price tick increment
    pub price_increment: Decimal,
    /// Size tick increment
    pub size_increment: Decimal,
    /// Minimum order quantity
    pub min_quantity: Decimal,
    /// Maximum order quantity (zero = unbounded)
    pub max_quantity: Decimal,
    /// Minimum order notional in quote units
    pub min_notional: Decimal,
    /// Maker fee rate
    pub maker_fee_rate: Decimal,
    /// Taker fee rate
    pub taker_fee_rate: Decimal,
    /// Initial margin ratio (zero for spot)
    pub margin_init_ratio: Decimal,
    /// Maintenance margin ratio (zero for spot)
    pub margin_maint_ratio: Decimal,
    /// Leverage ceiling
    pub max_leverage: Decimal,
    /// Funding interval in seconds (zero = no funding)
    pub funding_interval_secs: u64,
}

impl InstrumentSpec {
    /// Spec with permissive defaults for the given identity
    pub fn new(id: InstrumentId) -> Self {
        let leveraged = id.kind != InstrumentKind::Spot;
        let funding_interval_secs = if id.kind == InstrumentKind::Perpetual {
            28_800
        } else {
            0
        };
        Self {
            id,
            price_increment: Decimal::new(1, 2),
            size_increment: Decimal::new(1, 4),
            min_quantity: Decimal::ZERO,
            max_quantity: Decimal::ZERO,
            min_notional: Decimal::ZERO,
            maker_fee_rate: Decimal::new(2, 4),
            taker_fee_rate: Decimal::new(5, 4),
            margin_init_ratio: if leveraged { Decimal::ONE } else { Decimal::ZERO },
            margin_maint_ratio: if leveraged { Decimal::new(5, 3) } else { Decimal::ZERO },
            max_leverage: if leveraged { Decimal::from(20) } else { Decimal::ONE },
            funding_interval_secs,
        }
    }

    /// Whether the instrument settles on margin
    pub fn is_leveraged(&self) -> bool {
        self.id.kind != InstrumentKind::Spot
    }

    /// Round a price onto the tick grid, toward the conservative side for
    /// the order direction: down for buys, up for sells.
    pub fn quantize_price(&self, price: Decimal, side: Side) -> Decimal {
        if self.price_increment <= Decimal::ZERO {
            return price;
        }
        let ticks = price / self.price_increment;
        let ticks = match side {
            Side::Buy => ticks.floor(),
            Side::Sell => ticks.ceil(),
        };
        ticks * self.price_increment
    }

    /// Round a quantity down onto the size grid
    pub fn quantize_quantity(&self, quantity: Decimal) -> Decimal {
        if self.size_increment <= Decimal::ZERO {
            return quantity;
        }
        (quantity / self.size_increment).floor() * self.size_increment
    }

    /// Validate an already-quantized price/quantity against the rule set
    pub fn validate(&self, price: Decimal, quantity: Decimal) -> Result<(), RejectReason> {
        if price <= Decimal::ZERO {
            return Err(RejectReason::PriceNotPositive);
        }
        if quantity < self.min_quantity || quantity <= Decimal::ZERO {
            return Err(RejectReason::QuantityBelowMinimum {
                min: self.min_quantity,
            });
        }
        if self.max_quantity > Decimal::ZERO && quantity > self.max_quantity {
            return Err(RejectReason::QuantityAboveMaximum {
                max: self.max_quantity,
            });
        }
        if self.min_notional > Decimal::ZERO && price * quantity < self.min_notional {
            return Err(RejectReason::NotionalBelowMinimum {
                min: self.min_notional,
            });
        }
        Ok(())
    }

    /// Fee rate for the given liquidity flag
    pub fn fee_rate(&self, is_maker: bool) -> Decimal {
        if is_maker {
            self.maker_fee_rate
        } else {
            self.taker_fee_rate
        }
    }
}
