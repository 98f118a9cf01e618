//! Pluggable execution models
//!
//! Fill, fee and latency behavior is injected at instrument registration as
//! trait objects. Implementations must stay pure functions of their inputs
//! (plus an explicit seed) so a replay with the same book sequence produces
//! the same fills.

use crate::domain::{InstrumentSpec, OrderBookSnapshot, OrderType, PaperOrder, PriceLevel, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One fill decision for one order on one tick
#[derive(Debug, Clone, PartialEq)]
pub struct FillDecision {
    /// Quantity to execute; zero means no fill this tick
    pub quantity: Decimal,
    /// Execution price
    pub price: Decimal,
    /// Whether the order provided liquidity
    pub is_maker: bool,
}

impl FillDecision {
    /// No fill this tick
    pub fn none() -> Self {
        Self {
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            is_maker: false,
        }
    }

    /// Whether any quantity was decided
    pub fn is_fill(&self) -> bool {
        self.quantity > Decimal::ZERO
    }
}

/// Decides whether and how an open order fills against the current book
pub trait FillModel {
    /// Evaluate one order against the book
    fn evaluate(
        &mut self,
        order: &PaperOrder,
        book: &OrderBookSnapshot,
        now: DateTime<Utc>,
    ) -> FillDecision;
}

/// Computes the fee for a fill, in quote units
pub trait FeeModel {
    /// Fee for a fill of the given notional
    fn compute(&self, notional: Decimal, is_maker: bool) -> Decimal;
}

/// Uniform delay applied to new-order acceptance
pub trait LatencyModel {
    /// Insertion delay in nanoseconds
    fn total_insert_ns(&self) -> u64;
}

/// Depth-consuming fill model.
///
/// Crossing limit and market orders walk the far side of the book and fill
/// at the volume-weighted price of the levels consumed. Resting orders fill
/// at their own price once the far side trades through their level.
#[derive(Debug, Clone, Default)]
pub struct TopOfBookFillModel;

impl TopOfBookFillModel {
    /// New model
    pub fn new() -> Self {
        Self
    }
}

impl FillModel for TopOfBookFillModel {
    fn evaluate(
        &mut self,
        order: &PaperOrder,
        book: &OrderBookSnapshot,
        _now: DateTime<Utc>,
    ) -> FillDecision {
        let remaining = order.remaining_quantity();
        if remaining <= Decimal::ZERO {
            return FillDecision::none();
        }
        let far_side = match order.side {
            Side::Buy => &book.asks,
            Side::Sell => &book.bids,
        };
        if far_side.is_empty() {
            return FillDecision::none();
        }

        match order.order_type {
            OrderType::Market => {
                let (quantity, vwap) = consume_depth(far_side, remaining, None, order.side);
                if quantity > Decimal::ZERO {
                    FillDecision {
                        quantity,
                        price: vwap,
                        is_maker: false,
                    }
                } else {
                    FillDecision::none()
                }
            }
            OrderType::Limit => {
                let crossing = match order.side {
                    Side::Buy => book.best_ask().is_some_and(|ask| ask <= order.price),
                    Side::Sell => book.best_bid().is_some_and(|bid| bid >= order.price),
                };
                if crossing {
                    let (quantity, vwap) =
                        consume_depth(far_side, remaining, Some(order.price), order.side);
                    if quantity > Decimal::ZERO {
                        return FillDecision {
                            quantity,
                            price: vwap,
                            is_maker: false,
                        };
                    }
                }
                FillDecision::none()
            }
            OrderType::LimitMaker => {
                // Fill at our own level once the far side reaches it
                let through = match order.side {
                    Side::Buy => book.best_ask().is_some_and(|ask| ask <= order.price),
                    Side::Sell => book.best_bid().is_some_and(|bid| bid >= order.price),
                };
                if through {
                    let (quantity, _) =
                        consume_depth(far_side, remaining, Some(order.price), order.side);
                    if quantity > Decimal::ZERO {
                        return FillDecision {
                            quantity,
                            price: order.price,
                            is_maker: true,
                        };
                    }
                }
                FillDecision::none()
            }
        }
    }
}

/// Walk book levels best-first, taking up to `want` within the price limit.
/// Returns the quantity taken and its volume-weighted price.
pub fn consume_depth(
    levels: &[PriceLevel],
    want: Decimal,
    limit: Option<Decimal>,
    taker_side: Side,
) -> (Decimal, Decimal) {
    let mut outstanding = want;
    let mut taken = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    for level in levels {
        if outstanding <= Decimal::ZERO {
            break;
        }
        if let Some(limit) = limit {
            let past_limit = match taker_side {
                Side::Buy => level.price > limit,
                Side::Sell => level.price < limit,
            };
            if past_limit {
                break;
            }
        }
        let take = outstanding.min(level.size.max(Decimal::ZERO));
        taken += take;
        cost += take * level.price;
        outstanding -= take;
    }
    let vwap = if taken > Decimal::ZERO {
        cost / taken
    } else {
        Decimal::ZERO
    };
    (taken, vwap)
}

/// Fee schedule read off the instrument spec
#[derive(Debug, Clone)]
pub struct SpecFeeModel {
    maker_rate: Decimal,
    taker_rate: Decimal,
}

impl SpecFeeModel {
    /// Fee model using the spec's maker/taker rates
    pub fn from_spec(spec: &InstrumentSpec) -> Self {
        Self {
            maker_rate: spec.maker_fee_rate,
            taker_rate: spec.taker_fee_rate,
        }
    }

    /// Fee model with explicit rates
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }
}

impl FeeModel for SpecFeeModel {
    fn compute(&self, notional: Decimal, is_maker: bool) -> Decimal {
        let rate = if is_maker {
            self.maker_rate
        } else {
            self.taker_rate
        };
        (notional * rate).max(Decimal::ZERO)
    }
}

/// Constant insertion latency
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLatencyModel {
    insert_ns: u64,
}

impl FixedLatencyModel {
    /// Latency of the given milliseconds
    pub fn from_millis(ms: u64) -> Self {
        Self {
            insert_ns: ms * 1_000_000,
        }
    }

    /// Zero latency: orders open on submission
    pub fn zero() -> Self {
        Self { insert_ns: 0 }
    }
}

impl LatencyModel for FixedLatencyModel {
    fn total_insert_ns(&self) -> u64 {
        self.insert_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstrumentId, InstrumentKind, OrderStatus};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn level(price: Decimal, size: Decimal) -> PriceLevel {
        PriceLevel { price, size }
    }

    fn book() -> OrderBookSnapshot {
        let mut book = OrderBookSnapshot::empty("binance:BTC/USDT:spot", Utc::now());
        book.bids = vec![level(dec!(99), dec!(3)), level(dec!(98), dec!(5))];
        book.asks = vec![level(dec!(101), dec!(2)), level(dec!(102), dec!(4))];
        book
    }

    fn order(side: Side, order_type: OrderType, price: Decimal, quantity: Decimal) -> PaperOrder {
        PaperOrder {
            id: Uuid::new_v4(),
            instrument: InstrumentId::new("binance", "BTC/USDT", InstrumentKind::Spot),
            side,
            order_type,
            price,
            quantity,
            status: OrderStatus::Open,
            filled_quantity: dec!(0),
            filled_notional: dec!(0),
            fee_paid: dec!(0),
            fill_count: 0,
            crossed: false,
            source: "test".to_string(),
            submitted_at: Utc::now(),
            activate_at: Utc::now(),
            last_fill_at: None,
            closed_at: None,
            reservation: None,
        }
    }

    #[test]
    fn test_market_buy_walks_asks() {
        let mut model = TopOfBookFillModel::new();
        let order = order(Side::Buy, OrderType::Market, dec!(0), dec!(3));
        let decision = model.evaluate(&order, &book(), Utc::now());
        assert_eq!(decision.quantity, dec!(3));
        // 2 @ 101 + 1 @ 102 = 304 over 3
        assert_eq!(decision.price, dec!(304) / dec!(3));
        assert!(!decision.is_maker);
    }

    #[test]
    fn test_crossing_limit_buy_respects_price_cap() {
        let mut model = TopOfBookFillModel::new();
        let order = order(Side::Buy, OrderType::Limit, dec!(101), dec!(5));
        let decision = model.evaluate(&order, &book(), Utc::now());
        assert_eq!(decision.quantity, dec!(2));
        assert_eq!(decision.price, dec!(101));
        assert!(!decision.is_maker);
    }

    #[test]
    fn test_resting_limit_does_not_fill() {
        let mut model = TopOfBookFillModel::new();
        let order = order(Side::Buy, OrderType::Limit, dec!(100), dec!(1));
        let decision = model.evaluate(&order, &book(), Utc::now());
        assert!(!decision.is_fill());
    }

    #[test]
    fn test_maker_fills_at_own_price_when_crossed() {
        let mut model = TopOfBookFillModel::new();
        let order = order(Side::Buy, OrderType::LimitMaker, dec!(101.5), dec!(1));
        let decision = model.evaluate(&order, &book(), Utc::now());
        assert_eq!(decision.quantity, dec!(1));
        assert_eq!(decision.price, dec!(101.5));
        assert!(decision.is_maker);
    }

    #[test]
    fn test_market_sell_walks_bids() {
        let mut model = TopOfBookFillModel::new();
        let order = order(Side::Sell, OrderType::Market, dec!(0), dec!(10));
        let decision = model.evaluate(&order, &book(), Utc::now());
        // Only 8 visible
        assert_eq!(decision.quantity, dec!(8));
        assert_eq!(decision.price, (dec!(99) * dec!(3) + dec!(98) * dec!(5)) / dec!(8));
    }

    #[test]
    fn test_empty_book_never_fills() {
        let mut model = TopOfBookFillModel::new();
        let empty = OrderBookSnapshot::empty("binance:BTC/USDT:spot", Utc::now());
        let order = order(Side::Buy, OrderType::Market, dec!(0), dec!(1));
        assert!(!model.evaluate(&order, &empty, Utc::now()).is_fill());
    }

    #[test]
    fn test_consume_depth_limit_sell() {
        let bids = vec![level(dec!(99), dec!(3)), level(dec!(98), dec!(5))];
        let (taken, vwap) = consume_depth(&bids, dec!(10), Some(dec!(99)), Side::Sell);
        assert_eq!(taken, dec!(3));
        assert_eq!(vwap, dec!(99));
    }

    #[test]
    fn test_spec_fee_model_rates() {
        let model = SpecFeeModel::new(dec!(0.0002), dec!(0.0005));
        assert_eq!(model.compute(dec!(1000), true), dec!(0.2));
        assert_eq!(model.compute(dec!(1000), false), dec!(0.5));
        assert_eq!(model.compute(dec!(-1000), false), dec!(0));
    }

    #[test]
    fn test_fixed_latency_model() {
        assert_eq!(FixedLatencyModel::zero().total_insert_ns(), 0);
        assert_eq!(FixedLatencyModel::from_millis(250).total_insert_ns(), 250_000_000);
    }
}
