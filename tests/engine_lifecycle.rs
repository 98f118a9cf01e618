//! Matching engine lifecycle tests

use chrono::{DateTime, Duration, Utc};
use paper_desk::domain::{
    EngineEvent, InstrumentId, InstrumentKind, InstrumentSpec, OrderBookSnapshot, OrderId,
    OrderStatus, OrderType, PriceLevel, Side,
};
use paper_desk::engine::{
    EngineSettings, FeeModel, FillDecision, FillModel, FixedLatencyModel, LatencyModel,
    MatchingEngine, SpecFeeModel, TopOfBookFillModel,
};
use paper_desk::error::RejectReason;
use paper_desk::portfolio::PaperPortfolio;
use paper_desk::risk::RiskLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

fn spot_spec() -> InstrumentSpec {
    let mut spec = InstrumentSpec::new(InstrumentId::new(
        "binance",
        "BTC/USDT",
        InstrumentKind::Spot,
    ));
    spec.price_increment = dec!(0.5);
    spec.size_increment = dec!(0.001);
    spec.taker_fee_rate = dec!(0.001);
    spec.maker_fee_rate = dec!(0.0005);
    spec
}

fn perp_spec() -> InstrumentSpec {
    let mut spec = InstrumentSpec::new(InstrumentId::new(
        "binance",
        "ETH/USDT",
        InstrumentKind::Perpetual,
    ));
    spec.price_increment = dec!(0.5);
    spec.taker_fee_rate = dec!(0);
    spec.maker_fee_rate = dec!(0);
    spec
}

fn book(key: &str, bid: Decimal, bid_size: Decimal, ask: Decimal, ask_size: Decimal) -> OrderBookSnapshot {
    let mut book = OrderBookSnapshot::empty(key, Utc::now());
    book.bids = vec![PriceLevel {
        price: bid,
        size: bid_size,
    }];
    book.asks = vec![PriceLevel {
        price: ask,
        size: ask_size,
    }];
    book
}

fn engine_with(spec: InstrumentSpec, settings: EngineSettings) -> MatchingEngine {
    let fee = SpecFeeModel::from_spec(&spec);
    MatchingEngine::new(
        spec,
        settings,
        Box::new(TopOfBookFillModel::new()),
        Box::new(fee),
        Box::new(FixedLatencyModel::zero()),
    )
}

fn funded_portfolio() -> PaperPortfolio {
    let balances = HashMap::from([("USDT".to_string(), dec!(100000))]);
    let mut portfolio = PaperPortfolio::new(&balances, RiskLimits::default());
    portfolio.register_instrument(spot_spec());
    portfolio.register_instrument(perp_spec());
    portfolio
}

fn order_id(event: &EngineEvent) -> OrderId {
    match event {
        EngineEvent::OrderAccepted { order_id, .. } => *order_id,
        EngineEvent::OrderSubmitted { order_id, .. } => *order_id,
        other => panic!("expected accepted/submitted, got {:?}", other),
    }
}

struct PanickingFillModel;
impl FillModel for PanickingFillModel {
    fn evaluate(
        &mut self,
        _order: &paper_desk::domain::PaperOrder,
        _book: &OrderBookSnapshot,
        _now: DateTime<Utc>,
    ) -> FillDecision {
        panic!("fill model blew up");
    }
}

struct PanickingFeeModel;
impl FeeModel for PanickingFeeModel {
    fn compute(&self, _notional: Decimal, _is_maker: bool) -> Decimal {
        panic!("fee model blew up");
    }
}

struct PanickingLatencyModel;
impl LatencyModel for PanickingLatencyModel {
    fn total_insert_ns(&self) -> u64 {
        panic!("latency model blew up");
    }
}

#[test]
fn test_market_buy_fills_and_settles() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let now = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Market,
        None,
        dec!(2),
        "test",
        now,
    );
    assert!(matches!(event, EngineEvent::OrderAccepted { .. }));

    let events = engine.tick(&mut portfolio, now);
    let fill = events
        .iter()
        .find(|e| matches!(e, EngineEvent::OrderFilled { .. }))
        .expect("fill event");
    match fill {
        EngineEvent::OrderFilled {
            quantity,
            price,
            status,
            ..
        } => {
            assert_eq!(*quantity, dec!(2));
            assert_eq!(*price, dec!(100.5));
            assert_eq!(*status, OrderStatus::Filled);
        }
        _ => unreachable!(),
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::PositionChanged { .. })));

    let position = portfolio.position(&key).expect("position");
    assert_eq!(position.quantity, dec!(2));
    assert_eq!(position.avg_entry_price, dec!(100.5));
    // 100000 - 201 notional - 0.201 fee
    assert_eq!(portfolio.ledger().total("USDT"), dec!(99798.799));
    assert_eq!(portfolio.ledger().total("BTC"), dec!(2));
    // Nothing left reserved once the order completed
    assert_eq!(portfolio.ledger().reserved("USDT"), dec!(0));
}

#[test]
fn test_resting_limit_fills_when_market_reaches_it() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let now = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(99)),
        dec!(1),
        "test",
        now,
    );
    let id = order_id(&event);

    // Not crossing: no fill while the ask stays above our price
    assert!(engine.tick(&mut portfolio, now).is_empty());
    assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Open);

    // Ask drops through our level
    engine.update_book(book(&key, dec!(98), dec!(10), dec!(98.5), dec!(10)));
    let events = engine.tick(&mut portfolio, now + Duration::seconds(1));
    assert!(events.iter().any(|e| e.is_fill()));
    assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Filled);
}

#[test]
fn test_latency_queue_promotes_when_due() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = MatchingEngine::new(
        spec.clone(),
        EngineSettings::default(),
        Box::new(TopOfBookFillModel::new()),
        Box::new(SpecFeeModel::from_spec(&spec)),
        Box::new(FixedLatencyModel::from_millis(500)),
    );
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let t0 = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Market,
        None,
        dec!(1),
        "test",
        t0,
    );
    let id = match &event {
        EngineEvent::OrderSubmitted {
            order_id,
            activate_at,
            ..
        } => {
            assert_eq!(*activate_at, t0 + Duration::milliseconds(500));
            *order_id
        }
        other => panic!("expected OrderSubmitted, got {:?}", other),
    };

    // Too early: still pending, no fills
    let events = engine.tick(&mut portfolio, t0 + Duration::milliseconds(100));
    assert!(events.is_empty());
    assert_eq!(engine.order(&id).unwrap().status, OrderStatus::PendingSubmit);

    // Past the delay: accepted, then matched in the same tick
    let events = engine.tick(&mut portfolio, t0 + Duration::seconds(1));
    match &events[0] {
        EngineEvent::OrderAccepted { queue_delay_ms, .. } => {
            assert_eq!(*queue_delay_ms, 1000);
        }
        other => panic!("expected OrderAccepted, got {:?}", other),
    }
    assert!(events.iter().any(|e| e.is_fill()));
    let stats = engine.stats();
    assert_eq!(stats.accepted_count, 1);
    assert!(stats.avg_queue_delay_ms() >= 500.0);
}

#[test]
fn test_crossed_maker_rejected_by_default() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::LimitMaker,
        Some(dec!(101)),
        dec!(1),
        "test",
        Utc::now(),
    );
    match event {
        EngineEvent::OrderRejected { reason, .. } => {
            assert_eq!(reason, RejectReason::MakerWouldCross { opposite: dec!(100.5) });
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(engine.stats().reject_count, 1);
}

#[test]
fn test_crossed_maker_tagged_when_configured() {
    let spec = spot_spec();
    let key = spec.id.key();
    let settings = EngineSettings {
        reject_crossed_maker: false,
        ..EngineSettings::default()
    };
    let mut engine = engine_with(spec, settings);
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::LimitMaker,
        Some(dec!(101)),
        dec!(1),
        "test",
        Utc::now(),
    );
    let id = order_id(&event);
    assert!(engine.order(&id).unwrap().crossed);
}

#[test]
fn test_rejection_has_no_side_effects() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let balances = HashMap::from([("USDT".to_string(), dec!(50))]);
    let mut portfolio = PaperPortfolio::new(&balances, RiskLimits::default());
    portfolio.register_instrument(spot_spec());
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let available_before = portfolio.ledger().available("USDT");
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(100)),
        dec!(1),
        "test",
        Utc::now(),
    );
    match event {
        EngineEvent::OrderRejected { reason, .. } => {
            assert!(matches!(reason, RejectReason::InsufficientBalance { .. }));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(portfolio.ledger().available("USDT"), available_before);
    assert!(portfolio.position(&key).is_none());
    assert!(engine.open_order_ids().is_empty());
}

#[test]
fn test_cancel_releases_reservation_exactly() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let available_before = portfolio.ledger().available("USDT");
    let now = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(99)),
        dec!(2),
        "test",
        now,
    );
    let id = order_id(&event);
    assert_eq!(portfolio.ledger().available("USDT"), available_before - dec!(198));

    let event = engine.cancel_order(&mut portfolio, id, now).expect("cancel event");
    assert!(matches!(event, EngineEvent::OrderCanceled { .. }));
    assert_eq!(portfolio.ledger().available("USDT"), available_before);

    // Terminal and unknown orders cancel to None
    assert!(engine.cancel_order(&mut portfolio, id, now).is_none());
    assert!(engine
        .cancel_order(&mut portfolio, OrderId::new_v4(), now)
        .is_none());
}

#[test]
fn test_partial_fills_release_reservation_proportionally() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    // Only 1 visible at the ask each tick
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100), dec!(1)));

    let t0 = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(100)),
        dec!(3),
        "test",
        t0,
    );
    let id = order_id(&event);
    let reserved_after_submit = portfolio.ledger().reserved("USDT");
    assert_eq!(reserved_after_submit, dec!(300));

    let events = engine.tick(&mut portfolio, t0);
    assert!(events.iter().any(|e| e.is_fill()));
    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::PartiallyFilled);
    assert_eq!(order.filled_quantity, dec!(1));
    // One third of the hold released with one third filled
    assert_eq!(portfolio.ledger().reserved("USDT"), dec!(200));

    // Two more ticks complete the order
    engine.tick(&mut portfolio, t0 + Duration::seconds(1));
    let events = engine.tick(&mut portfolio, t0 + Duration::seconds(2));
    assert!(events.iter().any(|e| e.is_fill()));
    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.fill_count, 3);
    assert_eq!(portfolio.ledger().reserved("USDT"), dec!(0));
}

#[test]
fn test_depth_ledger_shares_liquidity_across_orders() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100), dec!(3)));

    let now = Utc::now();
    for _ in 0..2 {
        engine.submit_order(
            &mut portfolio,
            Side::Buy,
            OrderType::Limit,
            Some(dec!(100)),
            dec!(2),
            "test",
            now,
        );
    }
    let events = engine.tick(&mut portfolio, now);
    let filled: Decimal = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::OrderFilled { quantity, .. } => Some(*quantity),
            _ => None,
        })
        .sum();
    // 3 visible at the level; the two orders cannot fabricate more
    assert_eq!(filled, dec!(3));
}

#[test]
fn test_max_fills_cap_stops_matching() {
    let spec = spot_spec();
    let key = spec.id.key();
    let settings = EngineSettings {
        max_fills_per_order: 2,
        ..EngineSettings::default()
    };
    let mut engine = engine_with(spec, settings);
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100), dec!(1)));

    let t0 = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(100)),
        dec!(5),
        "test",
        t0,
    );
    let id = order_id(&event);
    for i in 0..4 {
        engine.tick(&mut portfolio, t0 + Duration::seconds(i));
    }
    let order = engine.order(&id).unwrap();
    assert_eq!(order.fill_count, 2);
    assert_eq!(order.status, OrderStatus::PartiallyFilled);
}

#[test]
fn test_min_fill_interval_gates_fills() {
    let spec = spot_spec();
    let key = spec.id.key();
    let settings = EngineSettings {
        min_fill_interval_ms: 1000,
        ..EngineSettings::default()
    };
    let mut engine = engine_with(spec, settings);
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100), dec!(1)));

    let t0 = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(100)),
        dec!(2),
        "test",
        t0,
    );
    let id = order_id(&event);
    engine.tick(&mut portfolio, t0);
    // Within the gate: no second fill
    engine.tick(&mut portfolio, t0 + Duration::milliseconds(200));
    assert_eq!(engine.order(&id).unwrap().fill_count, 1);
    engine.tick(&mut portfolio, t0 + Duration::milliseconds(1200));
    assert_eq!(engine.order(&id).unwrap().fill_count, 2);
}

#[test]
fn test_terminal_orders_pruned_after_retention() {
    let spec = spot_spec();
    let key = spec.id.key();
    let settings = EngineSettings {
        retention_secs: 60,
        ..EngineSettings::default()
    };
    let mut engine = engine_with(spec, settings);
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let t0 = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(99)),
        dec!(1),
        "test",
        t0,
    );
    let id = order_id(&event);
    engine.cancel_order(&mut portfolio, id, t0);
    assert!(engine.order(&id).is_some());

    engine.tick(&mut portfolio, t0 + Duration::seconds(30));
    assert!(engine.order(&id).is_some());
    engine.tick(&mut portfolio, t0 + Duration::seconds(61));
    assert!(engine.order(&id).is_none());
}

#[test]
fn test_market_order_without_book_is_rejected() {
    let spec = spot_spec();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();

    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Market,
        None,
        dec!(1),
        "test",
        Utc::now(),
    );
    match event {
        EngineEvent::OrderRejected { reason, .. } => {
            assert_eq!(reason, RejectReason::NoMarketPrice);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_perp_reservation_is_initial_margin() {
    let spec = perp_spec();
    let key = spec.id.key();
    let settings = EngineSettings {
        leverage: dec!(10),
        ..EngineSettings::default()
    };
    let mut engine = engine_with(spec, settings);
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(99)),
        dec!(10),
        "test",
        Utc::now(),
    );
    // notional 990 / leverage 10 * init ratio 1
    assert_eq!(portfolio.ledger().reserved("USDT"), dec!(99));
}

#[test]
fn test_panicking_fill_model_contained() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = MatchingEngine::new(
        spec.clone(),
        EngineSettings::default(),
        Box::new(PanickingFillModel),
        Box::new(SpecFeeModel::from_spec(&spec)),
        Box::new(FixedLatencyModel::zero()),
    );
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let now = Utc::now();
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(100)),
        dec!(1),
        "test",
        now,
    );
    let id = order_id(&event);

    let events = engine.tick(&mut portfolio, now);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::EngineError { context, .. } if context == "fill_model")));
    // The engine keeps running: the order is still open and cancelable
    assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Open);
    assert!(engine.cancel_order(&mut portfolio, id, now).is_some());
}

#[test]
fn test_panicking_fee_model_contained() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = MatchingEngine::new(
        spec,
        EngineSettings::default(),
        Box::new(TopOfBookFillModel::new()),
        Box::new(PanickingFeeModel),
        Box::new(FixedLatencyModel::zero()),
    );
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let now = Utc::now();
    engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Market,
        None,
        dec!(1),
        "test",
        now,
    );
    let events = engine.tick(&mut portfolio, now);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::EngineError { context, .. } if context == "fee_model")));
    // No settlement happened
    assert!(portfolio.position(&key).is_none());
}

#[test]
fn test_panicking_latency_model_contained() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = MatchingEngine::new(
        spec.clone(),
        EngineSettings::default(),
        Box::new(TopOfBookFillModel::new()),
        Box::new(SpecFeeModel::from_spec(&spec)),
        Box::new(PanickingLatencyModel),
    );
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let available_before = portfolio.ledger().available("USDT");
    let event = engine.submit_order(
        &mut portfolio,
        Side::Buy,
        OrderType::Limit,
        Some(dec!(100)),
        dec!(1),
        "test",
        Utc::now(),
    );
    assert!(matches!(
        event,
        EngineEvent::EngineError { ref context, .. } if context == "latency_model"
    ));
    // Nothing was reserved
    assert_eq!(portfolio.ledger().available("USDT"), available_before);
}

#[test]
fn test_cancel_all_cancels_every_open_order() {
    let spec = spot_spec();
    let key = spec.id.key();
    let mut engine = engine_with(spec, EngineSettings::default());
    let mut portfolio = funded_portfolio();
    engine.update_book(book(&key, dec!(99.5), dec!(10), dec!(100.5), dec!(10)));

    let now = Utc::now();
    for price in [dec!(98), dec!(98.5), dec!(99)] {
        engine.submit_order(
            &mut portfolio,
            Side::Buy,
            OrderType::Limit,
            Some(price),
            dec!(1),
            "test",
            now,
        );
    }
    let events = engine.cancel_all(&mut portfolio, now);
    assert_eq!(events.len(), 3);
    assert!(engine.open_order_ids().is_empty());
    assert_eq!(portfolio.ledger().reserved("USDT"), dec!(0));
}
