//! Domain model
//!
//! Identifiers, instrument trading rules, order/position/book value objects
//! and the event vocabulary. No behavior beyond pure derivations; every
//! other module depends on this one.

mod book;
mod events;
mod instrument;
mod order;

pub use book::{OrderBookSnapshot, PriceLevel};
pub use events::{EngineEvent, EventLog, FillTransition};
pub use instrument::{InstrumentId, InstrumentKind, InstrumentSpec};
pub use order::{OrderId, OrderStatus, OrderType, PaperOrder, Reservation, Side};
