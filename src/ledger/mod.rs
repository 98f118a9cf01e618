//! Multi-asset ledger
//!
//! Tracks per-asset total and reserved balances. `available` clamps at
//! zero rather than going negative so a transient over-reservation degrades
//! gracefully instead of crashing a tick. Cross-asset invariants are the
//! risk guard's job, not the ledger's.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Total and reserved balance for one asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Total units held
    pub total: Decimal,
    /// Units held against open orders
    pub reserved: Decimal,
}

/// Per-asset balances with reservation semantics.
///
/// All operations are no-ops for non-positive amounts. `debit` may take a
/// total transiently negative (a leveraged loss can exceed cash);
/// `available` still never reports below zero.
#[derive(Debug, Clone, Default)]
pub struct AssetLedger {
    balances: HashMap<String, AssetBalance>,
}

impl AssetLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger seeded with initial balances
    pub fn with_balances(initial: &HashMap<String, Decimal>) -> Self {
        let mut ledger = Self::new();
        for (asset, amount) in initial {
            ledger.credit(asset, *amount);
        }
        ledger
    }

    /// Total units held for an asset
    pub fn total(&self, asset: &str) -> Decimal {
        self.balances.get(asset).map(|b| b.total).unwrap_or_default()
    }

    /// Units reserved against open orders
    pub fn reserved(&self, asset: &str) -> Decimal {
        self.balances
            .get(asset)
            .map(|b| b.reserved)
            .unwrap_or_default()
    }

    /// Spendable units: `max(0, total - reserved)`
    pub fn available(&self, asset: &str) -> Decimal {
        (self.total(asset) - self.reserved(asset)).max(Decimal::ZERO)
    }

    /// Whether `amount` fits in the available balance
    pub fn can_reserve(&self, asset: &str, amount: Decimal) -> bool {
        amount <= Decimal::ZERO || self.available(asset) >= amount
    }

    /// Set funds aside against an order
    pub fn reserve(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.entry(asset).reserved += amount;
    }

    /// Return reserved funds; reserved never drops below zero
    pub fn release(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        let balance = self.entry(asset);
        balance.reserved = (balance.reserved - amount).max(Decimal::ZERO);
    }

    /// Add to the total balance
    pub fn credit(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.entry(asset).total += amount;
    }

    /// Remove from the total balance
    pub fn debit(&mut self, asset: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.entry(asset).total -= amount;
    }

    /// Iterate all assets with their balances
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AssetBalance)> {
        self.balances.iter()
    }

    /// Snapshot of all totals
    pub fn totals(&self) -> HashMap<String, Decimal> {
        self.balances
            .iter()
            .map(|(asset, b)| (asset.clone(), b.total))
            .collect()
    }

    /// Snapshot of all reservations
    pub fn reservations(&self) -> HashMap<String, Decimal> {
        self.balances
            .iter()
            .filter(|(_, b)| !b.reserved.is_zero())
            .map(|(asset, b)| (asset.clone(), b.reserved))
            .collect()
    }

    fn entry(&mut self, asset: &str) -> &mut AssetBalance {
        self.balances.entry(asset.to_string()).or_default()
    }
}
