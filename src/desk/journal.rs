//! Durable fill journal

use crate::domain::EngineEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Append-only sink for events worth keeping beyond the in-memory log
pub trait EventJournal {
    /// Append one event
    fn append(&mut self, event: &EngineEvent) -> anyhow::Result<()>;
}

/// Journal writing one JSON object per line
pub struct JsonlJournal {
    writer: BufWriter<File>,
}

impl JsonlJournal {
    /// Open (or create) a journal file in append mode
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventJournal for JsonlJournal {
    fn append(&mut self, event: &EngineEvent) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_journal_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fills.jsonl");
        let mut journal = JsonlJournal::open(&path).unwrap();

        for price in [dec!(100), dec!(101)] {
            journal
                .append(&EngineEvent::OrderFilled {
                    ts: Utc::now(),
                    instrument: "binance:BTC/USDT:spot".to_string(),
                    order_id: Uuid::new_v4(),
                    side: crate::domain::Side::Buy,
                    quantity: dec!(1),
                    price,
                    fee: dec!(0.05),
                    is_maker: false,
                    fill_count: 1,
                    remaining_quantity: dec!(0),
                    status: crate::domain::OrderStatus::Filled,
                })
                .unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["event"], "order_filled");
        }
    }

    #[test]
    fn test_journal_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fills.jsonl");
        let event = EngineEvent::OrderCanceled {
            ts: Utc::now(),
            instrument: "binance:BTC/USDT:spot".to_string(),
            order_id: Uuid::new_v4(),
            remaining_quantity: dec!(1),
        };
        {
            let mut journal = JsonlJournal::open(&path).unwrap();
            journal.append(&event).unwrap();
        }
        {
            let mut journal = JsonlJournal::open(&path).unwrap();
            journal.append(&event).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
