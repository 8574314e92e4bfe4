/*!
Transaction log: the single externally visible statistic per transaction.

A record is appended when a PE consumes a response (READ_RESP, WRITE_RESP,
INV_LINE or INV_COMPLETE). The wire format is one whitespace-separated
line per record:

```text
pe_id qos_hex operation size_bytes affected_bytes full_latency
```

Records accumulate in memory so tests can inspect them without touching
disk; `write_to` flushes the textual form, and `parse_line` reads it back
for the `stats` aggregation.
*/

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::message::{Message, Operation};

/// One completed transaction as reported by its consuming PE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub pe: i32,
    pub qos: u8,
    pub operation: Operation,
    /// Transfer size in bytes (`size_words * 4`).
    pub size_bytes: u32,
    /// Byte extent of the cache lines touched (`num_lines * 16`).
    pub affected_bytes: u32,
    /// End-to-end cycles.
    pub latency: u32,
}

impl TransactionRecord {
    /// Build the record for a response at its consumption point.
    ///
    /// Memory transactions are reported under their request mnemonic;
    /// invalidation events (INV_LINE, INV_COMPLETE) are events in their
    /// own right and keep their names.
    pub fn from_response(msg: &Message) -> Self {
        let operation = match msg.operation {
            Operation::ReadResp => Operation::ReadMem,
            Operation::WriteResp => Operation::WriteMem,
            other => other,
        };
        TransactionRecord {
            pe: msg.dest,
            qos: msg.qos,
            operation,
            size_bytes: msg.size_words * 4,
            affected_bytes: msg.num_lines * 16,
            latency: msg.full_latency(),
        }
    }

    /// Parse one log line; `None` for blank or foreign lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut it = line.split_whitespace();
        let pe = it.next()?.parse().ok()?;
        let qos_tok = it.next()?;
        let qos = u8::from_str_radix(qos_tok.strip_prefix("0x").unwrap_or(qos_tok), 16).ok()?;
        let operation = Operation::from_name(it.next()?)?;
        let size_bytes = it.next()?.parse().ok()?;
        let affected_bytes = it.next()?.parse().ok()?;
        let latency = it.next()?.parse().ok()?;
        Some(TransactionRecord {
            pe,
            qos,
            operation,
            size_bytes,
            affected_bytes,
            latency,
        })
    }
}

impl std::fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} 0x{:x} {} {} {} {}",
            self.pe, self.qos, self.operation, self.size_bytes, self.affected_bytes, self.latency
        )
    }
}

/// Append-only, thread-shared transaction log.
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Mutex<Vec<TransactionRecord>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rec: TransactionRecord) {
        tracing::info!(entry = %rec, "transaction complete");
        self.lock().push(rec);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A point-in-time copy, in completion order.
    pub fn snapshot(&self) -> Vec<TransactionRecord> {
        self.lock().clone()
    }

    /// Write the textual log, one line per record.
    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        for rec in self.lock().iter() {
            writeln!(w, "{rec}")?;
        }
        w.flush()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TransactionRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-PE aggregate of a transaction log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeSummary {
    pub pe: i32,
    pub transactions: usize,
    pub bytes_moved: u64,
    pub min_latency: u32,
    pub max_latency: u32,
    /// Mean latency in whole cycles.
    pub mean_latency: u32,
}

/// Aggregate records per PE, ordered by PE id.
pub fn summarize(records: &[TransactionRecord]) -> Vec<PeSummary> {
    let mut by_pe: BTreeMap<i32, Vec<&TransactionRecord>> = BTreeMap::new();
    for rec in records {
        by_pe.entry(rec.pe).or_default().push(rec);
    }

    by_pe
        .into_iter()
        .map(|(pe, recs)| {
            let total: u64 = recs.iter().map(|r| u64::from(r.latency)).sum();
            PeSummary {
                pe,
                transactions: recs.len(),
                bytes_moved: recs
                    .iter()
                    .map(|r| u64::from(r.size_bytes) + u64::from(r.affected_bytes))
                    .sum(),
                min_latency: recs.iter().map(|r| r.latency).min().unwrap_or(0),
                max_latency: recs.iter().map(|r| r.latency).max().unwrap_or(0),
                mean_latency: (total / recs.len() as u64) as u32,
            }
        })
        .collect()
}
