//! Admit-once bookkeeping per (symbol, zone). A zone that already produced an
//! alert stays muted until its record expires, so overlapping fetch windows
//! cannot re-alert the same market event. State can be snapshotted to JSON so
//! a restart does not replay recent alerts (best effort, not durability).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DedupeRecord {
    symbol: String,
    zone_id: u64,
    alerted_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SignalDeduper {
    ttl: Duration,
    records: HashMap<(String, u64), DateTime<Utc>>,
}

impl SignalDeduper {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            records: HashMap::new(),
        }
    }

    /// True exactly once per (symbol, zone) until the record expires.
    pub fn admit(&mut self, symbol: &str, zone_id: u64) -> bool {
        self.admit_at(symbol, zone_id, Utc::now())
    }

    fn admit_at(&mut self, symbol: &str, zone_id: u64, now: DateTime<Utc>) -> bool {
        self.purge(now);
        let key = (symbol.to_ascii_uppercase(), zone_id);
        match self.records.get(&key) {
            Some(_) => false,
            None => {
                self.records.insert(key, now);
                true
            }
        }
    }

    fn purge(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.records.retain(|_, alerted_at| now - *alerted_at < ttl);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load a snapshot if one exists, dropping entries that expired while
    /// the process was down. A missing file is a clean start.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dedupe snapshot {}", path.display()))?;
        let records: Vec<DedupeRecord> =
            serde_json::from_str(&raw).context("failed to parse dedupe snapshot")?;

        let now = Utc::now();
        let mut loaded = 0;
        for r in records {
            if now - r.alerted_at < self.ttl {
                self.records
                    .insert((r.symbol.to_ascii_uppercase(), r.zone_id), r.alerted_at);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    pub fn flush_snapshot(&self, path: &Path) -> Result<()> {
        let records: Vec<DedupeRecord> = self
            .records
            .iter()
            .map(|((symbol, zone_id), alerted_at)| DedupeRecord {
                symbol: symbol.clone(),
                zone_id: *zone_id,
                alerted_at: *alerted_at,
            })
            .collect();
        let raw = serde_json::to_string_pretty(&records)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write dedupe snapshot {}", path.display()))?;
        Ok(())
    }
}
