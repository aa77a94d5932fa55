use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::Transaction;

/// Fixed storage key: the log's file name inside the data directory
pub const STORAGE_KEY: &str = "bluepeak_transactions.jsonl";

/// Append-only transaction log persisted as JSON lines.
///
/// Entries keep insertion order, which is also replay order.
pub struct TransactionLog {
    path: PathBuf,
    entries: RwLock<Arc<Vec<Transaction>>>,
}

impl TransactionLog {
    /// Open (or create) the log under `data_dir` and load existing entries
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let path = data_dir.join(STORAGE_KEY);
        let entries = Self::read_jsonl(&path)?;
        info!("Loaded {} transactions from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: RwLock::new(Arc::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of all entries in insertion order
    pub fn all(&self) -> Arc<Vec<Transaction>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Persist and record one transaction
    pub fn append(&self, tx: Transaction) -> Result<()> {
        let mut entries = self.entries.write();
        self.append_json(&tx)?;
        debug!("Logged {} ({})", tx.describe(), tx.id);
        Arc::make_mut(&mut *entries).push(tx);
        Ok(())
    }

    /// Append fetched history, skipping ids already in the log.
    /// Returns how many entries were added.
    pub fn extend_from_history(&self, fetched: Vec<Transaction>) -> Result<usize> {
        let mut entries = self.entries.write();
        let mut known: HashSet<String> = entries.iter().map(|tx| tx.id.clone()).collect();

        let mut added = 0;
        for tx in fetched {
            if !known.insert(tx.id.clone()) {
                continue;
            }
            self.append_json(&tx)?;
            Arc::make_mut(&mut *entries).push(tx);
            added += 1;
        }

        if added > 0 {
            info!("Added {} transactions from history", added);
        }
        Ok(added)
    }

    /// Append JSON line to file
    fn append_json(&self, tx: &Transaction) -> Result<()> {
        let json = serde_json::to_string(tx)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    /// Read JSONL file; corrupt lines are skipped
    fn read_jsonl(path: &Path) -> Result<Vec<Transaction>> {
        if !path.exists() {
            return Ok(vec![]);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut results = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Transaction>(line) {
                Ok(tx) => results.push(tx),
                Err(e) => warn!("Skipping corrupt log line {}: {}", line_no + 1, e),
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TxKind, TxStatus};
    use chrono::Utc;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("bluepeak-txlog-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_append_and_reopen_keeps_order() {
        let dir = temp_dir();
        let log = TransactionLog::open(&dir).unwrap();
        assert!(log.is_empty());

        let first = Transaction::swap("ETH", "USDT", "1", "3200", None);
        let second = Transaction::swap("USDT", "BPK", "100", "54.05", Some("0xabc".into()));
        log.append(first.clone()).unwrap();
        log.append(second.clone()).unwrap();

        let reopened = TransactionLog::open(&dir).unwrap();
        assert_eq!(*reopened.all(), vec![first, second]);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let good = Transaction::swap("ETH", "SOL", "0.5", "11", None);
        let content = format!("{}\nnot json\n\n", serde_json::to_string(&good).unwrap());
        fs::write(dir.join(STORAGE_KEY), content).unwrap();

        let log = TransactionLog::open(&dir).unwrap();
        assert_eq!(*log.all(), vec![good]);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_history_dedupes_by_id() {
        let dir = temp_dir();
        let log = TransactionLog::open(&dir).unwrap();

        let fetched = Transaction {
            id: "0xfeed:0".into(),
            kind: TxKind::TokenTransfer {
                symbol: "USDT".into(),
                amount: "25".into(),
                direction: Direction::In,
            },
            hash: Some("0xfeed".into()),
            timestamp: Utc::now(),
            status: TxStatus::Completed,
        };

        assert_eq!(log.extend_from_history(vec![fetched.clone()]).unwrap(), 1);
        assert_eq!(log.extend_from_history(vec![fetched.clone(), fetched]).unwrap(), 0);
        assert_eq!(log.len(), 1);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_appends() {
        let dir = temp_dir();
        let log = TransactionLog::open(&dir).unwrap();
        let before = log.all();
        log.append(Transaction::swap("ETH", "BTC", "1", "0.05", None)).unwrap();
        assert!(before.is_empty());
        assert_eq!(log.len(), 1);

        fs::remove_dir_all(dir).ok();
    }
}
