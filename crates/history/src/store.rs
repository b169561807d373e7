use chrono::{DateTime, Utc};
use scoring::{quality_trend, QualityMetrics, QualityTrend};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{HistoryError, Result, Storage};

pub const DEFAULT_MAX_RECORDS: usize = 50;

/// One stored assessment of a dataset, keyed by its fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub fingerprint: String,
    pub dataset: String,
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub metrics: QualityMetrics,
}

pub fn record_key(fingerprint: &str, seq: u64) -> Vec<u8> {
    format!("assessment:{fingerprint}:{seq:010}").into_bytes()
}

fn index_key(fingerprint: &str) -> Vec<u8> {
    format!("assessment:{fingerprint}:index").into_bytes()
}

pub struct HistoryStore<S: Storage> {
    storage: S,
    max_records: usize,
}

impl<S: Storage> HistoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_retention(storage, DEFAULT_MAX_RECORDS)
    }

    /// Keeps at most `max_records` per fingerprint; the oldest go first.
    pub fn with_retention(storage: S, max_records: usize) -> Self {
        Self {
            storage,
            max_records: max_records.max(1),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn load_index(&self, fingerprint: &str) -> Result<Vec<u64>> {
        Ok(match self.storage.get(&index_key(fingerprint))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| HistoryError::Serialization(e.to_string()))?,
            None => vec![],
        })
    }

    fn save_index(&mut self, fingerprint: &str, seqs: &[u64]) -> Result<()> {
        let bytes =
            serde_json::to_vec(seqs).map_err(|e| HistoryError::Serialization(e.to_string()))?;
        self.storage.put(&index_key(fingerprint), &bytes)
    }

    pub fn record(
        &mut self,
        fingerprint: &str,
        dataset: &str,
        run_id: Uuid,
        metrics: QualityMetrics,
    ) -> Result<AssessmentRecord> {
        let mut seqs = self.load_index(fingerprint)?;
        let seq = seqs.last().map(|s| s + 1).unwrap_or(0);

        let rec = AssessmentRecord {
            fingerprint: fingerprint.to_string(),
            dataset: dataset.to_string(),
            seq,
            recorded_at: Utc::now(),
            run_id,
            metrics,
        };
        let val = bincode::serialize(&rec).map_err(|e| HistoryError::Serialization(e.to_string()))?;
        self.storage.put(&record_key(fingerprint, seq), &val)?;
        seqs.push(seq);

        if seqs.len() > self.max_records {
            let overflow = seqs.len() - self.max_records;
            for old in seqs.drain(0..overflow) {
                self.storage.delete(&record_key(fingerprint, old))?;
            }
        }
        self.save_index(fingerprint, &seqs)?;

        debug!(fingerprint, seq, kept = seqs.len(), "recorded assessment");
        Ok(rec)
    }

    pub fn get(&self, fingerprint: &str, seq: u64) -> Result<Option<AssessmentRecord>> {
        match self.storage.get(&record_key(fingerprint, seq))? {
            Some(bytes) => {
                let rec: AssessmentRecord = bincode::deserialize(&bytes)
                    .map_err(|e| HistoryError::Serialization(e.to_string()))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    /// Oldest first. Index entries whose record is gone are skipped.
    pub fn list(&self, fingerprint: &str) -> Result<Vec<AssessmentRecord>> {
        let mut out = Vec::new();
        for seq in self.load_index(fingerprint)? {
            if let Some(rec) = self.get(fingerprint, seq)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    pub fn latest(&self, fingerprint: &str) -> Result<Option<AssessmentRecord>> {
        match self.load_index(fingerprint)?.last() {
            Some(&seq) => self.get(fingerprint, seq),
            None => Ok(None),
        }
    }

    pub fn trend(&self, fingerprint: &str) -> Result<Option<QualityTrend>> {
        let metrics: Vec<QualityMetrics> = self
            .list(fingerprint)?
            .into_iter()
            .map(|r| r.metrics)
            .collect();
        Ok(quality_trend(&metrics))
    }

    /// Every fingerprint with at least one index.
    pub fn fingerprints(&self) -> Result<Vec<String>> {
        let mut out: Vec<String> = self
            .storage
            .keys()?
            .into_iter()
            .filter_map(|k| String::from_utf8(k).ok())
            .filter_map(|k| {
                k.strip_prefix("assessment:")
                    .and_then(|rest| rest.strip_suffix(":index"))
                    .map(str::to_string)
            })
            .collect();
        out.sort();
        Ok(out)
    }

    pub fn clear(&mut self, fingerprint: &str) -> Result<usize> {
        let seqs = self.load_index(fingerprint)?;
        for seq in &seqs {
            self.storage.delete(&record_key(fingerprint, *seq))?;
        }
        self.storage.delete(&index_key(fingerprint))?;
        Ok(seqs.len())
    }
}
