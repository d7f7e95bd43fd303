use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use wp_api_types::{RawWaveRecord, WaveRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    #[default]
    Disabled,
    TailWindow(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveLogSnapshot {
    pub count: usize,
    pub items: Arc<Vec<WaveRecord>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMark {
    generation: u64,
    live: usize,
}

#[derive(Debug, Default)]
struct Entries {
    items: Arc<Vec<WaveRecord>>,
    generation: u64,
    // Appended since the last bulk load, in arrival order.
    live: Vec<WaveRecord>,
}

#[derive(Debug, Default)]
pub struct WaveLog {
    entries: RwLock<Entries>,
    dedup: DedupPolicy,
}

impl WaveLog {
    pub fn new(dedup: DedupPolicy) -> Self {
        Self {
            entries: RwLock::default(),
            dedup,
        }
    }

    pub fn dedup(&self) -> DedupPolicy {
        self.dedup
    }

    pub fn load_bulk<I>(&self, raw: I)
    where
        I: IntoIterator<Item = RawWaveRecord>,
    {
        let items: Vec<WaveRecord> = raw.into_iter().map(WaveRecord::from).collect();
        debug!("wave log loaded with {} records", items.len());

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.items = Arc::new(items);
        entries.generation += 1;
        entries.live.clear();
    }

    pub fn mark(&self) -> LogMark {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        LogMark {
            generation: entries.generation,
            live: entries.live.len(),
        }
    }

    /// Like `load_bulk` for a fetch issued at `mark`: records appended after
    /// the mark that the fetch does not contain are kept at the tail.
    /// Returns how many were kept.
    pub fn load_bulk_since<I>(&self, raw: I, mark: LogMark) -> usize
    where
        I: IntoIterator<Item = RawWaveRecord>,
    {
        let mut items: Vec<WaveRecord> = raw.into_iter().map(WaveRecord::from).collect();
        let fetched = items.len();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // A bulk load since the mark already carried everything older.
        let since_mark = if entries.generation == mark.generation {
            &entries.live[mark.live.min(entries.live.len())..]
        } else {
            &entries.live[..]
        };

        let mut matched = vec![false; fetched];
        let mut kept = Vec::new();
        for record in since_mark {
            match (0..fetched).find(|&i| !matched[i] && items[i] == *record) {
                Some(i) => matched[i] = true,
                None => kept.push(record.clone()),
            }
        }

        debug!(
            "wave log loaded with {fetched} records, {} newer live records kept",
            kept.len()
        );
        items.extend(kept.iter().cloned());
        entries.items = Arc::new(items);
        entries.generation += 1;
        entries.live = kept;
        entries.live.len()
    }

    /// Adds `record` at the tail. Returns `false` if the dedup policy dropped it.
    pub fn append(&self, record: WaveRecord) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let DedupPolicy::TailWindow(window) = self.dedup {
            if entries.items.iter().rev().take(window).any(|existing| *existing == record) {
                debug!(
                    "dropping duplicate wave from {} at {}",
                    record.sender_address, record.timestamp_epoch_ms
                );
                return false;
            }
        }

        Arc::make_mut(&mut entries.items).push(record.clone());
        entries.live.push(record);
        true
    }

    pub fn snapshot(&self) -> WaveLogSnapshot {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        WaveLogSnapshot {
            count: entries.items.len(),
            items: Arc::clone(&entries.items),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
