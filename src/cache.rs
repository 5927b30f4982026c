//! Day-bucketed persistent cache.
//!
//! Each cache instance owns a single persisted record holding all of its
//! entries plus the calendar day it was written. A record stamped with any
//! other day is discarded wholesale on the next access. Per-key TTLs are
//! deliberately absent; exchange rates do not change intraday and must not
//! survive past the day they were fetched.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Synchronous byte-level persistence behind a [`DailyCache`]. Implementations
/// report failures; the cache swallows them and degrades to a miss.
pub trait CacheBackend: Send + Sync {
    fn read(&self, id: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, id: &str, bytes: &[u8]) -> Result<()>;
}

/// Disk-backed store using a fjall partition.
pub struct FjallBackend {
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallBackend {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let keyspace = fjall::Config::new(path).open()?;
        let partition = keyspace.open_partition("daily_cache", PartitionCreateOptions::default())?;
        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }
}

impl CacheBackend for FjallBackend {
    fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.partition.get(id)?.map(|slice| slice.to_vec()))
    }

    fn write(&self, id: &str, bytes: &[u8]) -> Result<()> {
        self.partition.insert(id, bytes)?;
        Ok(())
    }
}

/// In-memory store for tests and cache-less runs.
#[derive(Default)]
pub struct MemoryBackend {
    inner: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().get(id).cloned())
    }

    fn write(&self, id: &str, bytes: &[u8]) -> Result<()> {
        self.inner.lock().unwrap().insert(id.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyRecord<T> {
    pub date: NaiveDate,
    pub values: HashMap<String, T>,
}

impl<T> DailyRecord<T> {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            values: HashMap::new(),
        }
    }
}

/// Key/value cache whose entries all expire together at local midnight.
pub struct DailyCache<T> {
    id: String,
    backend: Arc<dyn CacheBackend>,
    // Serializes the read-modify-write cycle so concurrent sets on different
    // keys cannot lose each other's updates.
    lock: Mutex<()>,
    _marker: PhantomData<T>,
}

impl<T> DailyCache<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(id: &str, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            id: id.to_string(),
            backend,
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let _guard = self.lock.lock().await;
        let record = self.load_for_today();
        let value = record.values.get(key).cloned();
        if value.is_some() {
            debug!(cache = %self.id, key, "Cache HIT");
        } else {
            debug!(cache = %self.id, key, "Cache MISS");
        }
        value
    }

    pub async fn set(&self, key: &str, value: T) {
        let _guard = self.lock.lock().await;
        let mut record = self.load_for_today();
        debug!(cache = %self.id, key, "Cache PUT");
        record.values.insert(key.to_string(), value);
        self.persist(&record);
    }

    /// Loads the persisted record, resetting it to an empty record stamped
    /// with today's local date when it is missing, unreadable or stale.
    fn load_for_today(&self) -> DailyRecord<T> {
        let today = Local::now().date_naive();
        let loaded = match self.backend.read(&self.id) {
            Ok(Some(bytes)) => serde_json::from_slice::<DailyRecord<T>>(&bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = %self.id, error = %e, "Cache backend read failed");
                None
            }
        };

        match loaded {
            Some(record) if record.date == today => record,
            Some(record) => {
                debug!(
                    cache = %self.id,
                    stored = %record.date,
                    "Cache record stale, resetting for today"
                );
                let fresh = DailyRecord::empty(today);
                self.persist(&fresh);
                fresh
            }
            None => {
                let fresh = DailyRecord::empty(today);
                self.persist(&fresh);
                fresh
            }
        }
    }

    fn persist(&self, record: &DailyRecord<T>) {
        let res: Result<()> = (|| {
            let bytes = serde_json::to_vec(record)?;
            self.backend.write(&self.id, &bytes)
        })();
        if let Err(e) = res {
            debug!(cache = %self.id, error = %e, "Cache backend write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::Duration;
    use tempfile::tempdir;

    fn write_record(backend: &MemoryBackend, id: &str, date: NaiveDate, values: &[(&str, i32)]) {
        let record = DailyRecord {
            date,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>(),
        };
        backend
            .write(id, &serde_json::to_vec(&record).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_set_same_day() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = DailyCache::<i32>::new("rates", backend);

        assert!(cache.get("EUR").await.is_none());
        cache.set("EUR", 42).await;
        assert_eq!(cache.get("EUR").await, Some(42));
        assert!(cache.get("GBP").await.is_none());
    }

    #[tokio::test]
    async fn test_yesterday_record_is_discarded() {
        let backend = Arc::new(MemoryBackend::new());
        let yesterday = Local::now().date_naive() - Duration::days(1);
        write_record(&backend, "rates", yesterday, &[("EUR", 42)]);

        let cache = DailyCache::<i32>::new("rates", Arc::clone(&backend) as Arc<dyn CacheBackend>);
        assert!(cache.get("EUR").await.is_none());

        // The reset record is re-stamped with today's date
        let bytes = backend.read("rates").unwrap().unwrap();
        let record: DailyRecord<i32> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record.date, Local::now().date_naive());
        assert!(record.values.is_empty());
    }

    #[tokio::test]
    async fn test_todays_record_survives() {
        let backend = Arc::new(MemoryBackend::new());
        let today = Local::now().date_naive();
        write_record(&backend, "rates", today, &[("EUR", 42)]);

        let cache = DailyCache::<i32>::new("rates", backend);
        assert_eq!(cache.get("EUR").await, Some(42));
    }

    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn read(&self, _id: &str) -> Result<Option<Vec<u8>>> {
            Err(anyhow!("backend unavailable"))
        }

        fn write(&self, _id: &str, _bytes: &[u8]) -> Result<()> {
            Err(anyhow!("backend unavailable"))
        }
    }

    #[tokio::test]
    async fn test_unavailable_backend_degrades_to_miss() {
        let cache = DailyCache::<i32>::new("rates", Arc::new(FailingBackend));

        cache.set("EUR", 42).await;
        assert!(cache.get("EUR").await.is_none());
    }

    #[tokio::test]
    async fn test_fjall_backend_round_trip() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(FjallBackend::open(dir.path()).unwrap());
        let cache = DailyCache::<String>::new("rates", backend);

        cache.set("currency-EUR", "0.92".to_string()).await;
        assert_eq!(cache.get("currency-EUR").await, Some("0.92".to_string()));
    }
}
