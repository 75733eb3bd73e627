use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::db::CandidateStore;

/// Split of profile URLs by whether the store already holds a fresh record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CachePartition {
    pub cached: Vec<String>,
    pub to_process: Vec<String>,
}

impl CachePartition {
    /// Nothing is considered cached.
    pub fn all_uncached(urls: &[String]) -> CachePartition {
        CachePartition {
            cached: Vec::new(),
            to_process: urls.to_vec(),
        }
    }
}

pub struct CacheGate {
    store: Arc<dyn CandidateStore>,
    max_age_hours: i64,
}

impl CacheGate {
    pub fn new(store: Arc<dyn CandidateStore>, max_age_hours: i64) -> CacheGate {
        CacheGate {
            store,
            max_age_hours,
        }
    }

    /// Oldest `updated_at` that still counts as fresh. Negative ages count as
    /// zero; an age too large to represent makes every record fresh.
    fn cutoff(&self) -> DateTime<Utc> {
        let now = Utc::now();
        Duration::try_hours(self.max_age_hours.max(0))
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Partitions `urls` into recently enriched and still-to-enrich, keeping
    /// input order in both halves. A store failure counts every URL as uncached.
    pub async fn partition(&self, urls: &[String]) -> CachePartition {
        if urls.is_empty() {
            return CachePartition::default();
        }

        let fresh: HashSet<String> = match self.store.select_fresh(urls, self.cutoff()).await {
            Ok(fresh) => fresh.into_iter().collect(),
            Err(e) => {
                log::warn!("cache lookup failed, enriching everything: {e:#}");
                return CachePartition::all_uncached(urls);
            }
        };

        let (cached, to_process): (Vec<String>, Vec<String>) =
            urls.iter().cloned().partition(|url| fresh.contains(url));
        CachePartition { cached, to_process }
    }
}
