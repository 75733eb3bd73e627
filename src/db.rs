use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{
    Client, Collection, Database as MongoDatabase, IndexModel,
    bson::{self, Document, doc, oid::ObjectId, to_document},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Mutex;

use crate::config::CONFIG;
use crate::data_models::{Candidate, CandidateData, SearchHistory};

/// Collection names as constants for consistency
pub mod collections {
    pub const CANDIDATES: &str = "candidates";
    pub const SEARCH_HISTORY: &str = "search_history";
}

/// Persistence seam of the pipeline. Candidates are keyed by `profile_url`.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Cheap reachability check, run once before a search touches the store.
    async fn ping(&self) -> Result<()>;

    /// Inserts or overwrites the candidate with the same `profile_url`.
    /// `created_at` is kept from the first insert; `updated_at` is refreshed.
    async fn upsert(&self, data: &CandidateData) -> Result<Candidate>;

    async fn select_by_urls(&self, urls: &[String]) -> Result<Vec<Candidate>>;

    /// The subset of `urls` whose record was updated at or after `cutoff`.
    async fn select_fresh(&self, urls: &[String], cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    async fn record_search(&self, history: &SearchHistory) -> Result<()>;
}

/// Main database wrapper providing connection management and collection access
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: MongoDatabase,
}

impl Database {
    /// Builds a client for `uri`. The driver connects lazily; use [`Database::ping`]
    /// to check the server is actually reachable.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;
        let db = client.database(db_name);

        log::info!("Using MongoDB database: {}", db_name);
        Ok(Self { client, db })
    }

    /// Create a Database instance using environment configuration
    pub async fn from_config() -> Result<Self> {
        Self::new(&CONFIG.mongo_uri, &CONFIG.mongo_db_name).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;
        Ok(())
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn candidates(&self) -> Collection<CandidateRecord> {
        self.collection(collections::CANDIDATES)
    }

    pub fn search_history(&self) -> Collection<Document> {
        self.collection(collections::SEARCH_HISTORY)
    }
}

// =============================================================================
// Generic operations
// =============================================================================

pub struct Repository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    /// Insert a single document
    pub async fn insert(&self, doc: &T) -> Result<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .context("Failed to insert document")?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get inserted ObjectId"))
    }

    /// Find a single document matching a filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document")
    }

    /// Find all documents matching a filter
    pub async fn find(&self, filter: Document) -> Result<Vec<T>> {
        let cursor = self
            .collection
            .find(filter)
            .await
            .context("Failed to execute find query")?;

        cursor
            .try_collect()
            .await
            .context("Failed to collect results")
    }

    /// Applies `update` to the document matching `filter`, inserting it when
    /// absent, and returns the document as stored afterwards.
    pub async fn upsert(&self, filter: Document, update: Document) -> Result<T> {
        self.collection
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to upsert document")?
            .ok_or_else(|| anyhow::anyhow!("Upsert returned no document"))
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64> {
        self.collection
            .count_documents(filter)
            .await
            .context("Failed to count documents")
    }
}

// =============================================================================
// Candidate collection
// =============================================================================

/// Stored shape of a candidate: the candidate fields plus Mongo identity and
/// BSON timestamps.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CandidateRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(flatten)]
    pub data: CandidateData,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl From<CandidateRecord> for Candidate {
    fn from(record: CandidateRecord) -> Candidate {
        Candidate {
            id: record.id.to_hex(),
            data: record.data,
            created_at: to_chrono(record.created_at),
            updated_at: to_chrono(record.updated_at),
        }
    }
}

fn to_chrono(dt: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

fn to_bson(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(dt.timestamp_millis())
}

pub struct CandidateRepo {
    db: Database,
    repo: Repository<CandidateRecord>,
    history: Repository<Document>,
}

impl CandidateRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            repo: Repository::new(db.candidates()),
            history: Repository::new(db.search_history()),
        }
    }

    /// Unique index backing the `profile_url` upsert key.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let model = IndexModel::builder()
            .keys(doc! { "profile_url": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.db
            .candidates()
            .create_index(model)
            .await
            .context("Failed to create profile_url index")?;
        Ok(())
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<Candidate>> {
        Ok(self
            .repo
            .find_one(doc! { "profile_url": url })
            .await?
            .map(Candidate::from))
    }

    pub async fn count(&self) -> Result<u64> {
        self.repo.count(doc! {}).await
    }
}

#[async_trait]
impl CandidateStore for CandidateRepo {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn upsert(&self, data: &CandidateData) -> Result<Candidate> {
        let now = bson::DateTime::now();
        let mut fields = to_document(data).context("Failed to serialize candidate")?;
        fields.insert("updated_at", now);

        let update = doc! {
            "$set": fields,
            "$setOnInsert": { "created_at": now },
        };
        let record = self
            .repo
            .upsert(doc! { "profile_url": &data.profile_url }, update)
            .await?;
        Ok(record.into())
    }

    async fn select_by_urls(&self, urls: &[String]) -> Result<Vec<Candidate>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .repo
            .find(doc! { "profile_url": { "$in": urls.to_vec() } })
            .await?;
        Ok(records.into_iter().map(Candidate::from).collect())
    }

    async fn select_fresh(&self, urls: &[String], cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .repo
            .find(doc! {
                "profile_url": { "$in": urls.to_vec() },
                "updated_at": { "$gte": to_bson(cutoff) },
            })
            .await?;
        Ok(records.into_iter().map(|r| r.data.profile_url).collect())
    }

    async fn record_search(&self, history: &SearchHistory) -> Result<()> {
        let mut document = to_document(history).context("Failed to serialize search history")?;
        document.insert("created_at", to_bson(history.created_at));
        self.history.insert(&document).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store for offline runs and tests.
#[derive(Default)]
pub struct MemoryCandidateStore {
    candidates: DashMap<String, Candidate>,
    history: Mutex<Vec<SearchHistory>>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `candidate` as-is, timestamps included.
    pub fn insert_candidate(&self, candidate: Candidate) {
        self.candidates
            .insert(candidate.data.profile_url.clone(), candidate);
    }

    pub fn get(&self, url: &str) -> Option<Candidate> {
        self.candidates.get(url).map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn history(&self) -> Vec<SearchHistory> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, data: &CandidateData) -> Result<Candidate> {
        let now = Utc::now();
        let mut entry = self
            .candidates
            .entry(data.profile_url.clone())
            .or_insert_with(|| Candidate {
                id: nanoid::nanoid!(),
                data: data.clone(),
                created_at: now,
                updated_at: now,
            });
        entry.data = data.clone();
        entry.updated_at = now;
        Ok(entry.value().clone())
    }

    async fn select_by_urls(&self, urls: &[String]) -> Result<Vec<Candidate>> {
        Ok(urls.iter().filter_map(|url| self.get(url)).collect())
    }

    async fn select_fresh(&self, urls: &[String], cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(urls
            .iter()
            .filter(|url| {
                self.candidates
                    .get(url.as_str())
                    .is_some_and(|c| c.updated_at >= cutoff)
            })
            .cloned()
            .collect())
    }

    async fn record_search(&self, history: &SearchHistory) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| anyhow::anyhow!("search history lock poisoned"))?
            .push(history.clone());
        Ok(())
    }
}

// =============================================================================
// Test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Create a unique test database name
    pub fn unique_test_db_name() -> String {
        let count = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        format!("talent_harvest_test_{}_{}", Utc::now().timestamp_millis(), count)
    }

    /// Uses MONGO_URI from the environment with a fresh database name.
    pub async fn create_test_db() -> Result<(Database, String)> {
        dotenvy::dotenv().ok();
        let uri =
            std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name = unique_test_db_name();
        let db = Database::new(&uri, &db_name).await?;
        db.ping().await?;
        Ok((db, db_name))
    }

    pub async fn cleanup_test_db(db: &Database, db_name: &str) -> Result<()> {
        db.client()
            .database(db_name)
            .drop()
            .await
            .context("Failed to drop test database")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn data(url: &str, name: &str) -> CandidateData {
        CandidateData {
            full_name: name.to_string(),
            profile_url: url.to_string(),
            fit_score: Some(80),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn memory_upsert_keeps_identity_and_created_at() -> Result<()> {
        let store = MemoryCandidateStore::new();
        let first = store.upsert(&data("https://x/in/a", "A")).await?;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.upsert(&data("https://x/in/a", "A Renamed")).await?;

        assert_eq!(store.len(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.data.full_name, "A Renamed");
        Ok(())
    }

    #[tokio::test]
    async fn memory_select_fresh_respects_cutoff() -> Result<()> {
        let store = MemoryCandidateStore::new();
        let now = Utc::now();
        store.insert_candidate(Candidate {
            id: "1".into(),
            data: data("u1", "A"),
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::hours(2),
        });
        store.insert_candidate(Candidate {
            id: "2".into(),
            data: data("u2", "B"),
            created_at: now - Duration::hours(48),
            updated_at: now - Duration::hours(48),
        });

        let urls = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let fresh = store.select_fresh(&urls, now - Duration::hours(24)).await?;
        assert_eq!(fresh, vec!["u1".to_string()]);

        let found = store.select_by_urls(&urls).await?;
        assert_eq!(found.len(), 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_candidate_upsert_roundtrip() -> Result<()> {
        use test_utils::*;

        let (db, db_name) = create_test_db().await?;
        let repo = CandidateRepo::new(&db);
        repo.ensure_indexes().await?;

        let first = repo.upsert(&data("https://www.linkedin.com/in/a", "A")).await?;
        let second = repo
            .upsert(&data("https://www.linkedin.com/in/a", "A Renamed"))
            .await?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(repo.count().await?, 1);

        let found = repo.find_by_url("https://www.linkedin.com/in/a").await?;
        assert_eq!(found.map(|c| c.data.full_name), Some("A Renamed".to_string()));

        let urls = vec!["https://www.linkedin.com/in/a".to_string()];
        let fresh = repo
            .select_fresh(&urls, Utc::now() - Duration::hours(1))
            .await?;
        assert_eq!(fresh, urls);

        repo.record_search(&SearchHistory {
            natural_language_query: "rust".into(),
            generated_dork: "site:linkedin.com/in rust".into(),
            result_count: 1,
            query_count: 1,
            wide_net: false,
            pages_fetched: 3,
            created_at: Utc::now(),
        })
        .await?;

        cleanup_test_db(&db, &db_name).await?;
        Ok(())
    }
}
