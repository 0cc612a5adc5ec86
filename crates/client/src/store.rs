//! Redundant client-side persistence for the captured referral code.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use url::Url;

/// Fixed key/cookie name the reference is stored under.
pub const STORAGE_KEY: &str = "referral_ref";

/// Query parameter carrying an inbound referral code.
pub const REF_PARAM: &str = "ref";

/// Lifetime of a captured reference; older entries read as absent.
pub const REFERENCE_TTL_DAYS: i64 = 90;

fn reference_ttl() -> Duration {
    Duration::days(REFERENCE_TTL_DAYS)
}

/// Payload persisted in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredReference {
    code: String,
    captured_at: DateTime<Utc>,
}

/// One of the two redundant backing stores for the captured code.
///
/// `get` returns `None` for absent, expired, or undecodable entries; a
/// half-broken store must degrade to "nothing captured", never to an error
/// the user flow would see.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn put(&self, code: &str, captured_at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn get(&self, now: DateTime<Utc>) -> anyhow::Result<Option<String>>;
    async fn clear(&self) -> anyhow::Result<()>;
}

/// SQLite-backed durable store (lazy initialization).
///
/// The database is created on first use under the OS app-data directory.
#[derive(Debug, Clone)]
pub struct SqliteReferenceStore {
    pool: Arc<tokio::sync::Mutex<Option<SqlitePool>>>,
    db_path: PathBuf,
}

impl SqliteReferenceStore {
    /// Store under the default app-data location.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_path(default_db_path()?))
    }

    /// Store under an explicit path (tests, portable installs).
    pub fn with_path(db_path: PathBuf) -> Self {
        Self {
            pool: Arc::new(tokio::sync::Mutex::new(None)),
            db_path,
        }
    }

    async fn get_pool(&self) -> anyhow::Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory at {:?}", parent))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", self.db_path.to_string_lossy());
        let pool = SqlitePool::connect(&db_url)
            .await
            .with_context(|| format!("failed to open referral store at {:?}", self.db_path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create client_state table")?;

        *guard = Some(pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn put(&self, code: &str, captured_at: DateTime<Utc>) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        let payload = serde_json::to_string(&StoredReference {
            code: code.to_string(),
            captured_at,
        })
        .context("failed to serialize referral reference")?;

        sqlx::query(
            r#"
            INSERT INTO client_state (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(STORAGE_KEY)
        .bind(&payload)
        .execute(&pool)
        .await
        .context("failed to upsert referral reference")?;
        Ok(())
    }

    async fn get(&self, now: DateTime<Utc>) -> anyhow::Result<Option<String>> {
        let pool = self.get_pool().await?;
        let row = sqlx::query("SELECT value FROM client_state WHERE key = ?1")
            .bind(STORAGE_KEY)
            .fetch_optional(&pool)
            .await
            .context("failed to read referral reference")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("value")?;
        let reference: StoredReference = match serde_json::from_str(&payload) {
            Ok(reference) => reference,
            Err(err) => {
                tracing::warn!(error = %err, "discarding undecodable referral reference");
                return Ok(None);
            }
        };

        if now.signed_duration_since(reference.captured_at) > reference_ttl() {
            return Ok(None);
        }
        Ok(Some(reference.code))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM client_state WHERE key = ?1")
            .bind(STORAGE_KEY)
            .execute(&pool)
            .await
            .context("failed to clear referral reference")?;
        Ok(())
    }
}

/// Cookie access the embedding shell provides.
///
/// The shell is responsible for actually sending the cookie with requests;
/// that is what makes the server-side fallback in the attach endpoint work.
pub trait CookieJar: Send + Sync {
    fn set(&self, name: &str, value: &str, expires_at: DateTime<Utc>);
    fn get(&self, name: &str, now: DateTime<Utc>) -> Option<String>;
    fn remove(&self, name: &str);
}

/// In-memory jar for tests and the dev shell.
#[derive(Debug, Default)]
pub struct InMemoryCookieJar {
    inner: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl InMemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for InMemoryCookieJar {
    fn set(&self, name: &str, value: &str, expires_at: DateTime<Utc>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(name.to_string(), (value.to_string(), expires_at));
        }
    }

    fn get(&self, name: &str, now: DateTime<Utc>) -> Option<String> {
        let inner = self.inner.lock().ok()?;
        let (value, expires_at) = inner.get(name)?;
        if now >= *expires_at {
            return None;
        }
        Some(value.clone())
    }

    fn remove(&self, name: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.remove(name);
        }
    }
}

/// Cookie-backed reference store. The cookie holds the bare code (so the
/// server can read it straight off the request) and its expiry carries the
/// 90-day lifetime.
pub struct CookieReferenceStore {
    jar: Arc<dyn CookieJar>,
}

impl CookieReferenceStore {
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self { jar }
    }
}

#[async_trait]
impl ReferenceStore for CookieReferenceStore {
    async fn put(&self, code: &str, captured_at: DateTime<Utc>) -> anyhow::Result<()> {
        self.jar
            .set(STORAGE_KEY, code, captured_at + reference_ttl());
        Ok(())
    }

    async fn get(&self, now: DateTime<Utc>) -> anyhow::Result<Option<String>> {
        Ok(self.jar.get(STORAGE_KEY, now))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.jar.remove(STORAGE_KEY);
        Ok(())
    }
}

/// Client-side capture and redundant persistence of an inbound referral code.
pub struct ReferralCodeStore {
    durable: Arc<dyn ReferenceStore>,
    cookie: Arc<dyn ReferenceStore>,
}

impl ReferralCodeStore {
    pub fn new(durable: Arc<dyn ReferenceStore>, cookie: Arc<dyn ReferenceStore>) -> Self {
        Self { durable, cookie }
    }

    /// Extract the referral parameter from a visit URL and persist it.
    ///
    /// A visit without the parameter (or with an unparseable URL) returns
    /// `None` and leaves whatever was captured earlier untouched. Write
    /// failures are logged and swallowed; with two stores, one landing is
    /// enough.
    pub async fn capture(&self, visit_url: &str, now: DateTime<Utc>) -> Option<String> {
        let url = Url::parse(visit_url).ok()?;
        let code = url
            .query_pairs()
            .find(|(key, _)| key == REF_PARAM)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())?;

        if let Err(err) = self.durable.put(&code, now).await {
            tracing::warn!(error = %err, "durable referral store write failed");
        }
        if let Err(err) = self.cookie.put(&code, now).await {
            tracing::warn!(error = %err, "cookie referral store write failed");
        }
        Some(code)
    }

    /// Read the captured code: durable store first, cookie as fallback.
    pub async fn read(&self, now: DateTime<Utc>) -> Option<String> {
        match self.durable.get(now).await {
            Ok(Some(code)) => return Some(code),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "durable referral store read failed");
            }
        }
        match self.cookie.get(now).await {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!(error = %err, "cookie referral store read failed");
                None
            }
        }
    }

    /// Remove the reference from both stores (called after a successful
    /// attachment, or when the user logs out of the shell entirely).
    pub async fn clear(&self) {
        if let Err(err) = self.durable.clear().await {
            tracing::warn!(error = %err, "durable referral store clear failed");
        }
        if let Err(err) = self.cookie.clear().await {
            tracing::warn!(error = %err, "cookie referral store clear failed");
        }
    }
}

/// Resolve the default store path: `{app_data_dir}/referly/client.db`.
fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut home| {
                home.push(".local");
                home.push("share");
                home
            })
        })
        .context("failed to resolve OS app data directory")?;

    let mut dir = base;
    dir.push("referly");
    dir.push("client.db");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (ReferralCodeStore, Arc<InMemoryCookieJar>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(SqliteReferenceStore::with_path(dir.path().join("client.db")));
        let jar = Arc::new(InMemoryCookieJar::new());
        let cookie = Arc::new(CookieReferenceStore::new(jar.clone()));
        (ReferralCodeStore::new(durable, cookie), jar, dir)
    }

    #[tokio::test]
    async fn capture_writes_both_stores() {
        let (store, jar, _dir) = stores();
        let now = Utc::now();

        let code = store
            .capture("https://example.com/watch?v=1&ref=ABC123XY", now)
            .await;
        assert_eq!(code.as_deref(), Some("ABC123XY"));

        assert_eq!(store.read(now).await.as_deref(), Some("ABC123XY"));
        assert_eq!(jar.get(STORAGE_KEY, now).as_deref(), Some("ABC123XY"));
    }

    #[tokio::test]
    async fn visit_without_ref_does_not_erase_prior_capture() {
        let (store, _jar, _dir) = stores();
        let now = Utc::now();

        store
            .capture("https://example.com/?ref=ABC123XY", now)
            .await
            .unwrap();
        let none = store.capture("https://example.com/other-page", now).await;
        assert_eq!(none, None);

        assert_eq!(store.read(now).await.as_deref(), Some("ABC123XY"));
    }

    #[tokio::test]
    async fn read_falls_back_to_cookie_when_durable_is_empty() {
        let (store, _jar, _dir) = stores();
        let now = Utc::now();

        store
            .capture("https://example.com/?ref=ABC123XY", now)
            .await
            .unwrap();
        // Simulate the durable store being wiped (e.g. app data cleared).
        store.durable.clear().await.unwrap();

        assert_eq!(store.read(now).await.as_deref(), Some("ABC123XY"));
    }

    #[tokio::test]
    async fn expired_references_read_as_absent() {
        let (store, _jar, _dir) = stores();
        let captured = Utc::now();
        let later = captured + Duration::days(REFERENCE_TTL_DAYS + 1);

        store
            .capture("https://example.com/?ref=ABC123XY", captured)
            .await
            .unwrap();

        assert!(store.read(later).await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_both_stores() {
        let (store, jar, _dir) = stores();
        let now = Utc::now();

        store
            .capture("https://example.com/?ref=ABC123XY", now)
            .await
            .unwrap();
        store.clear().await;

        assert!(store.read(now).await.is_none());
        assert!(jar.get(STORAGE_KEY, now).is_none());
    }

    #[tokio::test]
    async fn undecodable_durable_payloads_degrade_to_absent() {
        let dir = tempfile::tempdir().unwrap();
        let durable = SqliteReferenceStore::with_path(dir.path().join("client.db"));
        let now = Utc::now();

        durable.put("ABC123XY", now).await.unwrap();
        let pool = durable.get_pool().await.unwrap();
        sqlx::query("UPDATE client_state SET value = 'not-json' WHERE key = ?1")
            .bind(STORAGE_KEY)
            .execute(&pool)
            .await
            .unwrap();

        assert!(durable.get(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capture_rejects_garbage_urls() {
        let (store, _jar, _dir) = stores();
        assert!(store.capture("not a url", Utc::now()).await.is_none());
        assert!(store.capture("https://example.com/?ref=", Utc::now()).await.is_none());
    }
}
