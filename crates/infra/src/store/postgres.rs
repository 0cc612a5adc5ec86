//! Postgres-backed stores.
//!
//! The correctness-critical conditionals are pushed into single SQL
//! statements (`UPDATE … WHERE referred_by IS NULL`, `INSERT … ON CONFLICT
//! DO NOTHING`, `SET impressions = impressions + 1`) so concurrent requests
//! coordinate through the database rather than through application-level
//! read-then-write sequences. The ad-event dedup window cannot be expressed
//! as a uniqueness constraint, so that path serializes per `(ad, kind, ip)`
//! key with a transaction-scoped advisory lock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use referly_ads::{Ad, AdEvent, AdEventKind};
use referly_core::{AccountId, AdId, ClickId};
use referly_earnings::{EarningsEvent, OrderId, TierCredit};
use referly_referral::{AccountProfile, ReferralClick, ReferralCode};

use super::{AdStore, ClickStore, EarningsStore, ProfileStore, StoreError};

/// Create the schema idempotently.
///
/// Called at startup when persistent stores are enabled; every statement is
/// `IF NOT EXISTS` so reruns are no-ops.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id             UUID PRIMARY KEY,
            display_name   TEXT NOT NULL,
            referral_code  TEXT NOT NULL UNIQUE,
            referred_by    UUID NULL,
            referred_click UUID NULL,
            created_at     TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS referral_clicks (
            id         UUID PRIMARY KEY,
            code       TEXT NOT NULL,
            referrer   UUID NULL,
            ip         TEXT NOT NULL,
            user_agent TEXT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS earnings_events (
            order_id     TEXT PRIMARY KEY,
            buyer        UUID NOT NULL,
            gross_amount BIGINT NOT NULL,
            currency     TEXT NOT NULL,
            created_at   TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS balances (
            account_id UUID NOT NULL,
            currency   TEXT NOT NULL,
            amount     BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (account_id, currency)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ads (
            id          UUID PRIMARY KEY,
            title       TEXT NOT NULL,
            placement   TEXT NOT NULL,
            target_url  TEXT NULL,
            start_date  DATE NULL,
            end_date    DATE NULL,
            active      BOOLEAN NOT NULL DEFAULT TRUE,
            impressions BIGINT NOT NULL DEFAULT 0,
            clicks      BIGINT NOT NULL DEFAULT 0,
            created_at  TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ad_events (
            id         BIGSERIAL PRIMARY KEY,
            ad_id      UUID NOT NULL,
            kind       TEXT NOT NULL,
            ip         TEXT NOT NULL,
            user_agent TEXT NULL,
            referrer   TEXT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ad_events_dedup_idx
            ON ad_events (ad_id, kind, ip, created_at DESC)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(store_error)?;
    }
    Ok(())
}

fn store_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        return StoreError::DuplicateCode;
    }
    StoreError::unavailable(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn profile_from_row(row: &sqlx::postgres::PgRow) -> Result<AccountProfile, StoreError> {
    let code: String = row.try_get("referral_code").map_err(store_error)?;
    let referral_code: ReferralCode = code
        .parse()
        .map_err(|e| StoreError::Malformed(format!("referral_code: {e}")))?;
    Ok(AccountProfile {
        id: AccountId::from_uuid(row.try_get::<Uuid, _>("id").map_err(store_error)?),
        display_name: row.try_get("display_name").map_err(store_error)?,
        referral_code,
        referred_by: row
            .try_get::<Option<Uuid>, _>("referred_by")
            .map_err(store_error)?
            .map(AccountId::from_uuid),
        referred_click: row
            .try_get::<Option<Uuid>, _>("referred_click")
            .map_err(store_error)?
            .map(ClickId::from_uuid),
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(store_error)?,
    })
}

const PROFILE_COLUMNS: &str =
    "id, display_name, referral_code, referred_by, referred_click, created_at";

/// Postgres-backed profile store.
#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn insert(&self, profile: AccountProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, display_name, referral_code, referred_by, referred_click, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(profile.id.as_uuid())
        .bind(&profile.display_name)
        .bind(profile.referral_code.as_str())
        .bind(profile.referred_by.map(|id| *id.as_uuid()))
        .bind(profile.referred_click.map(|id| *id.as_uuid()))
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<AccountProfile>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<AccountProfile>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE referral_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn attach_referrer(
        &self,
        account: AccountId,
        referrer: AccountId,
        click: Option<ClickId>,
    ) -> Result<bool, StoreError> {
        // Conditioned on the column still being NULL; the losing writer of a
        // race sees zero rows affected.
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET referred_by = $2, referred_click = $3
            WHERE id = $1 AND referred_by IS NULL
            "#,
        )
        .bind(account.as_uuid())
        .bind(referrer.as_uuid())
        .bind(click.map(|id| *id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM profiles WHERE id = $1")
            .bind(account.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound),
        }
    }

    async fn rotate_code(
        &self,
        account: AccountId,
        new_code: ReferralCode,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE profiles SET referral_code = $2 WHERE id = $1")
            .bind(account.as_uuid())
            .bind(new_code.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// Postgres-backed append-only click log.
#[derive(Debug, Clone)]
pub struct PgClickStore {
    pool: PgPool,
}

impl PgClickStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClickStore for PgClickStore {
    async fn append(&self, click: ReferralClick) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO referral_clicks (id, code, referrer, ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(click.id.as_uuid())
        .bind(&click.code)
        .bind(click.referrer.map(|id| *id.as_uuid()))
        .bind(click.ip.to_string())
        .bind(&click.user_agent)
        .bind(click.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

/// Postgres-backed earnings ledger storage.
#[derive(Debug, Clone)]
pub struct PgEarningsStore {
    pool: PgPool,
}

impl PgEarningsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EarningsStore for PgEarningsStore {
    async fn record_order(
        &self,
        event: EarningsEvent,
        credits: &[TierCredit],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Insert-if-absent keyed by order_id closes the replay race; the
        // credits ride in the same transaction so a replay applies nothing.
        let inserted = sqlx::query(
            r#"
            INSERT INTO earnings_events (order_id, buyer, gross_amount, currency, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(event.order_id.as_str())
        .bind(event.buyer.as_uuid())
        .bind(event.gross_amount)
        .bind(&event.currency)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Ok(false);
        }

        for credit in credits {
            sqlx::query(
                r#"
                INSERT INTO balances (account_id, currency, amount)
                VALUES ($1, $2, $3)
                ON CONFLICT (account_id, currency)
                DO UPDATE SET amount = balances.amount + EXCLUDED.amount
                "#,
            )
            .bind(credit.account.as_uuid())
            .bind(&credit.currency)
            .bind(credit.amount)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Option<EarningsEvent>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT order_id, buyer, gross_amount, currency, created_at
            FROM earnings_events
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order_id: String = row.try_get("order_id").map_err(store_error)?;
        Ok(Some(EarningsEvent {
            order_id: order_id
                .parse()
                .map_err(|e| StoreError::Malformed(format!("order_id: {e}")))?,
            buyer: AccountId::from_uuid(row.try_get::<Uuid, _>("buyer").map_err(store_error)?),
            gross_amount: row.try_get("gross_amount").map_err(store_error)?,
            currency: row.try_get("currency").map_err(store_error)?,
            created_at: row.try_get("created_at").map_err(store_error)?,
        }))
    }

    async fn balance(&self, account: AccountId, currency: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT amount FROM balances WHERE account_id = $1 AND currency = $2")
            .bind(account.as_uuid())
            .bind(currency)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(row) => row.try_get("amount").map_err(store_error),
            None => Ok(0),
        }
    }
}

fn ad_from_row(row: &sqlx::postgres::PgRow) -> Result<Ad, StoreError> {
    Ok(Ad {
        id: AdId::from_uuid(row.try_get::<Uuid, _>("id").map_err(store_error)?),
        title: row.try_get("title").map_err(store_error)?,
        placement: row.try_get("placement").map_err(store_error)?,
        target_url: row.try_get("target_url").map_err(store_error)?,
        start_date: row
            .try_get::<Option<NaiveDate>, _>("start_date")
            .map_err(store_error)?,
        end_date: row
            .try_get::<Option<NaiveDate>, _>("end_date")
            .map_err(store_error)?,
        active: row.try_get("active").map_err(store_error)?,
        impressions: row.try_get("impressions").map_err(store_error)?,
        clicks: row.try_get("clicks").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
    })
}

const AD_COLUMNS: &str =
    "id, title, placement, target_url, start_date, end_date, active, impressions, clicks, created_at";

/// Postgres-backed ad store.
#[derive(Debug, Clone)]
pub struct PgAdStore {
    pool: PgPool,
}

impl PgAdStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn counter_statement(kind: AdEventKind) -> &'static str {
        match kind {
            AdEventKind::Impression => {
                "UPDATE ads SET impressions = impressions + 1 WHERE id = $1"
            }
            AdEventKind::Click => "UPDATE ads SET clicks = clicks + 1 WHERE id = $1",
        }
    }
}

#[async_trait]
impl AdStore for PgAdStore {
    async fn insert(&self, ad: Ad) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ads (id, title, placement, target_url, start_date, end_date,
                             active, impressions, clicks, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(ad.id.as_uuid())
        .bind(&ad.title)
        .bind(&ad.placement)
        .bind(&ad.target_url)
        .bind(ad.start_date)
        .bind(ad.end_date)
        .bind(ad.active)
        .bind(ad.impressions)
        .bind(ad.clicks)
        .bind(ad.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, id: AdId) -> Result<Option<Ad>, StoreError> {
        let row = sqlx::query(&format!("SELECT {AD_COLUMNS} FROM ads WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(ad_from_row).transpose()
    }

    async fn active_for_placement(&self, placement: &str) -> Result<Vec<Ad>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE active AND placement = $1 ORDER BY created_at"
        ))
        .bind(placement)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(ad_from_row).collect()
    }

    async fn record_event(&self, event: AdEvent, window: Duration) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // The dedup window has no uniqueness constraint to lean on, so
        // concurrent deliveries for the same viewer serialize on an advisory
        // lock scoped to this transaction.
        let lock_key = format!("{}:{}:{}", event.ad_id, event.kind, event.ip);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let cutoff = event.created_at - window;
        let recent = sqlx::query(
            r#"
            SELECT 1 FROM ad_events
            WHERE ad_id = $1 AND kind = $2 AND ip = $3 AND created_at > $4
            LIMIT 1
            "#,
        )
        .bind(event.ad_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(event.ip.to_string())
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        if recent.is_some() {
            tx.rollback().await.map_err(store_error)?;
            return Ok(false);
        }

        let bumped = sqlx::query(Self::counter_statement(event.kind))
            .bind(event.ad_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        if bumped.rows_affected() == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Err(StoreError::NotFound);
        }

        insert_ad_event(&mut tx, &event).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }

    async fn record_click_through(&self, event: AdEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let bumped = sqlx::query(Self::counter_statement(event.kind))
            .bind(event.ad_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        if bumped.rows_affected() == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Err(StoreError::NotFound);
        }

        insert_ad_event(&mut tx, &event).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}

async fn insert_ad_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &AdEvent,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO ad_events (ad_id, kind, ip, user_agent, referrer, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.ad_id.as_uuid())
    .bind(event.kind.as_str())
    .bind(event.ip.to_string())
    .bind(&event.user_agent)
    .bind(&event.referrer)
    .bind(event.created_at)
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;
    Ok(())
}
