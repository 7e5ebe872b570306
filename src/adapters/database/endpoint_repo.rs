use crate::domain::endpoint::{Endpoint, EndpointStats, canonicalize_url};
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashSet;

/// Upper bound on ids removed per DELETE statement.
const DELETE_CHUNK: usize = 500;
/// Upper bound on ids selected per cleanup round.
const CLEANUP_SELECT_CHUNK: i64 = 1000;

/// Counts reported by a bulk registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkCreateOutcome {
    pub created: u64,
    pub reactivated: u64,
    pub duplicates: u64,
}

#[derive(Clone, Debug, Default)]
pub struct EndpointRepository {}

impl EndpointRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts the canonical form of `url`, reviving a soft-deleted row when
    /// one exists. An already-active row is returned untouched.
    ///
    /// # Errors
    /// Returns a database error if the upsert fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn create_or_reactivate(&self, conn: &mut SqliteConnection, url: &str) -> Result<Endpoint> {
        let canonical = canonicalize_url(url);
        if let Some(existing) = self.find_by_url(&mut *conn, &canonical).await?
            && existing.is_active
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let row = sqlx::query_as::<_, Endpoint>(
            r#"
            INSERT INTO webhooks (url, is_active, created_at, updated_at)
            VALUES (?1, TRUE, ?2, ?2)
            ON CONFLICT (url) DO UPDATE
            SET is_active = TRUE, updated_at = ?2
            RETURNING id, url, is_active, description, created_at, updated_at
            "#,
        )
        .bind(&canonical)
        .bind(now)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn find_active(&self, conn: &mut SqliteConnection) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query_as::<_, Endpoint>(
            "SELECT id, url, is_active, description, created_at, updated_at \
             FROM webhooks WHERE is_active = TRUE ORDER BY id",
        )
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn find_by_id(&self, conn: &mut SqliteConnection, id: i64) -> Result<Option<Endpoint>> {
        let row = sqlx::query_as::<_, Endpoint>(
            "SELECT id, url, is_active, description, created_at, updated_at FROM webhooks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Looks a row up by the canonical form of `url`.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, url), err)]
    pub async fn find_by_url(&self, conn: &mut SqliteConnection, url: &str) -> Result<Option<Endpoint>> {
        let canonical = canonicalize_url(url);
        let row = sqlx::query_as::<_, Endpoint>(
            "SELECT id, url, is_active, description, created_at, updated_at FROM webhooks WHERE url = ?1",
        )
        .bind(canonical)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Soft-deletes an endpoint.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if no row has this id.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn deactivate(&self, conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE webhooks SET is_active = FALSE, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Physically removes rows, chunked to bound statement size. Returns how
    /// many rows were deleted.
    ///
    /// # Errors
    /// Returns a database error if a delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn, ids), fields(count = ids.len()), err)]
    pub async fn delete_permanent(&self, conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64> {
        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM webhooks WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            query.push(")");
            deleted += query.build().execute(&mut *conn).await?.rows_affected();
        }
        Ok(deleted)
    }

    /// Physically deletes inactive rows untouched for more than `age_days`,
    /// selecting ids in bounded rounds until none remain.
    ///
    /// # Errors
    /// Returns a database error if a select or delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn cleanup_older_inactive(&self, conn: &mut SqliteConnection, age_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(age_days);
        let mut total = 0;
        loop {
            let ids: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM webhooks WHERE is_active = FALSE AND updated_at < ?1 LIMIT ?2",
            )
            .bind(cutoff)
            .bind(CLEANUP_SELECT_CHUNK)
            .fetch_all(&mut *conn)
            .await?;
            if ids.is_empty() {
                break;
            }
            total += self.delete_permanent(&mut *conn, &ids).await?;
        }
        Ok(total)
    }

    /// One aggregate pass over the table.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub async fn stats(&self, conn: &mut SqliteConnection) -> Result<EndpointStats> {
        let now = Utc::now();
        let old_cutoff = now - Duration::days(30);
        let recent_cutoff = now - Duration::days(7);
        let (total, active, inactive, old_inactive, recent_inactive): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(is_active), 0),
                    COALESCE(SUM(CASE WHEN is_active = FALSE THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_active = FALSE AND updated_at < ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_active = FALSE AND updated_at > ?2 THEN 1 ELSE 0 END), 0)
                FROM webhooks
                "#,
            )
            .bind(old_cutoff)
            .bind(recent_cutoff)
            .fetch_one(conn)
            .await?;
        Ok(EndpointStats { total, active, inactive, old_inactive, recent_inactive })
    }

    /// Registers a batch of URLs, deduplicating canonical forms within the
    /// input before touching the table.
    ///
    /// # Errors
    /// Returns a database error if any lookup or insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, urls), fields(count = urls.len()), err)]
    pub async fn bulk_create(&self, conn: &mut SqliteConnection, urls: &[String]) -> Result<BulkCreateOutcome> {
        let mut outcome = BulkCreateOutcome::default();
        let mut seen = HashSet::new();
        for url in urls {
            let canonical = canonicalize_url(url);
            if !seen.insert(canonical.clone()) {
                outcome.duplicates += 1;
                continue;
            }
            match self.find_by_url(&mut *conn, &canonical).await? {
                Some(existing) if existing.is_active => outcome.duplicates += 1,
                Some(_) => {
                    self.create_or_reactivate(&mut *conn, &canonical).await?;
                    outcome.reactivated += 1;
                }
                None => {
                    self.create_or_reactivate(&mut *conn, &canonical).await?;
                    outcome.created += 1;
                }
            }
        }
        Ok(outcome)
    }
}
