//! Insight cache persistence

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{format_datetime, parse_datetime, Database};
use crate::cache::{CacheEntry, InsightStore};
use crate::error::Result;

/// Row counts for `tend status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheTableStatus {
    pub entries: usize,
    pub expired: usize,
    pub stale_schema: usize,
    pub next_expiry: Option<DateTime<Utc>>,
}

impl Database {
    /// Summary of the cache table as seen at `now` for `schema_version`
    pub fn cache_status(&self, now: DateTime<Utc>, schema_version: u32) -> Result<CacheTableStatus> {
        let conn = self.conn()?;
        let now = format_datetime(now);

        let (entries, expired, stale_schema): (i64, i64, i64) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN schema_version != ?2 THEN 1 ELSE 0 END), 0)
            FROM insight_cache
            "#,
            params![now, schema_version],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let next: Option<String> = conn
            .query_row(
                "SELECT MIN(expires_at) FROM insight_cache WHERE expires_at > ?",
                params![now],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();

        Ok(CacheTableStatus {
            entries: entries as usize,
            expired: expired as usize,
            stale_schema: stale_schema as usize,
            next_expiry: next.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

impl InsightStore for Database {
    fn load(&self, subject_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM insight_cache WHERE subject_id = ?",
                params![subject_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn save(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn()?;
        let payload = serde_json::to_string(entry)?;

        conn.execute(
            r#"
            INSERT INTO insight_cache (
                subject_id, payload, expires_at, schema_version, content_hash, source_tag, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(subject_id) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                schema_version = excluded.schema_version,
                content_hash = excluded.content_hash,
                source_tag = excluded.source_tag,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                entry.subject_id,
                payload,
                format_datetime(entry.expires_at),
                entry.schema_version,
                entry.content_hash,
                entry.source_tag.as_str(),
            ],
        )?;
        Ok(())
    }

    fn remove(&self, subject_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM insight_cache WHERE subject_id = ?",
            params![subject_id],
        )?;
        Ok(deleted > 0)
    }

    fn subjects(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT subject_id FROM insight_cache ORDER BY subject_id")?;
        let subjects = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(subjects)
    }
}
