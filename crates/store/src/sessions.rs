//! Session rows: lifecycle, expiry, the per-session request counter, and
//! the recent-session query the memory service banks on.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use zipsa_domain::error::{Error, Result};

use crate::db::Store;

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub session_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metadata: Value,
}

impl SessionRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn parse_ts(s: String) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .map_err(|e| Error::Store(format!("bad timestamp {s}: {e}")))
}

impl Store {
    /// Create a new session with the given idle lifetime.
    pub fn create_session(
        &self,
        user_id: Option<&str>,
        ttl_minutes: u64,
    ) -> Result<SessionRow> {
        let now = Utc::now();
        let row = SessionRow {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_owned),
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes as i64),
            last_activity: now,
            metadata: serde_json::json!({}),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, created_at, expires_at, last_activity, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.session_id,
                row.user_id,
                row.created_at.to_rfc3339(),
                row.expires_at.to_rfc3339(),
                row.last_activity.to_rfc3339(),
                row.metadata.to_string(),
            ],
        )
        .map_err(|e| Error::Store(e.to_string()))?;

        if let Some(uid) = &row.user_id {
            conn.execute(
                "INSERT OR IGNORE INTO chat_sessions (session_id, user_id, metadata)
                 VALUES (?1, ?2, '{}')",
                params![row.session_id, uid],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        }

        Ok(row)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT session_id, user_id, created_at, expires_at, last_activity, metadata
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))?;

        row.map(|(sid, uid, created, expires, activity, meta)| {
            Ok(SessionRow {
                session_id: sid,
                user_id: uid,
                created_at: parse_ts(created)?,
                expires_at: parse_ts(expires)?,
                last_activity: parse_ts(activity)?,
                metadata: serde_json::from_str(&meta).unwrap_or_else(|_| serde_json::json!({})),
            })
        })
        .transpose()
    }

    /// Refresh the activity stamp and slide the expiry window forward.
    pub fn touch_session(&self, session_id: &str, ttl_minutes: u64) -> Result<()> {
        let now = Utc::now();
        let expires = now + Duration::minutes(ttl_minutes as i64);
        self.conn
            .lock()
            .execute(
                "UPDATE sessions SET last_activity = ?1, expires_at = ?2 WHERE session_id = ?3",
                params![now.to_rfc3339(), expires.to_rfc3339(), session_id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let n = self
            .conn
            .lock()
            .execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(n > 0)
    }

    /// Allocate the next monotone request id for a session, persisted in
    /// the session metadata.
    pub fn next_request_id(&self, session_id: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let meta: Option<String> = conn
            .query_row(
                "SELECT metadata FROM sessions WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut meta: Value = meta
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        let next = meta
            .get("request_counter")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + 1;
        meta["request_counter"] = serde_json::json!(next);

        conn.execute(
            "UPDATE sessions SET metadata = ?1 WHERE session_id = ?2",
            params![meta.to_string(), session_id],
        )
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(next)
    }

    /// Sessions of a user ordered by most recent activity, excluding one
    /// session id, bounded by `limit`.
    pub fn recent_sessions_for_user(
        &self,
        user_id: &str,
        exclude_session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT session_id, user_id, created_at, expires_at, last_activity, metadata
                 FROM sessions
                 WHERE user_id = ?1 AND session_id != ?2
                 ORDER BY last_activity DESC
                 LIMIT ?3",
            )
            .map_err(|e| Error::Store(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id, exclude_session_id, limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (sid, uid, created, expires, activity, meta) =
                row.map_err(|e| Error::Store(e.to_string()))?;
            out.push(SessionRow {
                session_id: sid,
                user_id: uid,
                created_at: parse_ts(created)?,
                expires_at: parse_ts(expires)?,
                last_activity: parse_ts(activity)?,
                metadata: serde_json::from_str(&meta).unwrap_or_else(|_| serde_json::json!({})),
            });
        }
        Ok(out)
    }

    /// Delete every expired session; returns the removed ids so callers
    /// can clean dependent registries (pending interrupts).
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT session_id FROM sessions WHERE expires_at <= ?1")
            .map_err(|e| Error::Store(e.to_string()))?;
        let ids: Vec<String> = stmt
            .query_map(params![now.to_rfc3339()], |r| r.get(0))
            .map_err(|e| Error::Store(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        if !ids.is_empty() {
            conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now.to_rfc3339()],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        }
        Ok(ids)
    }

    // ── chat_sessions: the summary cache ───────────────────────────

    /// Cached conversation summary for a session, if one was written.
    pub fn get_cached_summary(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let meta: Option<String> = conn
            .query_row(
                "SELECT metadata FROM chat_sessions WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))?;

        Ok(meta
            .and_then(|m| serde_json::from_str::<Value>(&m).ok())
            .and_then(|m| m.get("summary").and_then(Value::as_str).map(str::to_owned)))
    }

    /// Upsert the summary cache. Lost updates are tolerated — summaries
    /// are idempotent enough.
    pub fn set_cached_summary(&self, session_id: &str, user_id: &str, summary: &str) -> Result<()> {
        let conn = self.conn.lock();
        let meta: Option<String> = conn
            .query_row(
                "SELECT metadata FROM chat_sessions WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut meta: Value = meta
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        meta["summary"] = serde_json::json!(summary);

        conn.execute(
            "INSERT INTO chat_sessions (session_id, user_id, metadata) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET metadata = ?3",
            params![session_id, user_id, meta.to_string()],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_touch_delete() {
        let store = Store::open_in_memory().unwrap();
        let row = store.create_session(Some("u1"), 60).unwrap();
        assert!(!row.is_expired(Utc::now()));

        let got = store.get_session(&row.session_id).unwrap().unwrap();
        assert_eq!(got.user_id.as_deref(), Some("u1"));

        store.touch_session(&row.session_id, 60).unwrap();
        assert!(store.delete_session(&row.session_id).unwrap());
        assert!(store.get_session(&row.session_id).unwrap().is_none());
    }

    #[test]
    fn request_ids_are_monotone() {
        let store = Store::open_in_memory().unwrap();
        let row = store.create_session(None, 60).unwrap();
        assert_eq!(store.next_request_id(&row.session_id).unwrap(), 1);
        assert_eq!(store.next_request_id(&row.session_id).unwrap(), 2);
        assert_eq!(store.next_request_id(&row.session_id).unwrap(), 3);
    }

    #[test]
    fn recent_sessions_excludes_current_and_orders_desc() {
        let store = Store::open_in_memory().unwrap();
        let a = store.create_session(Some("u1"), 60).unwrap();
        let b = store.create_session(Some("u1"), 60).unwrap();
        let current = store.create_session(Some("u1"), 60).unwrap();
        // b touched last → most recent.
        store.touch_session(&a.session_id, 60).unwrap();
        store.touch_session(&b.session_id, 60).unwrap();

        let recent = store
            .recent_sessions_for_user("u1", &current.session_id, 10)
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, b.session_id);
        assert_eq!(recent[1].session_id, a.session_id);
    }

    #[test]
    fn sweep_removes_expired_sessions() {
        let store = Store::open_in_memory().unwrap();
        let expired = store.create_session(Some("u1"), 0).unwrap();
        let live = store.create_session(Some("u1"), 60).unwrap();

        let swept = store.sweep_expired(Utc::now() + Duration::seconds(1)).unwrap();
        assert!(swept.contains(&expired.session_id));
        assert!(!swept.contains(&live.session_id));
        assert!(store.get_session(&expired.session_id).unwrap().is_none());
    }

    #[test]
    fn summary_cache_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let row = store.create_session(Some("u1"), 60).unwrap();
        assert!(store.get_cached_summary(&row.session_id).unwrap().is_none());

        store
            .set_cached_summary(&row.session_id, "u1", "전세 상담 요약")
            .unwrap();
        assert_eq!(
            store.get_cached_summary(&row.session_id).unwrap().as_deref(),
            Some("전세 상담 요약")
        );

        // Overwrite is an upsert.
        store
            .set_cached_summary(&row.session_id, "u1", "갱신된 요약")
            .unwrap();
        assert_eq!(
            store.get_cached_summary(&row.session_id).unwrap().as_deref(),
            Some("갱신된 요약")
        );
    }
}
