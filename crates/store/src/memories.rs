//! Long-term conversation memory rows — the richer store behind the
//! summary cache, one row per (user, session, tier).

use chrono::{DateTime, Utc};
use rusqlite::params;

use zipsa_domain::error::{Error, Result};

use crate::db::Store;

#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub id: i64,
    pub user_id: String,
    pub session_id: String,
    pub tier: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn insert_memory(
        &self,
        user_id: &str,
        session_id: &str,
        tier: &str,
        content: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversation_memories (user_id, session_id, tier, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, session_id, tier, content, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn memories_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, session_id, tier, content, created_at
                 FROM conversation_memories WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, uid, sid, tier, content, created) =
                row.map_err(|e| Error::Store(e.to_string()))?;
            out.push(MemoryRow {
                id,
                user_id: uid,
                session_id: sid,
                tier,
                content,
                created_at: created
                    .parse()
                    .map_err(|e| Error::Store(format!("bad timestamp: {e}")))?,
            });
        }
        Ok(out)
    }
}
