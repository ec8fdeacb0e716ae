//! Chat message history per session.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::Value;

use zipsa_domain::error::{Error, Result};

use crate::db::Store;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub structured_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

fn row_to_message(
    r: &rusqlite::Row<'_>,
) -> rusqlite::Result<(i64, String, String, String, Option<String>, String)> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
    ))
}

fn build_message(
    (id, session_id, role, content, structured, created): (
        i64,
        String,
        String,
        String,
        Option<String>,
        String,
    ),
) -> Result<MessageRow> {
    Ok(MessageRow {
        id,
        session_id,
        role,
        content,
        structured_data: structured.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: created
            .parse()
            .map_err(|e| Error::Store(format!("bad timestamp: {e}")))?,
    })
}

impl Store {
    pub fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        structured_data: Option<&Value>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chat_messages (session_id, role, content, structured_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                role,
                content,
                structured_data.map(|v| v.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Messages in ascending creation order, bounded by `limit`.
    pub fn list_messages(&self, session_id: &str, limit: usize) -> Result<Vec<MessageRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, role, content, structured_data, created_at
                 FROM chat_messages WHERE session_id = ?1
                 ORDER BY id ASC LIMIT ?2",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], row_to_message)
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(build_message(row.map_err(|e| Error::Store(e.to_string()))?)?);
        }
        Ok(out)
    }

    /// The most recent `limit` messages, returned in ascending order —
    /// the short-term memory band keeps the tail of the transcript.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<MessageRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, role, content, structured_data, created_at
                 FROM chat_messages WHERE session_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], row_to_message)
            .map_err(|e| Error::Store(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(build_message(row.map_err(|e| Error::Store(e.to_string()))?)?);
        }
        out.reverse();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_list_ascending() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(Some("u1"), 60).unwrap();
        store.append_message(&s.session_id, "user", "질문", None).unwrap();
        store
            .append_message(
                &s.session_id,
                "assistant",
                "답변",
                Some(&serde_json::json!({"sections": []})),
            )
            .unwrap();

        let msgs = store.list_messages(&s.session_id, 10).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "user");
        assert_eq!(msgs[1].role, "assistant");
        assert!(msgs[1].structured_data.is_some());
    }

    #[test]
    fn recent_messages_keeps_tail_in_order() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(Some("u1"), 60).unwrap();
        for i in 0..5 {
            store
                .append_message(&s.session_id, "user", &format!("m{i}"), None)
                .unwrap();
        }
        let tail = store.recent_messages(&s.session_id, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");
        assert_eq!(tail[1].content, "m4");
    }
}
