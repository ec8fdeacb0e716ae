//! Checkpoint persistence — durable snapshots of a run's serializable
//! state, keyed `(session_id, checkpoint_id)` with a linear parent chain.
//!
//! The store is append-only per session. The supervisor is the sole
//! writer for a given run, so no cross-writer coordination is needed
//! beyond the connection lock.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use zipsa_domain::error::{Error, Result};

use crate::db::Store;

#[derive(Debug, Clone)]
pub struct CheckpointRow {
    pub session_id: String,
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub state: Vec<u8>,
    pub metadata: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl CheckpointRow {
    /// Deserialize the state payload.
    pub fn state_json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.state).map_err(Error::from)
    }
}

impl Store {
    /// Append a checkpoint. The parent is the session's previous latest,
    /// forming a linear history.
    pub fn write_checkpoint(
        &self,
        session_id: &str,
        state: &[u8],
        metadata: Option<&[u8]>,
    ) -> Result<String> {
        let parent = self.latest_checkpoint_id(session_id)?;
        let checkpoint_id = Uuid::new_v4().to_string();

        self.conn
            .lock()
            .execute(
                "INSERT INTO checkpoints
                 (session_id, checkpoint_id, parent_checkpoint_id, state, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    checkpoint_id,
                    parent,
                    state,
                    metadata,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Store(e.to_string()))?;

        Ok(checkpoint_id)
    }

    fn latest_checkpoint_id(&self, session_id: &str) -> Result<Option<String>> {
        self.conn
            .lock()
            .query_row(
                "SELECT checkpoint_id FROM checkpoints WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![session_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))
    }

    /// The most recent checkpoint for a session, if any.
    pub fn latest_checkpoint(&self, session_id: &str) -> Result<Option<CheckpointRow>> {
        self.conn
            .lock()
            .query_row(
                "SELECT session_id, checkpoint_id, parent_checkpoint_id, state, metadata, created_at
                 FROM checkpoints WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![session_id],
                row_to_checkpoint,
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))?
            .map(finish_checkpoint)
            .transpose()
    }

    pub fn get_checkpoint(
        &self,
        session_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<CheckpointRow>> {
        self.conn
            .lock()
            .query_row(
                "SELECT session_id, checkpoint_id, parent_checkpoint_id, state, metadata, created_at
                 FROM checkpoints WHERE session_id = ?1 AND checkpoint_id = ?2",
                params![session_id, checkpoint_id],
                row_to_checkpoint,
            )
            .optional()
            .map_err(|e| Error::Store(e.to_string()))?
            .map(finish_checkpoint)
            .transpose()
    }

    /// Fork: copy an existing checkpoint's state into a new checkpoint
    /// whose parent is the source. Used for HITL resume so the paused
    /// state survives as its own history entry.
    pub fn fork_checkpoint(&self, session_id: &str, checkpoint_id: &str) -> Result<String> {
        let source = self
            .get_checkpoint(session_id, checkpoint_id)?
            .ok_or_else(|| {
                Error::Store(format!("checkpoint {checkpoint_id} not found for fork"))
            })?;

        let new_id = Uuid::new_v4().to_string();
        self.conn
            .lock()
            .execute(
                "INSERT INTO checkpoints
                 (session_id, checkpoint_id, parent_checkpoint_id, state, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    new_id,
                    checkpoint_id,
                    source.state,
                    source.metadata,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(new_id)
    }
}

type RawCheckpoint = (String, String, Option<String>, Vec<u8>, Option<Vec<u8>>, String);

fn row_to_checkpoint(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawCheckpoint> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
    ))
}

fn finish_checkpoint(
    (session_id, checkpoint_id, parent, state, metadata, created): RawCheckpoint,
) -> Result<CheckpointRow> {
    Ok(CheckpointRow {
        session_id,
        checkpoint_id,
        parent_checkpoint_id: parent,
        state,
        metadata,
        created_at: created
            .parse()
            .map_err(|e| Error::Store(format!("bad timestamp: {e}")))?,
    })
}
