//! The embedded relational store: one SQLite file per workspace.
//!
//! Concurrency follows the teacher's `agtrace-index` pattern (a plain
//! `rusqlite::Connection`) with two additions `spec.md` §4.1/§5 require:
//! WAL journaling so readers are not blocked by the writer, and every
//! blocking call routed through `tokio::task::spawn_blocking` so the async
//! coordinator never stalls its executor on synchronous SQLite I/O. All
//! access to the connection is serialized behind a single mutex — genuinely
//! concurrent readers would need a connection pool, which this workspace
//! does not need at its target scale (one coordinator task at a time
//! issuing a handful of statements per turn).

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use mandrake_core::{
    AggregatedMetrics, Request, Response, Round, Session, SessionHistory, TokenMetrics, ToolCall,
    Turn,
};
use mandrake_core::{RequestId, ResponseId, RoundId, SessionId, TurnId, WorkspaceId};

use crate::error::StorageError;
use crate::events::{ChangeBus, ChangeKind, SessionChangeEvent};
use crate::schema::init_schema;

/// Filters for [`Storage::list_sessions`].
#[derive(Debug, Clone, Default)]
pub struct ListSessionsFilter {
    /// Restrict to sessions under this workspace.
    pub workspace_id: Option<WorkspaceId>,
    /// Maximum number of sessions to return.
    pub limit: Option<u32>,
    /// Number of sessions to skip, for pagination.
    pub offset: Option<u32>,
}

/// Patch applied by [`Storage::update_session`]. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New title, if changing.
    pub title: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
    /// New metadata map, if changing (replaces wholesale).
    pub metadata: Option<HashMap<String, String>>,
}

/// The fields of a turn being appended or updated mid-stream.
#[derive(Debug, Clone, Default)]
pub struct TurnPatch {
    /// Replacement raw response text.
    pub raw_response: Option<String>,
    /// Replacement parsed content segments.
    pub content: Option<Vec<String>>,
    /// Replacement tool-call records.
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Replacement metrics.
    pub metrics: Option<TokenMetrics>,
}

/// An open handle to one workspace's embedded store.
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    bus: Arc<ChangeBus>,
}

impl Storage {
    /// Open (creating if absent) the database file at `path`, initializing
    /// its schema idempotently.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StorageError> {
            let conn = Connection::open(&path)?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .expect("storage init task panicked")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            bus: Arc::new(ChangeBus::new()),
        })
    }

    /// Open a private in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, StorageError> {
            let conn = Connection::open_in_memory()?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .expect("storage init task panicked")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            bus: Arc::new(ChangeBus::new()),
        })
    }

    /// Subscribe to change events for one session. See [`ChangeBus`].
    pub fn subscribe(
        &self,
        session_id: &SessionId,
    ) -> tokio::sync::broadcast::Receiver<SessionChangeEvent> {
        self.bus.subscribe(session_id)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("storage mutex poisoned");
            f(&guard)
        })
        .await
        .expect("storage task panicked")
    }

    /// Create a new session.
    pub async fn create_session(
        &self,
        workspace_id: Option<WorkspaceId>,
        title: Option<String>,
        description: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<Session, StorageError> {
        let id = SessionId::generate();
        let now = Utc::now();
        let session = Session {
            id,
            workspace_id,
            title,
            description,
            metadata,
            created_at: now,
            updated_at: now,
        };

        let to_insert = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO sessions (id, workspace_id, title, description, metadata, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    to_insert.id.as_str(),
                    to_insert.workspace_id.as_ref().map(|w| w.as_str()),
                    to_insert.title,
                    to_insert.description,
                    serde_json::to_string(&to_insert.metadata).unwrap(),
                    to_insert.created_at.to_rfc3339(),
                    to_insert.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        self.bus.publish(SessionChangeEvent {
            kind: ChangeKind::Created,
            session_id: session.id.clone(),
            snapshot: None,
        });

        Ok(session)
    }

    /// Fetch a session by id. Fails with [`StorageError::NotFound`] if
    /// absent.
    pub async fn get_session(&self, id: &SessionId) -> Result<Session, StorageError> {
        let id = id.clone();
        self.with_conn(move |conn| get_session_row(conn, &id)).await
    }

    /// List sessions, most recently created first.
    pub async fn list_sessions(
        &self,
        filter: ListSessionsFilter,
    ) -> Result<Vec<Session>, StorageError> {
        self.with_conn(move |conn| {
            let limit = filter.limit.unwrap_or(u32::MAX) as i64;
            let offset = filter.offset.unwrap_or(0) as i64;

            let (query, ws_filter) = match &filter.workspace_id {
                Some(ws) => (
                    "SELECT id, workspace_id, title, description, metadata, created_at, updated_at \
                     FROM sessions WHERE workspace_id = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                    Some(ws.as_str().to_string()),
                ),
                None => (
                    "SELECT id, workspace_id, title, description, metadata, created_at, updated_at \
                     FROM sessions ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                    None,
                ),
            };

            let mut stmt = conn.prepare(query)?;
            let rows = if let Some(ws) = ws_filter {
                stmt.query_map(params![ws, limit, offset], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                stmt.query_map(params![limit, offset], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            Ok(rows)
        })
        .await
    }

    /// Apply a partial update to a session's title/description/metadata.
    pub async fn update_session(
        &self,
        id: &SessionId,
        patch: SessionPatch,
    ) -> Result<Session, StorageError> {
        let id = id.clone();
        let updated = self
            .with_conn(move |conn| {
                let mut session = get_session_row(conn, &id)?;
                if let Some(title) = patch.title {
                    session.title = Some(title);
                }
                if let Some(description) = patch.description {
                    session.description = Some(description);
                }
                if let Some(metadata) = patch.metadata {
                    session.metadata = metadata;
                }
                session.updated_at = Utc::now();

                conn.execute(
                    r#"
                    UPDATE sessions SET title = ?2, description = ?3, metadata = ?4, updated_at = ?5
                    WHERE id = ?1
                    "#,
                    params![
                        session.id.as_str(),
                        session.title,
                        session.description,
                        serde_json::to_string(&session.metadata).unwrap(),
                        session.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(session)
            })
            .await?;

        self.bus.publish(SessionChangeEvent {
            kind: ChangeKind::Updated,
            session_id: updated.id.clone(),
            snapshot: self.get_session_history(&updated.id).await.ok(),
        });

        Ok(updated)
    }

    /// Delete a session and all of its rounds/responses/turns (cascading
    /// via foreign keys).
    pub async fn delete_session(&self, id: &SessionId) -> Result<(), StorageError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id.as_str()])?;
            if changed == 0 {
                return Err(StorageError::NotFound(format!("session {id}")));
            }
            Ok(())
        })
        .await?;

        self.bus.publish(SessionChangeEvent {
            kind: ChangeKind::Deleted,
            session_id: id.clone(),
            snapshot: None,
        });
        self.bus.remove(&id);
        Ok(())
    }

    /// Atomically create a Request, Response, and Round for a new user
    /// message. The round index is `max(existing) + 1`, or `0` if this is
    /// the session's first round.
    pub async fn start_round(
        &self,
        session_id: &SessionId,
        request_content: String,
    ) -> Result<Round, StorageError> {
        let session_id = session_id.clone();
        let round = self
            .with_conn(move |conn| {
                // Validate the session exists before touching anything else.
                get_session_row(conn, &session_id)?;

                let tx = conn.unchecked_transaction()?;
                let now = Utc::now();

                let request_id = RequestId::from(uuid::Uuid::new_v4().to_string());
                let response_id = ResponseId::from(uuid::Uuid::new_v4().to_string());
                let round_id = RoundId::from(uuid::Uuid::new_v4().to_string());

                tx.execute(
                    "INSERT INTO requests (id, content, created_at) VALUES (?1, ?2, ?3)",
                    params![request_id.as_str(), request_content, now.to_rfc3339()],
                )?;
                tx.execute(
                    "INSERT INTO responses (id, round_id) VALUES (?1, ?2)",
                    params![response_id.as_str(), round_id.as_str()],
                )?;

                let next_index: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(round_index) + 1, 0) FROM rounds WHERE session_id = ?1",
                    params![session_id.as_str()],
                    |row| row.get(0),
                )?;

                tx.execute(
                    r#"
                    INSERT INTO rounds (id, session_id, round_index, request_id, response_id, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    "#,
                    params![
                        round_id.as_str(),
                        session_id.as_str(),
                        next_index,
                        request_id.as_str(),
                        response_id.as_str(),
                        now.to_rfc3339(),
                    ],
                )?;

                tx.commit()?;

                Ok(Round {
                    id: round_id,
                    session_id: session_id.clone(),
                    index: next_index as u32,
                    request: Request {
                        id: request_id,
                        content: request_content,
                        created_at: now,
                    },
                    response_id,
                    created_at: now,
                    updated_at: now,
                })
            })
            .await?;

        self.bus.publish(SessionChangeEvent {
            kind: ChangeKind::Created,
            session_id: round.session_id.clone(),
            snapshot: self.get_session_history(&round.session_id).await.ok(),
        });

        Ok(round)
    }

    /// Append a new turn to a response. The turn index is `max(existing) +
    /// 1`, or `0` for the response's first turn.
    pub async fn append_turn(
        &self,
        response_id: &ResponseId,
        patch: TurnPatch,
    ) -> Result<Turn, StorageError> {
        let response_id = response_id.clone();
        let turn = self
            .with_conn(move |conn| {
                let now = Utc::now();
                let turn_id = TurnId::from(uuid::Uuid::new_v4().to_string());

                let next_index: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(turn_index) + 1, 0) FROM turns WHERE response_id = ?1",
                    params![response_id.as_str()],
                    |row| row.get(0),
                )?;

                let turn = Turn {
                    id: turn_id,
                    response_id: response_id.clone(),
                    index: next_index as u32,
                    raw_response: patch.raw_response.unwrap_or_default(),
                    content: patch.content.unwrap_or_default(),
                    tool_calls: patch.tool_calls.unwrap_or_default(),
                    metrics: patch.metrics.unwrap_or_default(),
                    created_at: now,
                    updated_at: now,
                };

                insert_turn(conn, &turn)?;
                let session_id = session_id_for_response(conn, &response_id)?;
                Ok((turn, session_id))
            })
            .await?;

        let (turn, session_id) = turn;
        self.bus.publish(SessionChangeEvent {
            kind: ChangeKind::Created,
            session_id: session_id.clone(),
            snapshot: self.get_session_history(&session_id).await.ok(),
        });

        Ok(turn)
    }

    /// Apply a partial update to an existing turn, e.g. during streaming or
    /// at finalization. Only fields present in `patch` are replaced.
    pub async fn update_turn(
        &self,
        id: &TurnId,
        patch: TurnPatch,
    ) -> Result<Turn, StorageError> {
        let id = id.clone();
        let (turn, session_id) = self
            .with_conn(move |conn| {
                let mut turn = get_turn_row(conn, &id)?;
                if let Some(raw) = patch.raw_response {
                    turn.raw_response = raw;
                }
                if let Some(content) = patch.content {
                    turn.content = content;
                }
                if let Some(tool_calls) = patch.tool_calls {
                    turn.tool_calls = tool_calls;
                }
                if let Some(metrics) = patch.metrics {
                    turn.metrics = metrics;
                }
                turn.updated_at = Utc::now();

                conn.execute(
                    r#"
                    UPDATE turns SET raw_response = ?2, content = ?3, tool_calls = ?4,
                        metrics_input = ?5, metrics_output = ?6, metrics_cache_read = ?7,
                        metrics_cache_write = ?8, metrics_cost = ?9, updated_at = ?10
                    WHERE id = ?1
                    "#,
                    params![
                        turn.id.as_str(),
                        turn.raw_response,
                        serde_json::to_string(&turn.content).unwrap(),
                        serde_json::to_string(&turn.tool_calls).unwrap(),
                        turn.metrics.input as i64,
                        turn.metrics.output as i64,
                        turn.metrics.cache_read.map(|v| v as i64),
                        turn.metrics.cache_write.map(|v| v as i64),
                        turn.metrics.cost.to_string(),
                        turn.updated_at.to_rfc3339(),
                    ],
                )?;

                let session_id = session_id_for_response(conn, &turn.response_id)?;
                Ok((turn, session_id))
            })
            .await?;

        self.bus.publish(SessionChangeEvent {
            kind: ChangeKind::Updated,
            session_id: session_id.clone(),
            snapshot: self.get_session_history(&session_id).await.ok(),
        });

        Ok(turn)
    }

    /// Load a session plus all of its rounds (each with its request) and
    /// responses (each with its ordered turns), as a single read-consistent
    /// snapshot.
    pub async fn get_session_history(
        &self,
        id: &SessionId,
    ) -> Result<SessionHistory, StorageError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let session = get_session_row(&tx, &id)?;

            let mut stmt = tx.prepare(
                r#"
                SELECT r.id, r.session_id, r.round_index, r.request_id, r.response_id,
                       r.created_at, r.updated_at,
                       req.content, req.created_at
                FROM rounds r
                JOIN requests req ON req.id = r.request_id
                WHERE r.session_id = ?1
                ORDER BY r.round_index ASC
                "#,
            )?;

            let rounds: Vec<Round> = stmt
                .query_map(params![id.as_str()], |row| {
                    Ok(Round {
                        id: RoundId::from(row.get::<_, String>(0)?),
                        session_id: SessionId::from(row.get::<_, String>(1)?),
                        index: row.get::<_, i64>(2)? as u32,
                        request: Request {
                            id: RequestId::from(row.get::<_, String>(3)?),
                            content: row.get::<_, String>(7)?,
                            created_at: parse_ts(row.get::<_, String>(8)?),
                        },
                        response_id: ResponseId::from(row.get::<_, String>(4)?),
                        created_at: parse_ts(row.get::<_, String>(5)?),
                        updated_at: parse_ts(row.get::<_, String>(6)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut responses = Vec::with_capacity(rounds.len());
            for round in &rounds {
                let turns = list_turns(&tx, &round.response_id)?;
                responses.push(Response {
                    id: round.response_id.clone(),
                    round_id: round.id.clone(),
                    turns,
                });
            }

            tx.commit()?;
            Ok(SessionHistory {
                session,
                rounds,
                responses,
            })
        })
        .await
    }

    /// Aggregate token/cost metrics across an entire session.
    pub async fn session_metrics(
        &self,
        id: &SessionId,
    ) -> Result<AggregatedMetrics, StorageError> {
        let history = self.get_session_history(id).await?;

        let mut agg = AggregatedMetrics {
            round_count: history.rounds.len() as u32,
            ..Default::default()
        };
        let mut turn_count = 0u32;

        for response in &history.responses {
            for turn in &response.turns {
                agg.total_input_tokens += turn.metrics.input;
                agg.total_output_tokens += turn.metrics.output;
                agg.total_cache_read_tokens += turn.metrics.cache_read.unwrap_or(0);
                agg.total_cache_write_tokens += turn.metrics.cache_write.unwrap_or(0);
                agg.total_cost += turn.metrics.cost;
                turn_count += 1;
            }
        }

        agg.turn_count = turn_count;
        agg.avg_turns_per_round = if agg.round_count > 0 {
            turn_count as f64 / agg.round_count as f64
        } else {
            0.0
        };

        Ok(agg)
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let metadata_json: String = row.get(4)?;
    Ok(Session {
        id: SessionId::from(row.get::<_, String>(0)?),
        workspace_id: row.get::<_, Option<String>>(1)?.map(WorkspaceId::from),
        title: row.get(2)?,
        description: row.get(3)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: parse_ts(row.get::<_, String>(5)?),
        updated_at: parse_ts(row.get::<_, String>(6)?),
    })
}

fn get_session_row(conn: &Connection, id: &SessionId) -> Result<Session, StorageError> {
    conn.query_row(
        r#"
        SELECT id, workspace_id, title, description, metadata, created_at, updated_at
        FROM sessions WHERE id = ?1
        "#,
        params![id.as_str()],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("session {id}")))
}

fn insert_turn(conn: &Connection, turn: &Turn) -> Result<(), StorageError> {
    conn.execute(
        r#"
        INSERT INTO turns (
            id, response_id, turn_index, raw_response, content, tool_calls,
            metrics_input, metrics_output, metrics_cache_read, metrics_cache_write,
            metrics_cost, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
        params![
            turn.id.as_str(),
            turn.response_id.as_str(),
            turn.index as i64,
            turn.raw_response,
            serde_json::to_string(&turn.content).unwrap(),
            serde_json::to_string(&turn.tool_calls).unwrap(),
            turn.metrics.input as i64,
            turn.metrics.output as i64,
            turn.metrics.cache_read.map(|v| v as i64),
            turn.metrics.cache_write.map(|v| v as i64),
            turn.metrics.cost.to_string(),
            turn.created_at.to_rfc3339(),
            turn.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn turn_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    let content_json: String = row.get(4)?;
    let tool_calls_json: String = row.get(5)?;
    let cost_str: String = row.get(10)?;

    Ok(Turn {
        id: TurnId::from(row.get::<_, String>(0)?),
        response_id: ResponseId::from(row.get::<_, String>(1)?),
        index: row.get::<_, i64>(2)? as u32,
        raw_response: row.get(3)?,
        content: serde_json::from_str(&content_json).unwrap_or_default(),
        tool_calls: serde_json::from_str(&tool_calls_json).unwrap_or_default(),
        metrics: TokenMetrics {
            input: row.get::<_, i64>(6)? as u64,
            output: row.get::<_, i64>(7)? as u64,
            cache_read: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
            cache_write: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
            cost: Decimal::from_str(&cost_str).unwrap_or_default(),
        },
        created_at: parse_ts(row.get::<_, String>(11)?),
        updated_at: parse_ts(row.get::<_, String>(12)?),
    })
}

fn get_turn_row(conn: &Connection, id: &TurnId) -> Result<Turn, StorageError> {
    conn.query_row(
        r#"
        SELECT id, response_id, turn_index, raw_response, content, tool_calls,
               metrics_input, metrics_output, metrics_cache_read, metrics_cache_write,
               metrics_cost, created_at, updated_at
        FROM turns WHERE id = ?1
        "#,
        params![id.as_str()],
        turn_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("turn {id}")))
}

fn session_id_for_response(
    conn: &Connection,
    response_id: &ResponseId,
) -> Result<SessionId, StorageError> {
    conn.query_row(
        "SELECT session_id FROM rounds WHERE response_id = ?1",
        params![response_id.as_str()],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .map(SessionId::from)
    .ok_or_else(|| StorageError::NotFound(format!("round for response {response_id}")))
}

fn list_turns(conn: &Connection, response_id: &ResponseId) -> Result<Vec<Turn>, StorageError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, response_id, turn_index, raw_response, content, tool_calls,
               metrics_input, metrics_output, metrics_cache_read, metrics_cache_write,
               metrics_cost, created_at, updated_at
        FROM turns WHERE response_id = ?1 ORDER BY turn_index ASC
        "#,
    )?;
    let turns = stmt
        .query_map(params![response_id.as_str()], turn_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get_session_roundtrip() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, Some("hello".into()), None, HashMap::new())
            .await
            .unwrap();

        let fetched = storage.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let storage = Storage::open_in_memory().await.unwrap();
        let err = storage.get_session(&SessionId::from("nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn round_indexes_are_dense_and_zero_based() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();

        let r0 = storage.start_round(&session.id, "hi".into()).await.unwrap();
        let r1 = storage.start_round(&session.id, "again".into()).await.unwrap();
        assert_eq!(r0.index, 0);
        assert_eq!(r1.index, 1);
    }

    #[tokio::test]
    async fn turn_indexes_are_dense_and_zero_based() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        let round = storage.start_round(&session.id, "hi".into()).await.unwrap();

        let t0 = storage
            .append_turn(&round.response_id, TurnPatch::default())
            .await
            .unwrap();
        let t1 = storage
            .append_turn(&round.response_id, TurnPatch::default())
            .await
            .unwrap();
        assert_eq!(t0.index, 0);
        assert_eq!(t1.index, 1);
    }

    #[tokio::test]
    async fn update_turn_merges_patch_fields() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        let round = storage.start_round(&session.id, "hi".into()).await.unwrap();
        let turn = storage
            .append_turn(&round.response_id, TurnPatch::default())
            .await
            .unwrap();

        let updated = storage
            .update_turn(
                &turn.id,
                TurnPatch {
                    raw_response: Some("Hi!".into()),
                    content: Some(vec!["Hi!".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.raw_response, "Hi!");
        assert_eq!(updated.content, vec!["Hi!".to_string()]);
        assert_eq!(updated.metrics, TokenMetrics::default());
    }

    #[tokio::test]
    async fn session_history_returns_rounds_in_order() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        storage.start_round(&session.id, "first".into()).await.unwrap();
        storage.start_round(&session.id, "second".into()).await.unwrap();

        let history = storage.get_session_history(&session.id).await.unwrap();
        assert_eq!(history.rounds.len(), 2);
        assert_eq!(history.rounds[0].request.content, "first");
        assert_eq!(history.rounds[1].request.content, "second");
    }

    #[tokio::test]
    async fn delete_session_cascades_to_rounds_and_turns() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        let round = storage.start_round(&session.id, "hi".into()).await.unwrap();
        storage
            .append_turn(&round.response_id, TurnPatch::default())
            .await
            .unwrap();

        storage.delete_session(&session.id).await.unwrap();
        assert!(storage.get_session(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn session_metrics_sums_across_turns() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        let round = storage.start_round(&session.id, "hi".into()).await.unwrap();
        let turn = storage
            .append_turn(&round.response_id, TurnPatch::default())
            .await
            .unwrap();
        storage
            .update_turn(
                &turn.id,
                TurnPatch {
                    metrics: Some(TokenMetrics {
                        input: 5,
                        output: 2,
                        cache_read: None,
                        cache_write: None,
                        cost: Decimal::new(7, 3),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let metrics = storage.session_metrics(&session.id).await.unwrap();
        assert_eq!(metrics.total_input_tokens, 5);
        assert_eq!(metrics.total_output_tokens, 2);
        assert_eq!(metrics.round_count, 1);
        assert_eq!(metrics.turn_count, 1);
    }

    #[tokio::test]
    async fn change_events_fire_in_commit_order() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        let mut rx = storage.subscribe(&session.id);

        storage.start_round(&session.id, "hi".into()).await.unwrap();
        storage
            .update_session(
                &session.id,
                SessionPatch {
                    title: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Created);
        assert_eq!(second.kind, ChangeKind::Updated);
    }

    #[tokio::test]
    async fn turn_mutations_publish_change_events() {
        let storage = Storage::open_in_memory().await.unwrap();
        let session = storage
            .create_session(None, None, None, HashMap::new())
            .await
            .unwrap();
        let round = storage.start_round(&session.id, "hi".into()).await.unwrap();
        let mut rx = storage.subscribe(&session.id);

        let turn = storage
            .append_turn(&round.response_id, TurnPatch::default())
            .await
            .unwrap();
        storage
            .update_turn(
                &turn.id,
                TurnPatch {
                    raw_response: Some("hi there".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let appended = rx.recv().await.unwrap();
        let updated = rx.recv().await.unwrap();
        assert_eq!(appended.kind, ChangeKind::Created);
        assert_eq!(updated.kind, ChangeKind::Updated);
        assert!(updated.snapshot.is_some());
    }
}
