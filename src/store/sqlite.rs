//! SQLite 存储：检查点（只追加）与待处理中断共用一个数据库文件
//!
//! rusqlite 是同步 API，所有访问都经 `spawn_blocking` 在阻塞线程池上执行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{now_millis, Checkpoint};
use crate::store::{
    CheckpointStore, InterruptRegistry, InterruptStatus, PendingInterrupt, StoreError, ThreadSummary,
};

/// 同时实现 `CheckpointStore` 与 `InterruptRegistry`
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                workflow_status TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints(thread_id, seq);
            CREATE TABLE IF NOT EXISTS pending_interrupts (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                question TEXT NOT NULL,
                status TEXT NOT NULL,
                source_context TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_interrupts_status ON pending_interrupts(status, created_at);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection poisoned".to_string()))?;
            f(&*guard)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    /// 某线程已写入的检查点数量
    pub async fn checkpoint_count(&self, thread_id: &str) -> Result<usize, StoreError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    async fn set_status(&self, id: &str, status: InterruptStatus) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE pending_interrupts SET status = ?1, resolved_at = ?2 WHERE id = ?3 AND status = 'pending'",
                params![status.as_str(), now_millis(), id],
            )?;
            if n > 0 {
                return Ok(());
            }
            Err(closed_or_missing(conn, &id)?)
        })
        .await
    }
}

/// 条件更新未命中时区分：记录已结算（Conflict）还是不存在（NotFound）
fn closed_or_missing(conn: &Connection, id: &str) -> Result<StoreError, StoreError> {
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM pending_interrupts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match current {
        Some(current) => StoreError::Conflict(format!("interrupt {} is already {}", id, current)),
        None => StoreError::NotFound(format!("interrupt {}", id)),
    })
}

fn row_to_interrupt(row: &rusqlite::Row<'_>) -> rusqlite::Result<(PendingInterrupt, String)> {
    let status: String = row.get(3)?;
    let source: String = row.get(4)?;
    Ok((
        PendingInterrupt {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            question: row.get(2)?,
            status: InterruptStatus::parse(&status).unwrap_or(InterruptStatus::Pending),
            source_context: serde_json::Value::Null,
            created_at: row.get(5)?,
            resolved_at: row.get(6)?,
        },
        source,
    ))
}

fn finish_interrupt((mut item, source): (PendingInterrupt, String)) -> Result<PendingInterrupt, StoreError> {
    item.source_context = serde_json::from_str(&source)?;
    Ok(item)
}

const INTERRUPT_COLUMNS: &str =
    "id, thread_id, question, status, source_context, created_at, resolved_at";

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn get_state(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM checkpoints WHERE thread_id = ?1 ORDER BY seq DESC LIMIT 1",
                    params![thread_id],
                    |row| row.get(0),
                )
                .optional()?;
            match data {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_state(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let data = serde_json::to_string(checkpoint)?;
        let thread_id = checkpoint.state.thread_id.clone();
        let status = checkpoint.state.workflow_status.to_string();
        let created_at = checkpoint.updated_at;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (thread_id, workflow_status, data, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, status, data, created_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let rows: Vec<String> = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.data FROM checkpoints c
                     JOIN (SELECT thread_id, MAX(seq) AS seq FROM checkpoints GROUP BY thread_id) latest
                       ON c.seq = latest.seq
                     ORDER BY c.seq DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.iter()
            .map(|json| {
                let cp: Checkpoint = serde_json::from_str(json)?;
                Ok(ThreadSummary::from_checkpoint(&cp))
            })
            .collect()
    }
}

#[async_trait]
impl InterruptRegistry for SqliteStore {
    async fn save_pending(&self, interrupt: &PendingInterrupt) -> Result<(), StoreError> {
        let item = interrupt.clone();
        let source = serde_json::to_string(&item.source_context)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pending_interrupts
                 (id, thread_id, question, status, source_context, created_at, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id,
                    item.thread_id,
                    item.question,
                    item.status.as_str(),
                    source,
                    item.created_at,
                    item.resolved_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_pending(&self, id: &str) -> Result<Option<PendingInterrupt>, StoreError> {
        let id = id.to_string();
        let row = self
            .with_conn(move |conn| {
                let sql = format!("SELECT {} FROM pending_interrupts WHERE id = ?1", INTERRUPT_COLUMNS);
                Ok(conn.query_row(&sql, params![id], row_to_interrupt).optional()?)
            })
            .await?;
        row.map(finish_interrupt).transpose()
    }

    async fn update_question(&self, id: &str, question: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let question = question.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE pending_interrupts SET question = ?1 WHERE id = ?2 AND status = 'pending'",
                params![question, id],
            )?;
            if n > 0 {
                return Ok(());
            }
            Err(closed_or_missing(conn, &id)?)
        })
        .await
    }

    async fn resolve(&self, id: &str) -> Result<(), StoreError> {
        self.set_status(id, InterruptStatus::Resolved).await
    }

    async fn dismiss(&self, id: &str) -> Result<(), StoreError> {
        self.set_status(id, InterruptStatus::Dismissed).await
    }

    async fn list_pending(&self, status: Option<InterruptStatus>) -> Result<Vec<PendingInterrupt>, StoreError> {
        let rows = self
            .with_conn(move |conn| {
                let rows = match status {
                    Some(s) => {
                        let sql = format!(
                            "SELECT {} FROM pending_interrupts WHERE status = ?1 ORDER BY created_at DESC",
                            INTERRUPT_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map(params![s.as_str()], row_to_interrupt)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let sql = format!(
                            "SELECT {} FROM pending_interrupts ORDER BY created_at DESC",
                            INTERRUPT_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([], row_to_interrupt)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(finish_interrupt).collect()
    }
}
