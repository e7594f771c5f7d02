use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::store::{
    PendingSettlement, PhaseTransition, SettlementPhase, SettlementStore, StoreError,
};

const MIGRATIONS: [&str; 3] = [
    include_str!("../migrations/001_create_pending_settlements.sql"),
    include_str!("../migrations/002_create_settlement_transitions.sql"),
    include_str!("../migrations/003_index_settlement_transitions.sql"),
];

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    ///
    /// Limited to one connection: every connection to `sqlite::memory:`
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for migration in MIGRATIONS {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        }
        Ok(())
    }

    fn row_to_settlement(row: &SqliteRow) -> Result<PendingSettlement, StoreError> {
        let phase: String = row.get("phase");
        let clauses: String = row.get("clauses");

        Ok(PendingSettlement {
            batch_id: row.get("batch_id"),
            phase: phase.parse()?,
            clauses: serde_json::from_str(&clauses)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?,
            tx_hash: row.get("tx_hash"),
            attempts: row.get::<i64, _>("attempts") as u32,
            last_error: row.get("last_error"),
            created_at: row.get::<i64, _>("created_at") as u64,
            updated_at: row.get::<i64, _>("updated_at") as u64,
        })
    }
}

#[async_trait]
impl SettlementStore for SqliteStore {
    async fn upsert(&self, settlement: &PendingSettlement) -> Result<(), StoreError> {
        let clauses = serde_json::to_string(&settlement.clauses)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO pending_settlements (
                batch_id, phase, clauses, tx_hash, attempts, last_error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(batch_id) DO UPDATE SET
                phase = excluded.phase,
                clauses = excluded.clauses,
                tx_hash = excluded.tx_hash,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&settlement.batch_id)
        .bind(settlement.phase.as_str())
        .bind(&clauses)
        .bind(&settlement.tx_hash)
        .bind(settlement.attempts as i64)
        .bind(&settlement.last_error)
        .bind(settlement.created_at as i64)
        .bind(settlement.updated_at as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, batch_id: &str) -> Result<Option<PendingSettlement>, StoreError> {
        let row = sqlx::query("SELECT * FROM pending_settlements WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::row_to_settlement).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<PendingSettlement>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM pending_settlements ORDER BY created_at ASC, batch_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_settlement).collect()
    }

    async fn remove(&self, batch_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM pending_settlements WHERE batch_id = ?")
            .bind(batch_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(batch_id.to_string()));
        }
        Ok(())
    }

    async fn record_transition(
        &self,
        batch_id: &str,
        transition: PhaseTransition,
    ) -> Result<(), StoreError> {
        if self.get(batch_id).await?.is_none() {
            return Err(StoreError::NotFound(batch_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO settlement_transitions (
                batch_id, from_phase, to_phase, timestamp, tx_hash, details
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(transition.from_phase.map(|p| p.as_str()))
        .bind(transition.to_phase.as_str())
        .bind(transition.timestamp as i64)
        .bind(&transition.tx_hash)
        .bind(&transition.details)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn history(&self, batch_id: &str) -> Result<Vec<PhaseTransition>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM settlement_transitions WHERE batch_id = ? ORDER BY id ASC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let from_phase = row
                    .get::<Option<String>, _>("from_phase")
                    .map(|p| p.parse::<SettlementPhase>())
                    .transpose()?;
                let to_phase: String = row.get("to_phase");

                Ok(PhaseTransition {
                    from_phase,
                    to_phase: to_phase.parse()?,
                    timestamp: row.get::<i64, _>("timestamp") as u64,
                    tx_hash: row.get("tx_hash"),
                    details: row.get("details"),
                })
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
