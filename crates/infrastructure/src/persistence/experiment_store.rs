//! SQLite experiment store
//!
//! The full experiment, results included, is stored as a JSON record.
//! Status, name, priority, target and timestamps are duplicated into columns
//! for filtering; tags go to their own table.

use std::sync::Arc;

use application::error::ApplicationError;
use application::ports::{ExperimentQuery, ExperimentStorePort};
use async_trait::async_trait;
use domain::entities::Experiment;
use domain::value_objects::ExperimentId;
use rusqlite::{OptionalExtension, params};
use tokio::task;
use tracing::{debug, instrument};

use super::connection::ConnectionPool;

/// SQLite-backed [`ExperimentStorePort`]
#[derive(Debug, Clone)]
pub struct SqliteExperimentStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteExperimentStore {
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

fn internal(e: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Internal(e.to_string())
}

fn decode(record: &str) -> Result<Experiment, ApplicationError> {
    serde_json::from_str(record).map_err(|e| internal(format!("corrupt experiment record: {e}")))
}

#[async_trait]
impl ExperimentStorePort for SqliteExperimentStore {
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id, status = %experiment.status))]
    async fn save(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let experiment = experiment.clone();

        task::spawn_blocking(move || {
            let record = serde_json::to_string(&experiment).map_err(internal)?;
            let mut conn = pool.get().map_err(internal)?;
            let tx = conn.transaction().map_err(internal)?;

            tx.execute(
                "INSERT INTO experiments (id, name, status, priority, target_name, record, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    status = excluded.status,
                    priority = excluded.priority,
                    target_name = excluded.target_name,
                    record = excluded.record,
                    updated_at = excluded.updated_at",
                params![
                    experiment.id.as_str(),
                    experiment.name,
                    experiment.status.label(),
                    experiment.priority.to_string(),
                    experiment.target.name,
                    record,
                    experiment.created_at.to_rfc3339(),
                    experiment.updated_at.to_rfc3339(),
                ],
            )
            .map_err(internal)?;

            tx.execute(
                "DELETE FROM experiment_tags WHERE experiment_id = ?1",
                [experiment.id.as_str()],
            )
            .map_err(internal)?;
            for tag in &experiment.tags {
                tx.execute(
                    "INSERT OR IGNORE INTO experiment_tags (experiment_id, tag) VALUES (?1, ?2)",
                    params![experiment.id.as_str(), tag],
                )
                .map_err(internal)?;
            }

            tx.commit().map_err(internal)?;
            debug!("experiment saved");
            Ok(())
        })
        .await
        .map_err(internal)?
    }

    #[instrument(skip(self), fields(experiment_id = %id))]
    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id = id.as_str().to_string();

        task::spawn_blocking(move || {
            let conn = pool.get().map_err(internal)?;
            let record: Option<String> = conn
                .query_row("SELECT record FROM experiments WHERE id = ?1", [&id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(internal)?;
            record.as_deref().map(decode).transpose()
        })
        .await
        .map_err(internal)?
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let status = query.status.map(|s| s.label().to_string());
        let tag = query.tag.clone();
        let limit = query.limit.map_or(-1, i64::from);

        task::spawn_blocking(move || {
            let conn = pool.get().map_err(internal)?;
            let mut stmt = conn
                .prepare(
                    "SELECT e.record FROM experiments e
                     WHERE (?1 IS NULL OR e.status = ?1)
                       AND (?2 IS NULL OR EXISTS (
                            SELECT 1 FROM experiment_tags t
                            WHERE t.experiment_id = e.id AND t.tag = ?2))
                     ORDER BY e.created_at DESC, e.id DESC
                     LIMIT ?3",
                )
                .map_err(internal)?;

            let records = stmt
                .query_map(params![status, tag, limit], |row| row.get::<_, String>(0))
                .map_err(internal)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(internal)?;

            records.iter().map(String::as_str).map(decode).collect()
        })
        .await
        .map_err(internal)?
    }

    #[instrument(skip(self), fields(experiment_id = %id))]
    async fn delete(&self, id: &ExperimentId) -> Result<bool, ApplicationError> {
        let pool = Arc::clone(&self.pool);
        let id = id.as_str().to_string();

        task::spawn_blocking(move || {
            let conn = pool.get().map_err(internal)?;
            let deleted = conn
                .execute("DELETE FROM experiments WHERE id = ?1", [&id])
                .map_err(internal)?;
            Ok(deleted > 0)
        })
        .await
        .map_err(internal)?
    }
}
