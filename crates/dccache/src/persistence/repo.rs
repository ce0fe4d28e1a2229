#![forbid(unsafe_code)]

use crate::Error;
use crate::schedule::{TimerKind, TriggerTimer};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[async_trait]
pub trait TimerRepository: Send + Sync {
    /// Replace the stored queue with `timers`.
    async fn save(&self, timers: &[TriggerTimer]) -> Result<(), Error>;
    /// Read the stored queue and clear it.
    async fn take(&self) -> Result<Vec<TriggerTimer>, Error>;
}

#[derive(Debug, Default)]
pub struct NoopRepository;

#[async_trait]
impl TimerRepository for NoopRepository {
    async fn save(&self, _timers: &[TriggerTimer]) -> Result<(), Error> {
        Ok(())
    }

    async fn take(&self) -> Result<Vec<TriggerTimer>, Error> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    path: PathBuf,
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open the timer queue database, creating it when missing.
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { path, pool })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl TimerRepository for SqliteRepository {
    async fn save(&self, timers: &[TriggerTimer]) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM trigger_queue")
            .execute(&mut *tx)
            .await?;
        for timer in timers {
            sqlx::query(
                "INSERT INTO trigger_queue (objectid, kind, triggerid, exec_ts, eval_ts) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(to_i64(timer.functionid))
            .bind(timer.kind.code())
            .bind(to_i64(timer.triggerid))
            .bind(timer.exec_ts)
            .bind(timer.eval_ts)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = timers.len(), path = ?self.path, "trigger timers saved");
        Ok(())
    }

    async fn take(&self) -> Result<Vec<TriggerTimer>, Error> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT objectid, kind, triggerid, exec_ts, eval_ts FROM trigger_queue \
             ORDER BY exec_ts, triggerid, eval_ts",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut timers = Vec::with_capacity(rows.len());
        for row in rows {
            let objectid: i64 = row.try_get("objectid")?;
            let kind: i64 = row.try_get("kind")?;
            let triggerid: i64 = row.try_get("triggerid")?;
            let Some(kind) = TimerKind::from_code(kind) else {
                warn!(objectid, kind, "stored trigger timer of unknown kind skipped");
                continue;
            };
            timers.push(TriggerTimer {
                functionid: objectid as u64,
                triggerid: triggerid as u64,
                kind,
                exec_ts: row.try_get("exec_ts")?,
                eval_ts: row.try_get("eval_ts")?,
                revision: 0,
                lock: false,
                parameter: String::new(),
            });
        }

        sqlx::query("DELETE FROM trigger_queue")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(timers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn timer(functionid: u64, exec_ts: i64) -> TriggerTimer {
        TriggerTimer {
            functionid,
            triggerid: 100,
            kind: TimerKind::Trend,
            exec_ts,
            eval_ts: exec_ts - 30,
            revision: 0,
            lock: false,
            parameter: String::new(),
        }
    }

    #[tokio::test]
    async fn saved_timers_are_taken_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::new(dir.path().join("timers.db"))
            .await
            .unwrap();

        let timers = vec![timer(2, 7230), timer(1, 3630)];
        repo.save(&timers).await.unwrap();

        let taken = repo.take().await.unwrap();
        assert_eq!(taken, vec![timer(1, 3630), timer(2, 7230)]);
        assert!(repo.take().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_replaces_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::new(dir.path().join("nested/timers.db"))
            .await
            .unwrap();

        repo.save(&[timer(1, 3630)]).await.unwrap();
        repo.save(&[timer(3, 90)]).await.unwrap();
        assert_eq!(repo.take().await.unwrap(), vec![timer(3, 90)]);
    }
}
