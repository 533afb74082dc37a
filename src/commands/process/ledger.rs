use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::util::{append_suffix, now_utc_string, sha256_file};

const LEDGER_SCHEMA_VERSION: &str = "1";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ItemStage {
    Source,
    Segment,
}

impl ItemStage {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Segment => "segment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusCount {
    pub stage: String,
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub summary_json: Option<String>,
}

/// Run-local state index. An item marked `processed` here is never picked up
/// again, regardless of what its file is named on disk.
pub(crate) struct Ledger {
    connection: Connection,
}

impl Ledger {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;
        Self::from_connection(connection)
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        let ledger = Self { connection };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                  key TEXT PRIMARY KEY,
                  value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS items (
                  stage TEXT NOT NULL,
                  name TEXT NOT NULL,
                  status TEXT NOT NULL,
                  sha256 TEXT,
                  detail TEXT,
                  run_id TEXT NOT NULL,
                  updated_at TEXT NOT NULL,
                  PRIMARY KEY(stage, name)
                );

                CREATE TABLE IF NOT EXISTS runs (
                  run_id TEXT PRIMARY KEY,
                  started_at TEXT NOT NULL,
                  finished_at TEXT,
                  status TEXT NOT NULL,
                  command TEXT,
                  summary_json TEXT
                );
                ",
            )
            .context("failed to initialize ledger schema")?;

        self.connection.execute(
            "INSERT INTO metadata(key, value) VALUES('ledger_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [LEDGER_SCHEMA_VERSION],
        )?;

        Ok(())
    }

    pub(crate) fn is_processed(&self, stage: ItemStage, name: &str) -> Result<bool> {
        let status: Option<String> = self
            .connection
            .query_row(
                "SELECT status FROM items WHERE stage = ?1 AND name = ?2",
                params![stage.as_str(), name],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to query ledger for {name}"))?;

        Ok(status.as_deref() == Some("processed"))
    }

    pub(crate) fn mark_processed(
        &mut self,
        stage: ItemStage,
        name: &str,
        sha256: &str,
        run_id: &str,
    ) -> Result<()> {
        let tx = self.connection.transaction()?;
        tx.execute(
            "
            INSERT INTO items(stage, name, status, sha256, detail, run_id, updated_at)
            VALUES(?1, ?2, 'processed', ?3, NULL, ?4, ?5)
            ON CONFLICT(stage, name) DO UPDATE SET
              status=excluded.status,
              sha256=excluded.sha256,
              detail=NULL,
              run_id=excluded.run_id,
              updated_at=excluded.updated_at
            ",
            params![stage.as_str(), name, sha256, run_id, now_utc_string()],
        )
        .with_context(|| format!("failed to mark {name} processed"))?;
        tx.commit()?;
        Ok(())
    }

    /// Records a failed attempt. Failed items stay eligible for the next run.
    pub(crate) fn record_failure(
        &mut self,
        stage: ItemStage,
        name: &str,
        detail: &str,
        run_id: &str,
    ) -> Result<()> {
        self.connection
            .execute(
                "
                INSERT INTO items(stage, name, status, sha256, detail, run_id, updated_at)
                VALUES(?1, ?2, 'failed', NULL, ?3, ?4, ?5)
                ON CONFLICT(stage, name) DO UPDATE SET
                  status=excluded.status,
                  detail=excluded.detail,
                  run_id=excluded.run_id,
                  updated_at=excluded.updated_at
                WHERE items.status != 'processed'
                ",
                params![stage.as_str(), name, detail, run_id, now_utc_string()],
            )
            .with_context(|| format!("failed to record failure for {name}"))?;
        Ok(())
    }

    pub(crate) fn begin_run(&mut self, run_id: &str, started_at: &str, command: &str) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO runs(run_id, started_at, status, command) VALUES(?1, ?2, 'running', ?3)",
                params![run_id, started_at, command],
            )
            .with_context(|| format!("failed to record run {run_id}"))?;
        Ok(())
    }

    pub(crate) fn finish_run(&mut self, run_id: &str, status: &str, summary_json: &str) -> Result<()> {
        self.connection
            .execute(
                "UPDATE runs SET finished_at = ?2, status = ?3, summary_json = ?4 WHERE run_id = ?1",
                params![run_id, now_utc_string(), status, summary_json],
            )
            .with_context(|| format!("failed to finalize run {run_id}"))?;
        Ok(())
    }

    pub(crate) fn status_counts(&self) -> Result<Vec<StatusCount>> {
        let mut statement = self.connection.prepare(
            "SELECT stage, status, COUNT(*) FROM items GROUP BY stage, status ORDER BY stage, status",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(StatusCount {
                stage: row.get(0)?,
                status: row.get(1)?,
                count: row.get(2)?,
            })
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    pub(crate) fn failed_items(&self, stage: ItemStage) -> Result<Vec<(String, String)>> {
        let mut statement = self.connection.prepare(
            "SELECT name, COALESCE(detail, '') FROM items WHERE stage = ?1 AND status = 'failed' ORDER BY name",
        )?;
        let rows = statement.query_map([stage.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut failed = Vec::new();
        for row in rows {
            failed.push(row?);
        }
        Ok(failed)
    }

    pub(crate) fn latest_run(&self) -> Result<Option<RunRecord>> {
        let record = self
            .connection
            .query_row(
                "SELECT run_id, started_at, finished_at, status, summary_json
                 FROM runs ORDER BY started_at DESC, run_id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        run_id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        status: row.get(3)?,
                        summary_json: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

/// Commits a fully consumed file: ledger record first, then the suffix rename.
pub(crate) fn commit_processed(
    ledger: &mut Ledger,
    stage: ItemStage,
    path: &Path,
    name: &str,
    suffix: &str,
    run_id: &str,
) -> Result<()> {
    let sha256 = sha256_file(path)?;
    ledger.mark_processed(stage, name, &sha256, run_id)?;
    append_suffix(path, suffix)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_does_not_block_later_success() {
        let mut ledger = Ledger::in_memory().expect("ledger");
        ledger
            .record_failure(ItemStage::Segment, "1_Math_i_001.pdf", "bad text", "run-a")
            .expect("failure");
        assert!(!ledger
            .is_processed(ItemStage::Segment, "1_Math_i_001.pdf")
            .expect("query"));

        ledger
            .mark_processed(ItemStage::Segment, "1_Math_i_001.pdf", "abc", "run-b")
            .expect("processed");
        assert!(ledger
            .is_processed(ItemStage::Segment, "1_Math_i_001.pdf")
            .expect("query"));
    }

    #[test]
    fn failure_never_downgrades_processed_item() {
        let mut ledger = Ledger::in_memory().expect("ledger");
        ledger
            .mark_processed(ItemStage::Source, "1_Math.pdf", "abc", "run-a")
            .expect("processed");
        ledger
            .record_failure(ItemStage::Source, "1_Math.pdf", "late failure", "run-b")
            .expect("failure");

        assert!(ledger.is_processed(ItemStage::Source, "1_Math.pdf").expect("query"));
        assert!(ledger.failed_items(ItemStage::Source).expect("failed").is_empty());
    }

    #[test]
    fn stages_are_tracked_independently() {
        let mut ledger = Ledger::in_memory().expect("ledger");
        ledger
            .mark_processed(ItemStage::Source, "1_Math.pdf", "abc", "run-a")
            .expect("processed");

        assert!(!ledger.is_processed(ItemStage::Segment, "1_Math.pdf").expect("query"));

        let counts = ledger.status_counts().expect("counts");
        assert_eq!(
            counts,
            vec![StatusCount {
                stage: "source".to_string(),
                status: "processed".to_string(),
                count: 1,
            }]
        );
    }

    #[test]
    fn latest_run_reports_finished_summary() {
        let mut ledger = Ledger::in_memory().expect("ledger");
        ledger
            .begin_run("run-20260101T000000Z", "2026-01-01T00:00:00Z", "sbg-reports process")
            .expect("begin");
        ledger
            .finish_run("run-20260101T000000Z", "completed", "{}")
            .expect("finish");

        let run = ledger.latest_run().expect("query").expect("run present");
        assert_eq!(run.run_id, "run-20260101T000000Z");
        assert_eq!(run.status, "completed");
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn commit_processed_records_and_renames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("1_Math.pdf");
        std::fs::write(&path, b"%PDF-1.5").expect("write");

        let mut ledger = Ledger::in_memory().expect("ledger");
        commit_processed(
            &mut ledger,
            ItemStage::Source,
            &path,
            "1_Math.pdf",
            ".processed",
            "run-a",
        )
        .expect("commit");

        assert!(!path.exists());
        assert!(dir.path().join("1_Math.pdf.processed").exists());
        assert!(ledger.is_processed(ItemStage::Source, "1_Math.pdf").expect("query"));
    }
}
