use crate::aggregate::{aggregate_all, ComparisonSnapshot};
use crate::reducer::BenchSummary;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::result::{ExecutionError, MixedReport, RunResult, TestMetadata};
use crate::testspec::TestKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Persistent store of per-machine benchmark outcomes
///
/// One row per (machine, vpn, profile, test kind); saving again replaces the
/// previous outcome. Records are the JSON form of [`RunResult`].
#[derive(Clone)]
pub struct ResultRepository {
    pool: SqlitePool,
}

impl ResultRepository {
    /// Open (creating if needed) the database at `url` and initialize the schema
    pub async fn open(url: &str) -> RepositoryResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    /// Repository backed by a private in-memory database (for testing)
    pub async fn in_memory() -> RepositoryResult<Self> {
        // Every in-memory connection is its own database, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> RepositoryResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                machine_name TEXT NOT NULL,
                vpn_name TEXT NOT NULL,
                profile_name TEXT NOT NULL,
                test_kind TEXT NOT NULL,
                run_id TEXT,
                ok INTEGER NOT NULL,
                record TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (machine_name, vpn_name, profile_name, test_kind)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_kind ON results(test_kind)")
            .execute(&pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Store an outcome not tied to a sweep run
    pub async fn save(&self, report: &MixedReport<BenchSummary>) -> RepositoryResult<()> {
        self.save_with_run(None, report).await
    }

    /// Store an outcome produced by sweep `run_id`
    pub async fn save_for_run(
        &self,
        run_id: &str,
        report: &MixedReport<BenchSummary>,
    ) -> RepositoryResult<()> {
        self.save_with_run(Some(run_id), report).await
    }

    async fn save_with_run(
        &self,
        run_id: Option<&str>,
        report: &MixedReport<BenchSummary>,
    ) -> RepositoryResult<()> {
        let record = serde_json::to_string(&report.result)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO results
            (machine_name, vpn_name, profile_name, test_kind, run_id, ok, record, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.machine_name)
        .bind(&report.vpn_name)
        .bind(&report.profile_name)
        .bind(report.test_kind.as_str())
        .bind(run_id)
        .bind(report.result.is_ok())
        .bind(record)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Decode one row
    ///
    /// A record that no longer parses becomes an `InvalidInput` failure for its
    /// own key, so it shows up as a crashed cell instead of failing the load.
    /// Rows whose test kind is unknown have no cell at all and are skipped.
    fn decode(row: &SqliteRow) -> RepositoryResult<Option<MixedReport<BenchSummary>>> {
        let machine: String = row.try_get("machine_name")?;
        let vpn: String = row.try_get("vpn_name")?;
        let profile: String = row.try_get("profile_name")?;
        let corrupt = |reason: String| RepositoryError::CorruptRecord {
            machine: machine.clone(),
            vpn: vpn.clone(),
            profile: profile.clone(),
            reason,
        };

        let kind = match TestKind::from_str(&row.try_get::<String, _>("test_kind")?) {
            Ok(kind) => kind,
            Err(reason) => {
                tracing::warn!("Skipping stored result: {}", corrupt(reason));
                return Ok(None);
            }
        };

        let record: String = row.try_get("record")?;
        let result: RunResult<BenchSummary> = match serde_json::from_str(&record) {
            Ok(result) => result,
            Err(e) => {
                let err = corrupt(e.to_string());
                tracing::warn!("{err}");
                RunResult::err(
                    ExecutionError::invalid_input(err.to_string()),
                    TestMetadata::default(),
                )
            }
        };

        Ok(Some(MixedReport::new(machine, vpn, profile, kind, result)))
    }

    fn decode_all(rows: &[SqliteRow]) -> RepositoryResult<Vec<MixedReport<BenchSummary>>> {
        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(report) = Self::decode(row)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Every stored outcome, ordered by kind, VPN, profile and machine
    pub async fn load_all(&self) -> RepositoryResult<Vec<MixedReport<BenchSummary>>> {
        let rows = sqlx::query(
            "SELECT * FROM results ORDER BY test_kind, vpn_name, profile_name, machine_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Self::decode_all(&rows)
    }

    pub async fn load_kind(
        &self,
        kind: TestKind,
    ) -> RepositoryResult<Vec<MixedReport<BenchSummary>>> {
        let rows = sqlx::query(
            "SELECT * FROM results WHERE test_kind = ? ORDER BY vpn_name, profile_name, machine_name",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::decode_all(&rows)
    }

    /// Remove every outcome written by sweep `run_id`; returns the row count
    pub async fn delete_run(&self, run_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM results WHERE run_id = ?")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of stored outcomes, split into (ok, failed)
    pub async fn counts(&self) -> RepositoryResult<(i64, i64)> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(ok), 0) AS ok, COUNT(*) - COALESCE(SUM(ok), 0) AS failed FROM results",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("ok")?, row.try_get("failed")?))
    }

    /// Fresh comparison snapshot over everything stored
    pub async fn snapshot(
        &self,
        known_vpns: &[String],
        profiles: &[String],
    ) -> RepositoryResult<ComparisonSnapshot> {
        let reports = self.load_all().await?;
        Ok(aggregate_all(&reports, known_vpns, profiles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::reduce;
    use crate::testspec::MetricField;

    fn report(machine: &str, vpn: &str, ok: bool) -> MixedReport<BenchSummary> {
        let meta = TestMetadata {
            duration_seconds: 12.5,
            test_attempts: 2,
            vpn_restart_attempts: 0,
            service_logs: None,
        };
        let result = if ok {
            let mut summary = BenchSummary::new();
            summary.insert(MetricField::Rtt, reduce(&[1.0, 2.0, 3.0]).unwrap());
            RunResult::ok(summary, meta)
        } else {
            RunResult::err(ExecutionError::tool("peer unreachable"), meta)
        };
        MixedReport::new(machine, vpn, "baseline", TestKind::Ping, result)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = ResultRepository::in_memory().await.unwrap();
        let saved = report("m1", "alpha", true);
        repo.save(&saved).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded, vec![saved]);
    }

    #[tokio::test]
    async fn test_save_replaces_same_key() {
        let repo = ResultRepository::in_memory().await.unwrap();
        repo.save(&report("m1", "alpha", true)).await.unwrap();
        repo.save(&report("m1", "alpha", false)).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].result.is_err());
        assert_eq!(repo.counts().await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_load_kind_filters() {
        let repo = ResultRepository::in_memory().await.unwrap();
        repo.save(&report("m1", "alpha", true)).await.unwrap();
        let mut other = report("m1", "alpha", true);
        other.test_kind = TestKind::Http3;
        repo.save(&other).await.unwrap();

        assert_eq!(repo.load_kind(TestKind::Ping).await.unwrap().len(), 1);
        assert_eq!(repo.load_kind(TestKind::VideoStream).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_delete_run() {
        let repo = ResultRepository::in_memory().await.unwrap();
        repo.save_for_run("run-1", &report("m1", "alpha", true)).await.unwrap();
        repo.save_for_run("run-1", &report("m2", "alpha", true)).await.unwrap();
        repo.save(&report("m3", "alpha", true)).await.unwrap();

        assert_eq!(repo.delete_run("run-1").await.unwrap(), 2);
        let left = repo.load_all().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].machine_name, "m3");
    }

    #[tokio::test]
    async fn test_snapshot_from_store() {
        let repo = ResultRepository::in_memory().await.unwrap();
        repo.save(&report("m1", "alpha", true)).await.unwrap();
        repo.save(&report("m1", "beta", false)).await.unwrap();

        let vpns = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let snapshot = repo.snapshot(&vpns, &["baseline".to_string()]).await.unwrap();
        assert!(snapshot.entry(TestKind::Ping, "alpha", "baseline").unwrap().is_success());
        assert!(snapshot.entry(TestKind::Ping, "beta", "baseline").unwrap().is_crashed());
        assert!(snapshot.entry(TestKind::Ping, "gamma", "baseline").unwrap().is_not_run());
    }

    async fn insert_raw(
        repo: &ResultRepository,
        machine: &str,
        vpn: &str,
        kind: &str,
        record: &str,
    ) {
        sqlx::query("INSERT INTO results VALUES (?, ?, 'baseline', ?, NULL, 1, ?, 0)")
        .bind(machine)
        .bind(vpn)
        .bind(kind)
        .bind(record)
        .execute(&repo.pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_only_crashes_its_cell() {
        let repo = ResultRepository::in_memory().await.unwrap();
        repo.save(&report("m1", "alpha", true)).await.unwrap();
        insert_raw(&repo, "m9", "beta", "ping", r#"{"ok":true}"#).await;

        let loaded = repo.load_kind(TestKind::Ping).await.unwrap();
        assert_eq!(loaded.len(), 2);
        let broken = loaded.iter().find(|r| r.machine_name == "m9").unwrap();
        assert!(matches!(
            broken.result.error(),
            Some(ExecutionError::InvalidInput { message, .. })
                if message.contains("m9/beta/baseline")
        ));

        let vpns = vec!["alpha".to_string(), "beta".to_string()];
        let snapshot = repo.snapshot(&vpns, &["baseline".to_string()]).await.unwrap();
        assert!(snapshot.entry(TestKind::Ping, "alpha", "baseline").unwrap().is_success());
        assert!(snapshot.entry(TestKind::Ping, "beta", "baseline").unwrap().is_crashed());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_skipped() {
        let repo = ResultRepository::in_memory().await.unwrap();
        repo.save(&report("m1", "alpha", true)).await.unwrap();
        insert_raw(&repo, "m1", "alpha", "carrier-pigeon", r#"{"ok":true}"#).await;

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded, vec![report("m1", "alpha", true)]);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("results.db").display());

        {
            let repo = ResultRepository::open(&url).await.unwrap();
            repo.save(&report("m1", "alpha", true)).await.unwrap();
        }

        let reopened = ResultRepository::open(&url).await.unwrap();
        assert_eq!(reopened.load_all().await.unwrap().len(), 1);
    }
}
