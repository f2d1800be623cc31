// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Migration executor
//!
//! Runs a built pipeline stage by stage. Each stage gets its own connection
//! and one transaction around its pre, main and pos steps; pre-transaction
//! and post-transaction steps run on the bare connection. The first failure
//! stops the run. Stages committed before it stay committed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::BatchSplitter;
use super::{Pipeline, Stage, Step};
use crate::catalog::{Connection, Drive, Tag};
use crate::database::{ConnectionFactory, ConnectionOptimizer, DatabaseConnection};
use crate::errors::{SqlstageError, SqlstageResult};

/// Outcome of a completed migration
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub pipeline: String,
    pub stages: Vec<StageReport>,
    pub duration: Duration,
}

impl MigrationReport {
    pub fn script_count(&self) -> usize {
        self.stages.iter().map(|s| s.scripts).sum()
    }

    pub fn batch_count(&self) -> usize {
        self.stages.iter().map(|s| s.batches).sum()
    }
}

/// Work done by one committed stage
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub scripts: usize,
    pub batches: usize,
    pub duration: Duration,
}

/// Executes pipelines against database connections
pub struct MigrationExecutor {
    factory: Arc<dyn ConnectionFactory>,
    drive: Arc<dyn Drive>,
    connections: Vec<Connection>,
    optimizer: Option<Arc<dyn ConnectionOptimizer>>,
}

impl MigrationExecutor {
    /// Create an executor reading scripts from `drive`
    pub fn new(factory: Arc<dyn ConnectionFactory>, drive: Arc<dyn Drive>) -> Self {
        Self {
            factory,
            drive,
            connections: Vec::new(),
            optimizer: None,
        }
    }

    /// Connections a pipeline's target name is looked up in
    pub fn with_connections(mut self, connections: impl IntoIterator<Item = Connection>) -> Self {
        self.connections.extend(connections);
        self
    }

    /// Tuning applied to every connection after it opens
    pub fn with_optimizer(mut self, optimizer: Arc<dyn ConnectionOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Run every stage of a pipeline in order
    ///
    /// The caller is expected to check [`Pipeline::has_faults`] first; a
    /// faulted plan is executed as given.
    pub async fn migrate(&self, pipeline: &Pipeline) -> SqlstageResult<MigrationReport> {
        self.migrate_with_cancel(pipeline, CancellationToken::new()).await
    }

    /// Run a pipeline, stopping when `cancel` fires
    ///
    /// On cancellation the running stage's transaction is rolled back and
    /// its connection closed before [`SqlstageError::Cancelled`] is returned.
    pub async fn migrate_with_cancel(
        &self,
        pipeline: &Pipeline,
        cancel: CancellationToken,
    ) -> SqlstageResult<MigrationReport> {
        let start = Instant::now();
        let descriptor = self.target(pipeline)?;
        let splitter = BatchSplitter::new(&pipeline.batch_separator)?;

        info!(
            pipeline = %pipeline.name,
            connection = %descriptor.name,
            stages = pipeline.stages.len(),
            "Starting migration"
        );

        let mut stages = Vec::with_capacity(pipeline.stages.len());
        for stage in &pipeline.stages {
            if cancel.is_cancelled() {
                return Err(SqlstageError::Cancelled {
                    stage: stage.name.clone(),
                });
            }
            let report = self.run_stage(stage, descriptor, &splitter, &cancel).await?;
            stages.push(report);
        }

        let duration = start.elapsed();
        info!(
            pipeline = %pipeline.name,
            duration_ms = duration.as_millis() as u64,
            "Migration complete"
        );

        Ok(MigrationReport {
            pipeline: pipeline.name.clone(),
            stages,
            duration,
        })
    }

    fn target(&self, pipeline: &Pipeline) -> SqlstageResult<&Connection> {
        pipeline
            .connection
            .as_ref()
            .and_then(|name| self.connections.iter().find(|c| &c.name == name))
            .ok_or_else(|| SqlstageError::ConnectionNotFound {
                pipeline: pipeline.name.clone(),
                connection: pipeline.connection.clone(),
            })
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        descriptor: &Connection,
        splitter: &BatchSplitter,
        cancel: &CancellationToken,
    ) -> SqlstageResult<StageReport> {
        let start = Instant::now();
        info!(stage = %stage.name, scripts = stage.script_count(), "Running stage");

        let connection = self
            .factory
            .create_connection(descriptor)
            .await
            .map_err(|e| SqlstageError::ConnectionFailed {
                stage: stage.name.clone(),
                connection: descriptor.name.clone(),
                error: e.to_string(),
            })?;

        let mut session = StageSession {
            stage: stage.name.clone(),
            connection,
            open_tx: false,
        };
        let mut report = StageReport {
            name: stage.name.clone(),
            scripts: 0,
            batches: 0,
            duration: Duration::ZERO,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SqlstageError::Cancelled { stage: stage.name.clone() }),
            result = self.stage_body(stage, descriptor, splitter, &mut session, &mut report) => result,
        };

        session.release().await;

        match outcome {
            Ok(()) => {
                report.duration = start.elapsed();
                info!(
                    stage = %stage.name,
                    scripts = report.scripts,
                    batches = report.batches,
                    "Stage committed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(stage = %stage.name, error = %e, "Stage aborted");
                Err(e)
            }
        }
    }

    async fn stage_body(
        &self,
        stage: &Stage,
        descriptor: &Connection,
        splitter: &BatchSplitter,
        session: &mut StageSession,
        report: &mut StageReport,
    ) -> SqlstageResult<()> {
        session
            .connection
            .open()
            .await
            .map_err(|e| SqlstageError::ConnectionFailed {
                stage: stage.name.clone(),
                connection: descriptor.name.clone(),
                error: e.to_string(),
            })?;

        if let Some(ref optimizer) = self.optimizer {
            optimizer.optimize(session.connection.as_mut()).await?;
        }

        if let Some(step) = stage.step(Tag::PreTransaction) {
            self.run_step(stage, step, splitter, session, report).await?;
        }

        session.begin().await?;
        for step in stage.steps_where(true) {
            self.run_step(stage, step, splitter, session, report).await?;
        }
        session.commit().await?;

        if let Some(step) = stage.step(Tag::PostTransaction) {
            self.run_step(stage, step, splitter, session, report).await?;
        }

        Ok(())
    }

    async fn run_step(
        &self,
        stage: &Stage,
        step: &Step,
        splitter: &BatchSplitter,
        session: &mut StageSession,
        report: &mut StageReport,
    ) -> SqlstageResult<()> {
        debug!(stage = %stage.name, tag = %step.tag, scripts = step.scripts.len(), "Running step");

        for script in &step.scripts {
            let id = script.id();
            let text = self
                .drive
                .read_text(&script.entry.drive_path)
                .await
                .map_err(|e| SqlstageError::ScriptUnavailable {
                    stage: stage.name.clone(),
                    tag: step.tag,
                    script: id.clone(),
                    error: e.to_string(),
                })?;
            let batches = splitter.split(&text);
            debug!(script = %id, batches = batches.len(), "Executing script");

            for (i, batch) in batches.iter().enumerate() {
                session
                    .connection
                    .execute(batch)
                    .await
                    .map_err(|e| SqlstageError::BatchFailed {
                        stage: stage.name.clone(),
                        tag: step.tag,
                        script: id.clone(),
                        batch: i + 1,
                        error: e.to_string(),
                    })?;
                report.batches += 1;
            }
            report.scripts += 1;
        }

        Ok(())
    }
}

/// Connection owned by the stage currently running
struct StageSession {
    stage: String,
    connection: Box<dyn DatabaseConnection>,
    open_tx: bool,
}

impl StageSession {
    async fn begin(&mut self) -> SqlstageResult<()> {
        self.connection
            .begin_transaction()
            .await
            .map_err(|e| self.transaction_error("begin", e))?;
        self.open_tx = true;
        debug!(stage = %self.stage, "Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> SqlstageResult<()> {
        self.connection
            .commit()
            .await
            .map_err(|e| self.transaction_error("commit", e))?;
        self.open_tx = false;
        debug!(stage = %self.stage, "Transaction committed");
        Ok(())
    }

    fn transaction_error(&self, operation: &'static str, error: SqlstageError) -> SqlstageError {
        SqlstageError::TransactionFailed {
            stage: self.stage.clone(),
            operation,
            error: error.to_string(),
        }
    }

    /// Abandon any open transaction and close the connection
    ///
    /// Cleanup failures are logged; the stage outcome is what gets reported.
    async fn release(mut self) {
        if self.open_tx {
            warn!(stage = %self.stage, "Abandoning open transaction");
            if let Err(e) = self.connection.rollback().await {
                warn!(stage = %self.stage, error = %e, "Rollback failed");
            }
        }
        if let Err(e) = self.connection.close().await {
            warn!(stage = %self.stage, error = %e, "Closing connection failed");
        }
        debug!(stage = %self.stage, "Connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, MemoryDrive};
    use crate::pipeline::PipelineBuilder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Records every call; batches containing `FAIL` error, `WAIT` never returns
    struct MockFactory {
        calls: CallLog,
    }

    struct MockConnection {
        calls: CallLog,
    }

    impl MockConnection {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl ConnectionFactory for MockFactory {
        async fn create_connection(&self, _descriptor: &Connection) -> SqlstageResult<Box<dyn DatabaseConnection>> {
            self.calls.lock().unwrap().push("create".into());
            Ok(Box::new(MockConnection {
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    #[async_trait]
    impl DatabaseConnection for MockConnection {
        async fn open(&mut self) -> SqlstageResult<()> {
            self.record("open");
            Ok(())
        }

        async fn begin_transaction(&mut self) -> SqlstageResult<()> {
            self.record("begin");
            Ok(())
        }

        async fn commit(&mut self) -> SqlstageResult<()> {
            self.record("commit");
            Ok(())
        }

        async fn rollback(&mut self) -> SqlstageResult<()> {
            self.record("rollback");
            Ok(())
        }

        async fn execute(&mut self, batch: &str) -> SqlstageResult<u64> {
            self.record(format!("exec {}", batch));
            if batch.contains("WAIT") {
                std::future::pending::<()>().await;
            }
            if batch.contains("FAIL") {
                return Err(SqlstageError::database("syntax error"));
            }
            Ok(1)
        }

        async fn close(&mut self) -> SqlstageResult<()> {
            self.record("close");
            Ok(())
        }
    }

    struct CountingOptimizer {
        calls: CallLog,
    }

    #[async_trait]
    impl ConnectionOptimizer for CountingOptimizer {
        async fn optimize(&self, _connection: &mut dyn DatabaseConnection) -> SqlstageResult<()> {
            self.calls.lock().unwrap().push("optimize".into());
            Ok(())
        }
    }

    const MANIFEST: &str = r#"
name: erp
connections:
  - name: main
    provider: mock
    default: true
products:
  - name: erp
    versions:
      - version: "1"
        modules:
          - name: core
            packages:
              - name: schema
                precedence: 1
                scripts:
                  - path: tables.pretran.sql
                  - path: ddl.pre.sql
                  - path: create.main.sql
                  - path: seed.pos.sql
                  - path: stats.postran.sql
              - name: data
                precedence: 2
                scripts:
                  - path: load.main.sql
"#;

    fn setup(files: &[(&str, &str)]) -> (Pipeline, MigrationExecutor, CallLog) {
        let catalog = Catalog::from_yaml(MANIFEST).unwrap();
        let mut builder = PipelineBuilder::new();
        builder.add_catalog(&catalog);
        let mut pipelines = builder.build_pipelines();
        assert_eq!(pipelines.len(), 1);

        let mut drive = MemoryDrive::new();
        for (path, text) in files {
            drive.insert(path, *text);
        }

        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let executor = MigrationExecutor::new(
            Arc::new(MockFactory {
                calls: Arc::clone(&calls),
            }),
            Arc::new(drive),
        )
        .with_connections(catalog.connections.clone());

        (pipelines.remove(0), executor, calls)
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn all_files<'a>() -> Vec<(&'a str, &'a str)> {
        vec![
            ("tables.pretran.sql", "PRETRAN"),
            ("ddl.pre.sql", "PRE"),
            ("create.main.sql", "MAIN 1\nGO\nMAIN 2"),
            ("seed.pos.sql", "POS"),
            ("stats.postran.sql", "POSTRAN"),
            ("load.main.sql", "LOAD"),
        ]
    }

    #[tokio::test]
    async fn test_stage_runs_steps_around_one_transaction() {
        let (pipeline, executor, log) = setup(&all_files());

        let report = executor.migrate(&pipeline).await.unwrap();

        assert_eq!(
            calls(&log),
            vec![
                "create", "open", "exec PRETRAN", "begin", "exec PRE", "exec MAIN 1", "exec MAIN 2", "exec POS",
                "commit", "exec POSTRAN", "close", "create", "open", "begin", "exec LOAD", "commit", "close",
            ]
        );
        assert_eq!(report.pipeline, "erp - 1");
        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[0].scripts, 5);
        assert_eq!(report.stages[0].batches, 6);
        assert_eq!(report.script_count(), 6);
        assert_eq!(report.batch_count(), 7);
    }

    #[tokio::test]
    async fn test_pre_failure_abandons_stage_and_run() {
        let mut files = all_files();
        files[1] = ("ddl.pre.sql", "FAIL");
        let (pipeline, executor, log) = setup(&files);

        let err = executor.migrate(&pipeline).await.unwrap_err();

        match err {
            SqlstageError::BatchFailed {
                stage, tag, script, batch, ..
            } => {
                assert_eq!(stage, "Stage 1");
                assert_eq!(tag, Tag::Pre);
                assert_eq!(script, "core/schema/ddl");
                assert_eq!(batch, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let log = calls(&log);
        assert_eq!(
            log,
            vec!["create", "open", "exec PRETRAN", "begin", "exec FAIL", "rollback", "close"]
        );
        assert!(!log.iter().any(|c| c.starts_with("exec MAIN") || c == "exec POS" || c == "commit"));
    }

    #[tokio::test]
    async fn test_earlier_stage_stays_committed_when_later_fails() {
        let mut files = all_files();
        files[5] = ("load.main.sql", "LOAD\nGO\nFAIL");
        let (pipeline, executor, log) = setup(&files);

        let err = executor.migrate(&pipeline).await.unwrap_err();
        assert!(matches!(err, SqlstageError::BatchFailed { batch: 2, .. }));

        let log = calls(&log);
        let first_close = log.iter().position(|c| c == "close").unwrap();
        assert_eq!(log[first_close - 2], "commit");
        assert_eq!(
            &log[first_close + 1..],
            &["create", "open", "begin", "exec LOAD", "exec FAIL", "rollback", "close"]
        );
        assert_eq!(log.iter().filter(|c| *c == "commit").count(), 1);
    }

    #[tokio::test]
    async fn test_missing_script_text_fails_inside_stage() {
        let files: Vec<_> = all_files().into_iter().filter(|(p, _)| *p != "seed.pos.sql").collect();
        let (pipeline, executor, log) = setup(&files);

        let err = executor.migrate(&pipeline).await.unwrap_err();
        match &err {
            SqlstageError::ScriptUnavailable { stage, tag, script, error } => {
                assert_eq!(stage, "Stage 1");
                assert_eq!(*tag, Tag::Pos);
                assert_eq!(script, "core/schema/seed");
                assert!(error.contains("seed.pos.sql"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.stage(), Some("Stage 1"));

        let log = calls(&log);
        assert_eq!(log.last().map(String::as_str), Some("close"));
        assert!(log.contains(&"rollback".to_string()));
        assert!(!log.contains(&"commit".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back_and_releases() {
        let mut files = all_files();
        files[2] = ("create.main.sql", "WAIT");
        let (pipeline, executor, log) = setup(&files);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor.migrate_with_cancel(&pipeline, cancel).await.unwrap_err();
        assert!(matches!(err, SqlstageError::Cancelled { ref stage } if stage == "Stage 1"));

        let log = calls(&log);
        assert_eq!(&log[log.len() - 3..], &["exec WAIT", "rollback", "close"]);
        assert!(!log.contains(&"commit".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_opens_nothing() {
        let (pipeline, executor, log) = setup(&all_files());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor.migrate_with_cancel(&pipeline, cancel).await.unwrap_err();
        assert!(matches!(err, SqlstageError::Cancelled { .. }));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_connection_is_configuration_error() {
        let (mut pipeline, executor, log) = setup(&all_files());
        pipeline.connection = Some("reporting".into());

        let err = executor.migrate(&pipeline).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            SqlstageError::ConnectionNotFound { connection: Some(ref c), .. } if c == "reporting"
        ));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_optimizer_runs_after_open() {
        let (pipeline, executor, log) = setup(&all_files());
        let executor = executor.with_optimizer(Arc::new(CountingOptimizer {
            calls: Arc::clone(&log),
        }));

        executor.migrate(&pipeline).await.unwrap();

        let log = calls(&log);
        assert_eq!(&log[..3], &["create", "open", "optimize"]);
        assert_eq!(log.iter().filter(|c| *c == "optimize").count(), 2);
    }
}
