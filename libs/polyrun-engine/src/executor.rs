/// Execution Service - the public contract
///
/// **Responsibility:**
/// Validate a request, resolve its adapter, materialize the source in a fresh
/// workspace, hand the job to the runner and release the workspace before
/// returning, on every path.
///
/// This module is the glue layer - it knows nothing about:
/// - How commands are spawned or killed (runner's job)
/// - How a language builds and runs (adapter's job)

use crate::adapters::{LanguageAdapter, LanguageRegistry};
use crate::error::ExecutionError;
use crate::runner::{Job, JobRunner};
use crate::workspace::{Workspace, WorkspaceManager};
use polyrun_common::config::ServiceConfig;
use polyrun_common::types::{ExecutionRequest, ExecutionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ExecutionService {
    registry: Arc<LanguageRegistry>,
    workspaces: WorkspaceManager,
    runner: JobRunner,
    timeout: Duration,
    max_source_bytes: usize,
    permits: Semaphore,
}

impl ExecutionService {
    /// Build the service, creating the scratch root if needed.
    pub fn new(config: &ServiceConfig, registry: LanguageRegistry) -> Result<Self, ExecutionError> {
        let workspaces = WorkspaceManager::new(&config.scratch_root)?;

        info!(
            scratch_root = %workspaces.root().display(),
            timeout_seconds = config.timeout_seconds,
            max_concurrent_jobs = config.max_concurrent_jobs,
            languages = ?registry.supported(),
            "Execution service ready"
        );

        Ok(Self {
            registry: Arc::new(registry),
            workspaces,
            runner: JobRunner::new(config.max_output_bytes),
            timeout: config.timeout(),
            max_source_bytes: config.max_source_bytes,
            permits: Semaphore::new(config.max_concurrent_jobs.max(1)),
        })
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Execute a request; cancelling `cancel` kills the job's processes and
    /// yields `ExecutionError::Cancelled` after the workspace is released.
    #[tracing::instrument(skip_all, fields(language = %request.language))]
    pub async fn execute_with_cancel(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let adapter = self.validate(&request)?;

        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.map_err(|_| {
                ExecutionError::infrastructure("execution service is shutting down", String::new())
            })?,
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };

        let job_id = Uuid::new_v4();
        let workspace = self.workspaces.allocate(&job_id).await?;

        let result = self
            .run_in_workspace(&workspace, &adapter, &request, &cancel)
            .await;

        self.workspaces.release(workspace).await;

        match &result {
            Ok(r) => debug!(job_id = %job_id, outcome = %r.outcome, "Job finished"),
            Err(e) => warn!(job_id = %job_id, kind = e.kind(), error = %e, "Job failed"),
        }
        result
    }

    /// Check the request before touching the filesystem.
    fn validate(&self, request: &ExecutionRequest) -> Result<Arc<LanguageAdapter>, ExecutionError> {
        if request.language.trim().is_empty() {
            return Err(ExecutionError::validation(
                "language is required",
                self.registry.supported(),
            ));
        }
        if request.source_text.trim().is_empty() {
            return Err(ExecutionError::validation(
                "sourceText is required",
                self.registry.supported(),
            ));
        }
        if request.source_text.len() > self.max_source_bytes {
            return Err(ExecutionError::validation(
                format!(
                    "sourceText exceeds maximum size of {} bytes",
                    self.max_source_bytes
                ),
                self.registry.supported(),
            ));
        }

        self.registry.resolve(&request.language)
    }

    async fn run_in_workspace(
        &self,
        workspace: &Workspace,
        adapter: &LanguageAdapter,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let job_id = *workspace.job_id();
        let entry = adapter.entry_name(request.file_name_hint.as_deref());
        let file_name = adapter.source_file_name(&job_id, &entry);

        let source_file = self
            .workspaces
            .write_source(workspace, &file_name, &request.source_text)
            .await?;
        let artifact = adapter
            .artifact_name(&job_id, &entry)
            .map(|name| workspace.dir().join(name));

        info!(
            job_id = %job_id,
            language = %adapter.id,
            shape = %adapter.shape,
            source_file = %file_name,
            source_size = request.source_text.len(),
            "Job accepted"
        );

        let mut job = Job::new(
            job_id,
            adapter.id.clone(),
            workspace.dir().to_path_buf(),
            source_file,
            self.timeout,
        )
        .with_artifact(artifact)
        .with_entry(entry);

        self.runner.run(&mut job, adapter, cancel).await
    }
}
