/// Workspace Manager - per-job scratch directories
///
/// Every job gets `<scratch_root>/<job_id>`, created on allocation and
/// removed on release. The scratch root is the only resource shared between
/// jobs, and jobs only ever add or remove their own subdirectory.
///
/// Release is best-effort: a failed removal is logged and never replaces the
/// job's result. If a `Workspace` is dropped without being released (the
/// owning future was cancelled or panicked) the directory is removed in `Drop`.
use crate::error::ExecutionError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create the scratch root if absent. Called once at startup.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ExecutionError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            ExecutionError::Resource(format!(
                "failed to create scratch root {}: {}",
                root.display(),
                e
            ))
        })?;

        // Commands run with the job directory as cwd, so every path handed to
        // them must be absolute.
        let root = fs::canonicalize(&root).map_err(|e| {
            ExecutionError::Resource(format!(
                "failed to resolve scratch root {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory owned by `job_id`.
    pub async fn allocate(&self, job_id: &Uuid) -> Result<Workspace, ExecutionError> {
        let dir = self.root.join(job_id.to_string());

        // create_dir, not create_dir_all: an existing directory means another
        // job holds this id, which must never be shared.
        tokio::fs::create_dir(&dir).await.map_err(|e| {
            ExecutionError::Resource(format!(
                "failed to create workspace {}: {}",
                dir.display(),
                e
            ))
        })?;

        debug!(job_id = %job_id, dir = %dir.display(), "Workspace allocated");

        Ok(Workspace {
            job_id: *job_id,
            dir,
            released: false,
        })
    }

    /// Write `content` verbatim to `file_name` inside the workspace.
    pub async fn write_source(
        &self,
        workspace: &Workspace,
        file_name: &str,
        content: &str,
    ) -> Result<PathBuf, ExecutionError> {
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            return Err(ExecutionError::Resource(format!(
                "refusing to write outside the workspace: {}",
                file_name
            )));
        }

        let path = workspace.dir.join(file_name);
        tokio::fs::write(&path, content).await.map_err(|e| {
            ExecutionError::Resource(format!(
                "failed to write source file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(path)
    }

    /// Recursively remove the workspace. Never fails; errors are logged.
    pub async fn release(&self, mut workspace: Workspace) {
        match tokio::fs::remove_dir_all(&workspace.dir).await {
            Ok(()) => {
                debug!(job_id = %workspace.job_id, "Workspace released");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    job_id = %workspace.job_id,
                    dir = %workspace.dir.display(),
                    error = %e,
                    "Failed to remove workspace"
                );
            }
        }
        workspace.released = true;
    }
}

/// A job's exclusively owned directory.
#[derive(Debug)]
pub struct Workspace {
    job_id: Uuid,
    dir: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn job_id(&self) -> &Uuid {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Cannot be async in Drop
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(job_id = %self.job_id, "Workspace removed on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                job_id = %self.job_id,
                dir = %self.dir.display(),
                error = %e,
                "Failed to remove workspace on drop"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_write_release() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();
        let job_id = Uuid::new_v4();

        let workspace = manager.allocate(&job_id).await.unwrap();
        assert!(workspace.dir().is_dir());
        assert!(workspace.dir().starts_with(manager.root()));
        assert_eq!(workspace.job_id(), &job_id);

        let path = manager
            .write_source(&workspace, "main.py", "print('hi')\n")
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "print('hi')\n");

        let dir = workspace.dir().to_path_buf();
        manager.release(workspace).await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_root_is_created_and_absolute() {
        let scratch = tempfile::tempdir().unwrap();
        let nested = scratch.path().join("a").join("b");
        let manager = WorkspaceManager::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(manager.root().is_absolute());
    }

    #[tokio::test]
    async fn test_distinct_jobs_get_distinct_directories() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();

        let a = manager.allocate(&Uuid::new_v4()).await.unwrap();
        let b = manager.allocate(&Uuid::new_v4()).await.unwrap();
        assert_ne!(a.dir(), b.dir());

        manager.release(a).await;
        assert!(b.dir().is_dir());
        manager.release(b).await;
    }

    #[tokio::test]
    async fn test_reusing_a_job_id_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();
        let job_id = Uuid::new_v4();

        let first = manager.allocate(&job_id).await.unwrap();
        let second = manager.allocate(&job_id).await;
        assert!(matches!(second, Err(ExecutionError::Resource(_))));

        manager.release(first).await;
    }

    #[tokio::test]
    async fn test_write_rejects_path_components() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();
        let workspace = manager.allocate(&Uuid::new_v4()).await.unwrap();

        for name in ["../escape.py", "sub/dir.py", ""] {
            let result = manager.write_source(&workspace, name, "x").await;
            assert!(matches!(result, Err(ExecutionError::Resource(_))), "{name}");
        }

        manager.release(workspace).await;
    }

    #[tokio::test]
    async fn test_drop_removes_unreleased_workspace() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();

        let workspace = manager.allocate(&Uuid::new_v4()).await.unwrap();
        manager
            .write_source(&workspace, "a.sh", "echo hi")
            .await
            .unwrap();
        let dir = workspace.dir().to_path_buf();

        drop(workspace);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_release_of_missing_directory_is_silent() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path()).unwrap();
        let workspace = manager.allocate(&Uuid::new_v4()).await.unwrap();

        fs::remove_dir_all(workspace.dir()).unwrap();
        manager.release(workspace).await;
    }
}
