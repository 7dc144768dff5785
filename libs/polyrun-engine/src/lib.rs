//! Execution core: language adapters, per-job workspaces, the process runner
//! and the service that ties them together.

pub mod adapters;
pub mod error;
pub mod executor;
pub mod probe;
pub mod runner;
pub mod workspace;

pub use adapters::{LanguageAdapter, LanguageRegistry, RegistryError};
pub use error::ExecutionError;
pub use executor::ExecutionService;
pub use runner::{Job, JobRunner, JobState};
pub use workspace::{Workspace, WorkspaceManager};
