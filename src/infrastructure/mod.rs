pub mod document_store;
pub mod json_file;
pub mod task_repository;
pub mod version_store;

pub use document_store::{DocumentStore, InMemoryDocumentStore, JsonDocumentStore};
pub use task_repository::{InMemoryTaskRepository, JsonFileTaskRepository, TaskRepository};
pub use version_store::{DocumentVersionStore, InMemoryVersionStore, JsonFileVersionStore};
