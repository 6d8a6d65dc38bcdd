pub mod document;
pub mod fragment;
pub mod job;
pub mod loaders;
pub mod task;
pub mod version;

pub use document::{Block, Document, Run, RunFormatting, Table, TableCell, TableRow};
pub use fragment::{Fragment, MatchStatus};
pub use job::RewriteJob;
pub use loaders::{load_all_toml_files, load_toml_to_job};
pub use task::{Task, TaskStatus, TaskSummary};
pub use version::DocumentVersion;
