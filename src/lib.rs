// ABOUTME: Library root for the app builder client
// ABOUTME: Exposes the HTTP client, poll loop, session and view abstractions used by the CLI

pub mod config;
pub mod error;
pub mod poll;
pub mod remote;
pub mod session;
pub mod view;

pub use config::ClientConfig;
pub use error::BuilderError;
pub use poll::{poll_job, spawn_poll, PollHandle, PollOutcome, PollPolicy};
pub use remote::{ArchiveInfo, BuilderClient, Framework, JobForm, JobSnapshot, JobState};
pub use session::Session;
pub use view::{render_status_line, StatusView, TerminalView};
