// ABOUTME: Remote job API module
// ABOUTME: Wire types and the HTTP client for the app builder service

pub mod client;
pub mod models;

pub use client::{ArchiveInfo, BuilderClient};
pub use models::{Framework, JobCreated, JobForm, JobSnapshot, JobState};
