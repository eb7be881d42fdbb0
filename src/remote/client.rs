// ABOUTME: HTTP client for the app builder job API
// ABOUTME: Handles job submission, status fetches and archive downloads

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{header, Client, Response};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::models::{JobCreated, JobForm, JobSnapshot};
use crate::config::ClientConfig;
use crate::error::BuilderError;

#[derive(Clone)]
pub struct BuilderClient {
    client: Client,
    api_base_url: String,
}

/// A downloaded archive after it has been moved into place.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

impl BuilderClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("app-builder/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: config.api_base(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/api/jobs/{}", self.api_base_url, job_id)
    }

    pub fn download_url(&self, job_id: &str) -> String {
        format!("{}/download", self.job_url(job_id))
    }

    /// Posts the form to `/api/jobs`. Any non-2xx is a `QueueFailed`.
    pub async fn submit_job(&self, form: &JobForm) -> Result<JobCreated> {
        form.validate()?;
        let url = format!("{}/api/jobs", self.api_base_url);

        let response = self
            .client
            .post(&url)
            .multipart(form.to_multipart())
            .send()
            .await
            .with_context(|| format!("Failed to reach the job service at {}", url))
            .map_err(|e| BuilderError::QueueFailed(format!("{:#}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BuilderError::QueueFailed(format!("status {}: {}", status, body.trim())).into());
        }

        let created: JobCreated = response
            .json()
            .await
            .map_err(|e| BuilderError::QueueFailed(format!("unreadable job response: {}", e)))?;

        tracing::info!(job_id = %created.job_id, "job queued");
        Ok(created)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobSnapshot> {
        let url = self.job_url(job_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get job status from the job service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to get job status {}: {}", status, body.trim());
        }

        let snapshot: JobSnapshot = response
            .json()
            .await
            .context("Failed to parse job status")?;

        Ok(snapshot)
    }

    /// Fetches the finished job's archive into `dest`.
    pub async fn download_archive(&self, job_id: &str, dest: &Path) -> Result<ArchiveInfo> {
        let url = self.download_url(job_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to download job archive")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Archive download failed with status {}: {}", status, body.trim());
        }

        save_response(response, dest).await
    }

    /// Runs a build through the synchronous `/generate` endpoint.
    ///
    /// The archive is written to `dest` when given, otherwise into `dir` under
    /// the name the server suggests.
    pub async fn generate(&self, form: &JobForm, dest: Option<&Path>, dir: &Path) -> Result<ArchiveInfo> {
        form.validate()?;
        let url = format!("{}/generate", self.api_base_url);

        // Generation holds the request open for the whole build.
        let response = self
            .client
            .post(&url)
            .multipart(form.to_multipart())
            .timeout(std::time::Duration::from_secs(30 * 60))
            .send()
            .await
            .context("Failed to reach the generate endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Generation failed with status {}: {}", status, body.trim());
        }

        let path = match dest {
            Some(p) => p.to_path_buf(),
            None => {
                let name = response
                    .headers()
                    .get(header::CONTENT_DISPOSITION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(filename_from_disposition)
                    .unwrap_or_else(|| "app.zip".to_string());
                dir.join(name)
            }
        };

        save_response(response, &path).await
    }
}

/// Streams the body into a temp file beside `dest`, then renames it into place.
async fn save_response(response: Response, dest: &Path) -> Result<ArchiveInfo> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Connection dropped while downloading archive")?;
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        tmp.write_all(&chunk)
            .context("Failed to write archive to disk")?;
    }
    tmp.flush().context("Failed to write archive to disk")?;

    tmp.persist(dest)
        .with_context(|| format!("Failed to move archive to {}", dest.display()))?;

    let sha256 = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();

    tracing::info!(path = %dest.display(), bytes, "archive saved");
    Ok(ArchiveInfo {
        path: dest.to_path_buf(),
        bytes,
        sha256,
    })
}

/// Extracts a safe file name from a `Content-Disposition` header value.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = value.split(';').map(str::trim).find_map(|part| {
        let (key, val) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| val.trim().trim_matches('"').to_string())
    })?;

    // Keep only the final component so a header cannot point outside the target dir.
    let name = Path::new(&raw).file_name()?.to_str()?.to_string();
    if name.is_empty() || name == ".." {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BuilderClient::new(&ClientConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let config = ClientConfig {
            base_url: "https://builder.example.com/".to_string(),
            ..ClientConfig::default()
        };
        let client = BuilderClient::new(&config).unwrap();
        assert_eq!(client.job_url("abc"), "https://builder.example.com/api/jobs/abc");
        assert_eq!(
            client.download_url("abc"),
            "https://builder.example.com/api/jobs/abc/download"
        );
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="ai-app-x1.zip""#),
            Some("ai-app-x1.zip".to_string())
        );
        assert_eq!(
            filename_from_disposition("attachment; FILENAME=plain.zip"),
            Some("plain.zip".to_string())
        );
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../etc/passwd""#),
            Some("passwd".to_string())
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }
}
