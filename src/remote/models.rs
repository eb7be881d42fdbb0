// ABOUTME: Data structures for the job API: the submitted form and the status snapshots
// ABOUTME: Snapshots are deserialized leniently since the client only observes them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BuilderError;

/// App framework the server scaffolds the generated code for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    #[default]
    Streamlit,
    Gradio,
    /// Plain script, no framework wrapper.
    Python,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Streamlit => "streamlit",
            Framework::Gradio => "gradio",
            Framework::Python => "python",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = BuilderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streamlit" => Ok(Framework::Streamlit),
            "gradio" => Ok(Framework::Gradio),
            "python" | "raw" => Ok(Framework::Python),
            other => Err(BuilderError::InvalidForm(format!(
                "unknown framework '{}' (expected streamlit, gradio or python)",
                other
            ))),
        }
    }
}

/// Ordered text fields posted as `multipart/form-data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobForm {
    fields: Vec<(String, String)>,
}

impl JobForm {
    pub fn new(prompt: impl Into<String>, framework: Framework) -> Self {
        Self::default()
            .field("prompt", prompt)
            .field("framework", framework.as_str())
    }

    /// Appends a field. Repeated names are kept, as a browser form would send them.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn validate(&self) -> Result<(), BuilderError> {
        match self.get("prompt") {
            Some(p) if !p.trim().is_empty() => {}
            _ => {
                return Err(BuilderError::InvalidForm(
                    "prompt must not be empty".to_string(),
                ))
            }
        }
        Ok(())
    }

    pub fn to_multipart(&self) -> reqwest::multipart::Form {
        self.fields
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            })
    }
}

/// Parses `key=value`, as given on the command line.
pub fn parse_field(raw: &str) -> Result<(String, String), BuilderError> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(BuilderError::InvalidForm(format!(
            "field '{}' is not of the form key=value",
            raw
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobCreated {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobSnapshot {
    pub status: String, // "queued", "running", "succeeded", "failed"
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client-side projection of the server's lifecycle labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Succeeded,
    Failed,
    /// Anything else, including labels this client has never seen.
    Pending(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending(_))
    }
}

impl JobSnapshot {
    pub fn state(&self) -> JobState {
        match self.status.as_str() {
            "succeeded" => JobState::Succeeded,
            "failed" => JobState::Failed,
            other => JobState::Pending(other.to_string()),
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress.unwrap_or(0.0)
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// Progress as a whole percentage, rounding halves up.
    pub fn percent(&self) -> i64 {
        (self.progress() * 100.0 + 0.5).floor() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_defaults_when_fields_missing() {
        let snap: JobSnapshot = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(snap.progress(), 0.0);
        assert_eq!(snap.message(), "");
        assert_eq!(snap.state(), JobState::Pending("queued".to_string()));
    }

    #[test]
    fn test_snapshot_accepts_nulls_and_extra_fields() {
        let snap: JobSnapshot = serde_json::from_str(
            r#"{"id":"abc","status":"running","progress":null,"message":null,"prompt":"x"}"#,
        )
        .unwrap();
        assert_eq!(snap.percent(), 0);
        assert_eq!(snap.message(), "");
    }

    #[test]
    fn test_terminal_states() {
        let ok: JobSnapshot = serde_json::from_str(r#"{"status":"succeeded"}"#).unwrap();
        let bad: JobSnapshot = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        let odd: JobSnapshot = serde_json::from_str(r#"{"status":"SUCCEEDED"}"#).unwrap();
        assert!(ok.state().is_terminal());
        assert!(bad.state().is_terminal());
        assert!(!odd.state().is_terminal());
    }

    #[test]
    fn test_percent_rounds_like_the_browser() {
        let snap = |p: f64| JobSnapshot {
            status: "running".to_string(),
            progress: Some(p),
            message: None,
        };
        assert_eq!(snap(0.42).percent(), 42);
        assert_eq!(snap(0.005).percent(), 1);
        assert_eq!(snap(1.0).percent(), 100);
        assert_eq!(snap(0.994).percent(), 99);
    }

    #[test]
    fn test_form_keeps_field_order() {
        let form = JobForm::new("a todo app", Framework::Gradio).field("theme", "dark");
        let names: Vec<&str> = form.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["prompt", "framework", "theme"]);
        assert_eq!(form.get("framework"), Some("gradio"));
    }

    #[test]
    fn test_form_validation() {
        assert!(JobForm::new("  ", Framework::Streamlit).validate().is_err());
        assert!(JobForm::new("hello", Framework::Python).validate().is_ok());
        // Free-form fields are forwarded as given; the server decides what they mean.
        let custom = JobForm::default()
            .field("prompt", "hello")
            .field("framework", "flask");
        assert!(custom.validate().is_ok());
        assert!(JobForm::default().validate().is_err());
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("theme=dark=ish").unwrap(),
            ("theme".to_string(), "dark=ish".to_string())
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=x").is_err());
    }

    #[test]
    fn test_framework_parse() {
        assert_eq!("Gradio".parse::<Framework>().unwrap(), Framework::Gradio);
        assert_eq!("raw".parse::<Framework>().unwrap(), Framework::Python);
        assert!("flask".parse::<Framework>().is_err());
    }
}
