// ABOUTME: Shared helpers for integration tests
// ABOUTME: A recording StatusView and a client pointed at a wiremock server

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use app_builder_client::{BuilderClient, ClientConfig, PollPolicy, StatusView};
use wiremock::MockServer;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Status(String),
    Progress(i64),
    HideDownload,
    Reveal(String),
    Alert(String),
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Alert(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn revealed(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            ViewEvent::Reveal(u) => Some(u),
            _ => None,
        })
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl StatusView for RecordingView {
    fn set_status(&self, text: &str) {
        self.push(ViewEvent::Status(text.to_string()));
    }

    fn set_progress(&self, percent: i64) {
        self.push(ViewEvent::Progress(percent));
    }

    fn hide_download(&self) {
        self.push(ViewEvent::HideDownload);
    }

    fn reveal_download(&self, url: &str) {
        self.push(ViewEvent::Reveal(url.to_string()));
    }

    fn alert(&self, message: &str) {
        self.push(ViewEvent::Alert(message.to_string()));
    }
}

pub const TICK: Duration = Duration::from_millis(20);

pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: TICK,
        max_duration: Some(Duration::from_secs(10)),
        ..PollPolicy::default()
    }
}

pub fn client_for(server: &MockServer) -> BuilderClient {
    let config = ClientConfig {
        base_url: server.uri(),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    BuilderClient::new(&config).unwrap()
}

pub async fn requests_to(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == path)
        .count()
}

pub async fn request_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect()
}
