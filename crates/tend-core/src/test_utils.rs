//! Test utilities for tend-core
//!
//! A mock Ollama server for exercising the real HTTP backend, plus builders
//! for generation contexts.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ai::{SuggestedInsight, SuggestionSet};
use crate::models::{BehaviorRecord, Category, GenerationContext, TimeWindow};

/// How the mock server answers `/api/generate`
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    pub suggestions: Vec<SuggestedInsight>,
    /// Delay before every generate response
    pub delay: Duration,
    /// Answer generate calls with HTTP 500
    pub fail: bool,
    /// Answer health checks with HTTP 503
    pub unhealthy: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        let mut suggestion = SuggestedInsight::new(
            Category::Coping,
            "Ride the wave",
            "When the next urge comes, set a ten minute timer and notice how it changes before deciding anything.",
        );
        suggestion.priority = Some("medium".to_string());
        suggestion.confidence = Some(0.75);
        suggestion.technique = Some("urge_surfing".to_string());
        suggestion.advice = vec!["Set a ten minute timer".to_string()];

        Self {
            suggestions: vec![suggestion],
            delay: Duration::ZERO,
            fail: false,
            unhealthy: false,
        }
    }
}

struct MockState {
    config: MockServerConfig,
    generate_calls: AtomicUsize,
}

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(MockServerConfig::default()).await
    }

    pub async fn start_with(config: MockServerConfig) -> Self {
        let state = Arc::new(MockState {
            config,
            generate_calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of `/api/generate` requests received
    pub fn generate_calls(&self) -> usize {
        self.state.generate_calls.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
}

async fn handle_tags(State(state): State<Arc<MockState>>) -> Result<Json<TagsResponse>, StatusCode> {
    if state.config.unhealthy {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
        }],
    }))
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

async fn handle_generate(
    State(state): State<Arc<MockState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, StatusCode> {
    state.generate_calls.fetch_add(1, Ordering::SeqCst);

    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }
    if state.config.fail {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    // A real model never sees record ids or subject ids
    if request.prompt.contains("subject_id") {
        return Err(StatusCode::BAD_REQUEST);
    }

    let set = SuggestionSet {
        insights: state.config.suggestions.clone(),
    };
    Ok(Json(GenerateResponse {
        model: request.model,
        response: serde_json::to_string(&set).unwrap(),
        done: true,
    }))
}

/// `count` hourly records ending one hour before `now`, oldest first
pub fn records(count: usize, intensity: f64, resistance: f64, now: DateTime<Utc>) -> Vec<BehaviorRecord> {
    (0..count)
        .map(|i| {
            BehaviorRecord::new(
                format!("rec-{}", i),
                "smoking",
                intensity,
                resistance,
                now - chrono::Duration::hours((count - i) as i64),
            )
        })
        .collect()
}

/// Context with a profile, the given records and a seven-day window
pub fn context(subject_id: &str, records: Vec<BehaviorRecord>, now: DateTime<Utc>) -> GenerationContext {
    GenerationContext::new(subject_id, TimeWindow::last_days(now, 7))
        .with_profile()
        .with_records(records)
}

/// Ten records where exactly three of the last ten show resistance >= 7
pub fn mixed_resistance_records(now: DateTime<Utc>) -> Vec<BehaviorRecord> {
    let mut list = records(10, 6.0, 3.0, now);
    for index in [2, 5, 8] {
        list[index].resistance = 8.0;
    }
    list
}
