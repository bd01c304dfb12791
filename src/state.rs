//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor:
//! configuration, metrics, the session registry, and the dependency-injected
//! collaborators. Everything mutable sits behind `Arc<RwLock<T>>` so
//! concurrent requests can read while runtime config updates take the write
//! lock; the collaborators themselves are immutable once constructed.

use crate::config::AppConfig;
use crate::openai::ChatCompletion;
use crate::voice::{SessionRegistry, VoicePipeline};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all handlers.
///
/// ## Construction:
/// Built once in `main` with explicitly constructed collaborators; nothing
/// here is a global. The same `chat` collaborator instance backs both the
/// voice pipeline and the subtopics endpoint.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Request and turn metrics
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Table of live voice sessions
    pub registry: Arc<SessionRegistry>,

    /// The audio turn pipeline, shared by every session
    pub pipeline: Arc<VoicePipeline>,

    /// Chat collaborator for the subtopics endpoint
    pub chat: Arc<dyn ChatCompletion>,

    /// When the server started
    pub start_time: Instant,
}

/// Metrics collected across all requests and voice turns.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of request errors since server start
    pub error_count: u64,

    /// Voice turns that produced an outbound audio frame
    pub turns_completed: u64,

    /// Voice turns that failed in the pipeline
    pub turns_failed: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<SessionRegistry>,
        pipeline: Arc<VoicePipeline>,
        chat: Arc<dyn ChatCompletion>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            registry,
            pipeline,
            chat,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other requests are not
    /// blocked while the caller works with the snapshot.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    ///
    /// The session capacity is written through to the registry so the limit
    /// the registry enforces always matches the active configuration.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                self.registry
                    .set_capacity(new_config.session.max_concurrent_sessions);
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record a finished voice turn, successful or not.
    pub fn record_turn(&self, succeeded: bool) {
        let mut metrics = self.metrics.write().unwrap();
        if succeeded {
            metrics.turns_completed += 1;
        } else {
            metrics.turns_failed += 1;
        }
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics for the /metrics endpoint.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            turns_completed: metrics.turns_completed,
            turns_failed: metrics.turns_failed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{ChatCompletion, CollaboratorError, SpeechToText, TextToSpeech};
    use async_trait::async_trait;

    struct NoopCollaborator;

    #[async_trait]
    impl SpeechToText for NoopCollaborator {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String, CollaboratorError> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl ChatCompletion for NoopCollaborator {
        async fn complete(
            &self,
            _system_instruction: &str,
            _user_text: &str,
        ) -> Result<String, CollaboratorError> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl TextToSpeech for NoopCollaborator {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, CollaboratorError> {
            Ok(Vec::new())
        }
    }

    fn state() -> AppState {
        let collaborator = Arc::new(NoopCollaborator);
        let pipeline = Arc::new(VoicePipeline::new(
            collaborator.clone(),
            collaborator.clone(),
            collaborator.clone(),
        ));
        AppState::new(
            AppConfig::default(),
            Arc::new(SessionRegistry::new(10)),
            pipeline,
            collaborator,
        )
    }

    #[test]
    fn test_turn_counters() {
        let state = state();
        state.record_turn(true);
        state.record_turn(true);
        state.record_turn(false);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.turns_completed, 2);
        assert_eq!(snapshot.turns_failed, 1);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    /// Raising `session.max_concurrent_sessions` through a config update
    /// must change what the registry enforces, not just what `/health`
    /// reports.
    #[test]
    fn test_update_config_applies_new_session_capacity() {
        use crate::voice::SessionEntry;

        let collaborator = Arc::new(NoopCollaborator);
        let pipeline = Arc::new(VoicePipeline::new(
            collaborator.clone(),
            collaborator.clone(),
            collaborator.clone(),
        ));
        let mut config = AppConfig::default();
        config.session.max_concurrent_sessions = 2;
        let registry = Arc::new(SessionRegistry::new(config.session.max_concurrent_sessions));
        let state = AppState::new(config, Arc::clone(&registry), pipeline, collaborator);

        let profile = crate::voice::UserProfile {
            target_language: "Spanish".to_string(),
            topic: "Animals".to_string(),
            user_age: 7,
            proficiency_level: "beginner".to_string(),
        };
        registry
            .register("a", SessionEntry::new(profile.clone()))
            .unwrap();
        registry
            .register("b", SessionEntry::new(profile.clone()))
            .unwrap();
        assert!(registry.register("c", SessionEntry::new(profile.clone())).is_err());

        let mut updated = state.get_config();
        updated.session.max_concurrent_sessions = 5;
        state.update_config(updated).unwrap();

        registry.register("c", SessionEntry::new(profile)).unwrap();
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let state = state();
        let mut bad = AppConfig::default();
        bad.server.port = 0;
        assert!(state.update_config(bad).is_err());
        // Original config untouched
        assert_eq!(state.get_config().server.port, 8080);
    }
}
