//! Health and readiness tracking for the diagnosis service
//!
//! Liveness reflects the artifact-backed components. Readiness follows the
//! one-time startup phase: traffic is admitted only after every artifact has
//! loaded, and a failed load never becomes ready.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names for health tracking
pub mod components {
    pub const REGISTRY: &str = "registry";
    pub const CLASSIFIERS: &str = "classifiers";
    pub const METADATA: &str = "metadata";

    /// Every component the startup phase loads
    pub const ALL: [&str; 3] = [REGISTRY, CLASSIFIERS, METADATA];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, with reduced quality
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components; no components counts as healthy
    pub fn compute_status<'a>(
        components: impl IntoIterator<Item = &'a ComponentHealth>,
    ) -> ComponentStatus {
        components
            .into_iter()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Where the process is in its one-time artifact load
#[derive(Debug)]
enum StartupPhase {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug)]
struct HealthState {
    phase: StartupPhase,
    components: BTreeMap<String, ComponentHealth>,
}

/// Shared health state; clones observe the same registry
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState {
                phase: StartupPhase::Loading,
                components: BTreeMap::new(),
            })),
        }
    }

    /// Register components as healthy; a running process is live even while loading
    pub async fn register_all(&self, names: &[&str]) {
        let mut state = self.state.write().await;
        for name in names {
            state
                .components
                .insert(name.to_string(), ComponentHealth::healthy());
        }
    }

    async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Startup finished: every component healthy and traffic admitted
    pub async fn mark_loaded(&self) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            state
                .components
                .insert(name.to_string(), ComponentHealth::healthy());
        }
        state.phase = StartupPhase::Ready;
    }

    /// Startup failed. Loading is all-or-nothing, so no component is usable.
    pub async fn mark_startup_failed(&self, reason: &str) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            state
                .components
                .insert(name.to_string(), ComponentHealth::unhealthy(reason));
        }
        state.phase = StartupPhase::Failed(reason.to_string());
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(state.components.values()),
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = match &state.phase {
            StartupPhase::Loading => Some("Artifacts not yet loaded".to_string()),
            StartupPhase::Failed(reason) => Some(format!("Startup failed: {}", reason)),
            StartupPhase::Ready => None,
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
