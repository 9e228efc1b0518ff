//! Picks the model identifier used for every generation call of the process.
//!
//! Upstream renames and retires model names every few months, so the name is
//! looked up against the live listing once and then reused until exit.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::gemini::GeminiError;

/// Anything that can list the model identifiers currently served.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn available_models(&self) -> Result<Vec<String>, GeminiError>;
}

/// Ordered preferences plus the normalization applied to the chosen name.
#[derive(Debug, Clone)]
pub struct ResolverPolicy {
    preferences: Vec<String>,
    strip_prefix: Option<String>,
    list_timeout: Duration,
}

impl ResolverPolicy {
    pub fn new(
        preferences: Vec<String>,
        strip_prefix: Option<String>,
        list_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if preferences.is_empty() {
            return Err(ConfigError::EmptyPreferences);
        }
        Ok(Self {
            preferences,
            strip_prefix: strip_prefix.filter(|p| !p.is_empty()),
            list_timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.model_preferences.clone(),
            config.strip_prefix.clone(),
            config.list_timeout,
        )
    }

    /// Last-resort guess, returned as written.
    fn first_preference(&self) -> &str {
        &self.preferences[0]
    }

    fn normalize(&self, model: &str) -> String {
        match &self.strip_prefix {
            Some(prefix) => model.strip_prefix(prefix.as_str()).unwrap_or(model).to_string(),
            None => model.to_string(),
        }
    }

    /// First preference present in `available`, else the first listed model.
    fn choose(&self, available: &[String]) -> Option<(String, Resolution)> {
        let listed: HashSet<&str> = available.iter().map(String::as_str).collect();

        if let Some(candidate) = self.preferences.iter().find(|p| listed.contains(p.as_str())) {
            return Some((
                self.normalize(candidate),
                Resolution::Preferred {
                    matched: candidate.clone(),
                },
            ));
        }

        available
            .first()
            .map(|first| (self.normalize(first), Resolution::FirstAvailable))
    }
}

/// How the model was picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// A preference matched the listing exactly.
    Preferred { matched: String },
    /// Nothing preferred is served; whatever the listing put first was taken.
    FirstAvailable,
    /// The listing failed or was empty; the first preference is a guess.
    Guessed { reason: String },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Preferred { matched } => write!(f, "preferred ({})", matched),
            Resolution::FirstAvailable => write!(f, "first available"),
            Resolution::Guessed { reason } => write!(f, "guessed ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModel {
    pub model: String,
    pub resolution: Resolution,
}

type SharedLookup = Shared<BoxFuture<'static, ResolvedModel>>;

/// Resolves the generation model once per process and hands out the result.
pub struct ModelResolver<C> {
    catalog: Arc<C>,
    policy: ResolverPolicy,
    in_flight: OnceCell<SharedLookup>,
    resolved: OnceCell<ResolvedModel>,
}

impl<C: ModelCatalog + 'static> ModelResolver<C> {
    pub fn new(catalog: Arc<C>, policy: ResolverPolicy) -> Self {
        Self {
            catalog,
            policy,
            in_flight: OnceCell::new(),
            resolved: OnceCell::new(),
        }
    }

    /// Model identifier for generation calls. Never fails.
    pub async fn model(&self) -> &str {
        &self.resolve().await.model
    }

    /// The lookup runs on its own task, so a caller that goes away does not
    /// abandon it; every caller awaits the same shared result.
    pub async fn resolve(&self) -> &ResolvedModel {
        if let Some(resolved) = self.resolved.get() {
            return resolved;
        }

        let lookup = self.in_flight.get_or_init(|| self.spawn_lookup()).clone();
        let resolved = lookup.await;
        self.resolved.get_or_init(|| resolved)
    }

    fn spawn_lookup(&self) -> SharedLookup {
        let catalog = self.catalog.clone();
        let policy = self.policy.clone();
        let handle = tokio::spawn(async move { lookup(catalog.as_ref(), &policy).await });
        let fallback = self.policy.first_preference().to_string();

        async move {
            handle.await.unwrap_or_else(|e| ResolvedModel {
                model: fallback,
                resolution: Resolution::Guessed {
                    reason: format!("lookup task failed: {}", e),
                },
            })
        }
        .boxed()
        .shared()
    }
}

async fn lookup<C: ModelCatalog + ?Sized>(catalog: &C, policy: &ResolverPolicy) -> ResolvedModel {
    let listing = tokio::time::timeout(policy.list_timeout, catalog.available_models()).await;

    let reason = match listing {
        Ok(Ok(available)) => match policy.choose(&available) {
            Some((model, resolution)) => {
                if resolution == Resolution::FirstAvailable {
                    warn!(
                        model = %model,
                        preferences = ?policy.preferences,
                        "no preferred model is served, falling back to first listed model"
                    );
                } else {
                    info!(model = %model, %resolution, "model resolved");
                }
                return ResolvedModel { model, resolution };
            }
            None => "listing returned no generation models".to_string(),
        },
        Ok(Err(e)) => format!("listing failed: {}", e),
        Err(_) => format!(
            "listing timed out after {}s",
            policy.list_timeout.as_secs_f32()
        ),
    };

    let model = policy.first_preference().to_string();
    warn!(model = %model, %reason, "model listing unusable, guessing first preference");

    ResolvedModel {
        model,
        resolution: Resolution::Guessed { reason },
    }
}
