use crate::rowkey::DEFAULT_WINDOW_DURATION_MILLIS;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default TTL multiplier: an accumulator may sit idle for three window
/// durations before it is discarded.
pub const DEFAULT_TTL_MULTIPLIER: u32 = 3;

/// Errors surfaced while loading or validating profile definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read profiler config {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse profiler config {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("profile at position {0} has an empty name")]
    EmptyProfileName(usize),
    #[error("profile '{profile}' is missing its '{field}' expression")]
    MissingExpression { profile: String, field: String },
    #[error("profile '{0}' declares a zero window duration")]
    ZeroWindowDuration(String),
    #[error("profile '{0}' declares a zero TTL multiplier")]
    ZeroTtlMultiplier(String),
    #[error("duplicate profile name '{0}'")]
    DuplicateProfile(String),
}

/// One profile: what to compute, for which entities, and how to evolve
/// the accumulator across the window.
///
/// Expressions are opaque strings handed to the configured
/// [`ExpressionEvaluator`](crate::evaluate::ExpressionEvaluator).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProfileDefinition {
    /// Profile name; part of every row-key identity.
    pub name: String,
    /// Predicate deciding whether a message contributes to this profile.
    pub applies: String,
    /// Expression producing the entity identifier for a message.
    pub entity: String,
    /// Ordered group-by expressions; values become part of the identity.
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Variable initializers run once when an accumulator is created.
    #[serde(default)]
    pub init: BTreeMap<String, String>,
    /// Variable updates run for every contributing message.
    #[serde(default)]
    pub update: BTreeMap<String, String>,
    /// Expression producing the final value when the window closes.
    pub result: String,
    #[serde(default = "default_window_duration_millis")]
    pub window_duration_millis: u64,
    #[serde(default = "default_ttl_multiplier")]
    pub ttl_multiplier: u32,
}

impl ProfileDefinition {
    /// Maximum idle time before the accumulator is discarded unflushed.
    pub fn ttl_millis(&self) -> u64 {
        self.window_duration_millis
            .saturating_mul(u64::from(self.ttl_multiplier))
    }
}

fn default_window_duration_millis() -> u64 {
    DEFAULT_WINDOW_DURATION_MILLIS
}

fn default_ttl_multiplier() -> u32 {
    DEFAULT_TTL_MULTIPLIER
}

/// Ordered collection of profile definitions. Definition order is part of
/// the routing contract: routes for one message are emitted in this order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerConfig {
    profiles: Vec<ProfileDefinition>,
}

impl ProfilerConfig {
    /// Validates and wraps a list of definitions.
    pub fn new(profiles: Vec<ProfileDefinition>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for (position, profile) in profiles.iter().enumerate() {
            if profile.name.is_empty() {
                return Err(ConfigError::EmptyProfileName(position));
            }
            for (field, expression) in [
                ("applies", &profile.applies),
                ("entity", &profile.entity),
                ("result", &profile.result),
            ] {
                if expression.is_empty() {
                    return Err(ConfigError::MissingExpression {
                        profile: profile.name.clone(),
                        field: field.to_string(),
                    });
                }
            }
            if profile.window_duration_millis == 0 {
                return Err(ConfigError::ZeroWindowDuration(profile.name.clone()));
            }
            if profile.ttl_multiplier == 0 {
                return Err(ConfigError::ZeroTtlMultiplier(profile.name.clone()));
            }
            if !seen.insert(profile.name.clone()) {
                return Err(ConfigError::DuplicateProfile(profile.name.clone()));
            }
        }
        Ok(Self { profiles })
    }

    pub fn profiles(&self) -> &[ProfileDefinition] {
        &self.profiles
    }

    pub fn definition(&self, name: &str) -> Option<&ProfileDefinition> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ProfilerConfigFile {
    profiles: Vec<ProfileDefinition>,
}

/// Loads and validates a profiler configuration from a JSON document.
pub fn load_profiler_config(path: impl AsRef<Path>) -> Result<ProfilerConfig, ConfigError> {
    let path_ref = path.as_ref();
    let payload = fs::read_to_string(path_ref).map_err(|source| ConfigError::ReadError {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let file: ProfilerConfigFile =
        serde_json::from_str(&payload).map_err(|source| ConfigError::ParseError {
            path: path_ref.to_path_buf(),
            source,
        })?;
    ProfilerConfig::new(file.profiles)
}
