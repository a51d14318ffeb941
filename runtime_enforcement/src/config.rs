use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pod::DEFAULT_RUNTIME_CLASS_NAME;
use crate::{Error, Result};

pub const RUNTIME_CLASS_NAME_ENV: &str = "GPU_POD_RUNTIME_CLASS_NAME";
pub const MISSING_RUNTIME_CLASS_POLICY_ENV: &str = "MISSING_RUNTIME_CLASS_POLICY";
pub const TIMEOUT_SECONDS_ENV: &str = "ADMISSION_TIMEOUT_SECONDS";

/// Matches the API server's default webhook timeout
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// What to do with a GPU pod when the configured runtime class is absent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingRuntimeClassPolicy {
    /// Deny the pod with an error naming the missing runtime class
    Reject,
    /// Admit the pod without setting a runtime class
    Skip,
}

impl FromStr for MissingRuntimeClassPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidConfig(format!(
                "unknown missing runtime class policy '{other}', expected 'reject' or 'skip'"
            ))),
        }
    }
}

impl fmt::Display for MissingRuntimeClassPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Runtime enforcement configuration
///
/// An explicitly configured runtime class name implies [`MissingRuntimeClassPolicy::Reject`]
/// and the default name implies [`MissingRuntimeClassPolicy::Skip`], unless a
/// policy is set explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[serde(rename = "gpuPodRuntimeClassName")]
    pub runtime_class_name: Option<String>,
    pub missing_runtime_class: Option<MissingRuntimeClassPolicy>,
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime_class_name: None,
            missing_runtime_class: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Config {
    /// Reads the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let missing_runtime_class = get(MISSING_RUNTIME_CLASS_POLICY_ENV)
            .map(|value| value.parse::<MissingRuntimeClassPolicy>())
            .transpose()?;

        let timeout_seconds = match get(TIMEOUT_SECONDS_ENV) {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(Error::InvalidConfig(format!(
                        "{TIMEOUT_SECONDS_ENV} must be greater than zero"
                    )));
                }
                Ok(seconds) => seconds,
                Err(err) => {
                    return Err(Error::InvalidConfig(format!(
                        "{TIMEOUT_SECONDS_ENV}='{value}': {err}"
                    )));
                }
            },
            None => DEFAULT_TIMEOUT_SECONDS,
        };

        Ok(Self {
            runtime_class_name: get(RUNTIME_CLASS_NAME_ENV),
            missing_runtime_class,
            timeout_seconds,
        })
    }

    #[must_use]
    pub fn with_runtime_class_name(mut self, name: impl Into<String>) -> Self {
        self.runtime_class_name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_missing_runtime_class(mut self, policy: MissingRuntimeClassPolicy) -> Self {
        self.missing_runtime_class = Some(policy);
        self
    }

    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// The runtime class attached to GPU pods
    pub fn runtime_class_name(&self) -> &str {
        self.runtime_class_name
            .as_deref()
            .unwrap_or(DEFAULT_RUNTIME_CLASS_NAME)
    }

    pub fn missing_runtime_class_policy(&self) -> MissingRuntimeClassPolicy {
        match (self.missing_runtime_class, &self.runtime_class_name) {
            (Some(policy), _) => policy,
            (None, Some(_)) => MissingRuntimeClassPolicy::Reject,
            (None, None) => MissingRuntimeClassPolicy::Skip,
        }
    }

    /// Deadline applied to each admission request
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
