//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use trustgate_types::{
    BorderlineParams, ChallengeParams, ChannelRateLimitConfig, FactorKind, GlobalRateLimitConfig,
    ParamError, QueueParams,
};
use trustgate_utils::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid {section} config: {source}")]
    Invalid {
        section: &'static str,
        #[source]
        source: ParamError,
    },
}

impl ConfigError {
    pub fn kind(&self) -> trustgate_types::ErrorKind {
        trustgate_types::ErrorKind::InvalidParameter
    }
}

/// Rate-limit policy per out-of-band channel.
///
/// SSO, AD-SSO and domain-ownership challenges share the `sso` policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRateLimits {
    #[serde(default = "ChannelRateLimitConfig::sms")]
    pub sms: ChannelRateLimitConfig,
    #[serde(default = "ChannelRateLimitConfig::email")]
    pub email: ChannelRateLimitConfig,
    #[serde(default = "ChannelRateLimitConfig::sso")]
    pub sso: ChannelRateLimitConfig,
}

impl ChannelRateLimits {
    pub fn for_method(&self, method: FactorKind) -> &ChannelRateLimitConfig {
        match method {
            FactorKind::Sms => &self.sms,
            FactorKind::Email => &self.email,
            FactorKind::Sso | FactorKind::AdSso | FactorKind::Domain => &self.sso,
        }
    }
}

impl Default for ChannelRateLimits {
    fn default() -> Self {
        Self {
            sms: ChannelRateLimitConfig::sms(),
            email: ChannelRateLimitConfig::email(),
            sso: ChannelRateLimitConfig::sso(),
        }
    }
}

/// Key-domain prefixes used by the storage layer. Each must be unique and
/// no prefix may be a prefix of another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPrefixes {
    pub request: String,
    pub request_by_account: String,
    pub pending_request_by_height: String,
    pub fallback: String,
    pub fallback_by_account: String,
    pub pending_fallback_by_expiry: String,
    pub rate_limit: String,
    pub global_rate_limit: String,
    pub challenge: String,
    pub scope: String,
    pub case: String,
    pub used_nonce: String,
}

impl KeyPrefixes {
    pub fn defaults() -> Self {
        Self {
            request: "vr/".into(),
            request_by_account: "vra/".into(),
            pending_request_by_height: "vrp/".into(),
            fallback: "bf/".into(),
            fallback_by_account: "bfa/".into(),
            pending_fallback_by_expiry: "bfe/".into(),
            rate_limit: "rl/".into(),
            global_rate_limit: "rlg/".into(),
            challenge: "ch/".into(),
            scope: "sc/".into(),
            case: "cs/".into(),
            used_nonce: "un/".into(),
        }
    }

    pub fn all(&self) -> [(&'static str, &str); 12] {
        [
            ("request", self.request.as_str()),
            ("request_by_account", self.request_by_account.as_str()),
            ("pending_request_by_height", self.pending_request_by_height.as_str()),
            ("fallback", self.fallback.as_str()),
            ("fallback_by_account", self.fallback_by_account.as_str()),
            ("pending_fallback_by_expiry", self.pending_fallback_by_expiry.as_str()),
            ("rate_limit", self.rate_limit.as_str()),
            ("global_rate_limit", self.global_rate_limit.as_str()),
            ("challenge", self.challenge.as_str()),
            ("scope", self.scope.as_str()),
            ("case", self.case.as_str()),
            ("used_nonce", self.used_nonce.as_str()),
        ]
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        let all = self.all();
        for (i, &(name, prefix)) in all.iter().enumerate() {
            if prefix.is_empty() {
                return Err(ParamError::new(name, "must not be empty"));
            }
            for &(other_name, other) in all.iter().skip(i + 1) {
                if prefix.starts_with(other) || other.starts_with(prefix) {
                    return Err(ParamError::new(
                        name,
                        format!("overlaps with {other_name} ({prefix:?} / {other:?})"),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self::defaults()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Everything needed to build a [`VerificationEngine`](crate::VerificationEngine).
///
/// Load with [`EngineConfig::from_toml_file`] or build programmatically.
/// Missing sections take their defaults; present sections are validated,
/// never normalised.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub borderline: BorderlineParams,
    #[serde(default)]
    pub challenge: ChallengeParams,
    #[serde(default)]
    pub queue: QueueParams,
    #[serde(default)]
    pub rate_limits: ChannelRateLimits,
    #[serde(default)]
    pub global_rate_limit: GlobalRateLimitConfig,
    #[serde(default)]
    pub key_prefixes: KeyPrefixes,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file and validate it.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |section: &'static str| move |source: ParamError| ConfigError::Invalid { section, source };
        self.borderline.validate().map_err(invalid("borderline"))?;
        self.challenge.validate().map_err(invalid("challenge"))?;
        self.queue.validate().map_err(invalid("queue"))?;
        self.rate_limits.sms.validate().map_err(invalid("rate_limits.sms"))?;
        self.rate_limits
            .email
            .validate()
            .map_err(invalid("rate_limits.email"))?;
        self.rate_limits.sso.validate().map_err(invalid("rate_limits.sso"))?;
        self.global_rate_limit
            .validate()
            .map_err(invalid("global_rate_limit"))?;
        self.key_prefixes.validate().map_err(invalid("key_prefixes"))?;
        if self.borderline.enabled
            && self.borderline.challenge_timeout_secs > self.challenge.max_ttl_secs
        {
            return Err(ConfigError::Invalid {
                section: "borderline",
                source: ParamError::new(
                    "challenge_timeout_secs",
                    "exceeds challenge.max_ttl_secs",
                ),
            });
        }
        Ok(())
    }
}
