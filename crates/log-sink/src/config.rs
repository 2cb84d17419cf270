// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::dispatcher::DispatcherConfig;
use crate::error::ConfigError;
use crate::ingress::{BasicCredentials, IngressConfig};
use crate::retry::{Backoff, RetryPolicy};
use crate::token::TokenFactory;

const DEFAULT_UPSTREAM_PATH: &str = "/api/instance-logs";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_IN_FLIGHT: usize = 16;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB in Bytes
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Base address of the upstream collector, e.g. `https://logs.example.org`
    pub upstream_base_url: String,
    /// Path appended to the base address for every forwarded payload
    pub upstream_path: String,
    pub host: String,
    pub port: u16,
    pub credentials: BasicCredentials,
    pub token: TokenFactory,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Backoff,
    pub max_in_flight: usize,
    pub queue_capacity: usize,
    /// How long in-flight deliveries may keep running once shutdown starts
    pub shutdown_timeout: Duration,
    pub max_content_length: usize,
    pub proxy_url: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Config, ConfigError> {
        let upstream_base_url = required("LOG_SINK_UPSTREAM_URL")?;
        let upstream_path = env::var("LOG_SINK_UPSTREAM_PATH")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_PATH.to_string());

        let credentials = BasicCredentials::new(
            &required("LOG_SINK_USERNAME")?,
            &required("LOG_SINK_PASSWORD")?,
        );

        // A static token wins over a token file when both are set.
        let token = match (
            env::var("LOG_SINK_TOKEN").ok().filter(|t| !t.is_empty()),
            env::var("LOG_SINK_TOKEN_FILE").ok().filter(|p| !p.is_empty()),
        ) {
            (Some(token), _) => TokenFactory::new_from_static_token(&token),
            (None, Some(path)) => TokenFactory::new_from_file(path),
            (None, None) => {
                return Err(ConfigError::Missing("LOG_SINK_TOKEN or LOG_SINK_TOKEN_FILE"))
            }
        };

        let backoff_ms: u64 = parse_or("LOG_SINK_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?;
        let backoff = match (backoff_ms, optional::<u64>("LOG_SINK_RETRY_BACKOFF_MAX_MS")?) {
            (0, _) => Backoff::Immediate,
            (base, Some(max)) => Backoff::Exponential {
                base: Duration::from_millis(base),
                max: Duration::from_millis(max.max(base)),
            },
            (base, None) => Backoff::Fixed(Duration::from_millis(base)),
        };

        let config = Config {
            upstream_base_url,
            upstream_path,
            host: env::var("LOG_SINK_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_or("LOG_SINK_PORT", DEFAULT_PORT)?,
            credentials,
            token,
            max_attempts: parse_or("LOG_SINK_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            attempt_timeout: Duration::from_millis(parse_or(
                "LOG_SINK_ATTEMPT_TIMEOUT_MS",
                DEFAULT_ATTEMPT_TIMEOUT_MS,
            )?),
            backoff,
            max_in_flight: parse_or("LOG_SINK_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT)?,
            queue_capacity: parse_or("LOG_SINK_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            shutdown_timeout: Duration::from_millis(parse_or(
                "LOG_SINK_SHUTDOWN_TIMEOUT_MS",
                DEFAULT_SHUTDOWN_TIMEOUT_MS,
            )?),
            max_content_length: parse_or(
                "LOG_SINK_MAX_CONTENT_LENGTH",
                DEFAULT_MAX_CONTENT_LENGTH,
            )?,
            proxy_url: env::var("LOG_SINK_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            log_level: env::var("LOG_SINK_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.upstream_base_url.starts_with("http://")
            || self.upstream_base_url.starts_with("https://"))
        {
            return Err(invalid(
                "LOG_SINK_UPSTREAM_URL",
                "must start with http:// or https://",
            ));
        }
        if self.max_attempts == 0 {
            return Err(invalid("LOG_SINK_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.attempt_timeout.is_zero() {
            return Err(invalid("LOG_SINK_ATTEMPT_TIMEOUT_MS", "must be greater than 0"));
        }
        if self.max_in_flight == 0 {
            return Err(invalid("LOG_SINK_MAX_IN_FLIGHT", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("LOG_SINK_QUEUE_CAPACITY", "must be at least 1"));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(invalid(
                "LOG_SINK_LOG_LEVEL",
                &format!(
                    "'{}' is not one of: trace, debug, info, warn, error",
                    self.log_level
                ),
            ));
        }
        Ok(())
    }

    /// Full URL every payload is POSTed to
    pub fn upstream_url(&self) -> String {
        let base = self.upstream_base_url.trim_end_matches('/');
        if self.upstream_path.is_empty() {
            return base.to_string();
        }
        if self.upstream_path.starts_with('/') {
            format!("{base}{}", self.upstream_path)
        } else {
            format!("{base}/{}", self.upstream_path)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.attempt_timeout, self.backoff)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_in_flight: self.max_in_flight,
            queue_capacity: self.queue_capacity,
            retry_policy: self.retry_policy(),
        }
    }

    pub fn ingress_config(&self) -> IngressConfig {
        IngressConfig {
            host: self.host.clone(),
            port: self.port,
            credentials: self.credentials.clone(),
            max_content_length: self.max_content_length,
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(name, &e.to_string())),
        Err(_) => Ok(None),
    }
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(optional(name)?.unwrap_or(default))
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
