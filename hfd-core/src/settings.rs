// SPDX-License-Identifier: MIT
//! Job-wide configuration, constructed once from the environment.
//!
//! Per §9 of the design notes: proxy and token defaults are discovered from
//! the environment at construction time only. Every other core function
//! receives a `&Settings` and never reads the environment itself.

use std::path::PathBuf;
use std::time::Duration;

/// Which checks are performed on a finalized blob. LFS items always have
/// their declared SHA-256 checked regardless of this setting; this only
/// controls non-LFS files and whether LFS also gets the cheaper size check
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    None,
    Size,
    #[default]
    Sha256,
}

/// A bearer token whose `Debug` impl never prints the value, so it can't
/// leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Token(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the cache, containing `hub/`, `models/`, `datasets/`.
    pub cache_dir: PathBuf,
    /// Override for `hub/`'s location; defaults to `cache_dir/hub`.
    pub hub_dir: PathBuf,
    pub token: Option<Token>,
    pub proxy: Option<String>,
    pub offline: bool,

    pub max_active_files: usize,
    pub connections_per_file: usize,
    pub multipart_threshold: u64,
    pub min_part_size: u64,

    pub verify_mode: VerifyMode,
    pub stale_timeout: Duration,

    pub retry_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,

    pub request_timeout: Duration,
    pub connect_timeout: Duration,

    pub endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        let cache_dir = default_cache_dir();
        let hub_dir = cache_dir.join("hub");
        Settings {
            cache_dir,
            hub_dir,
            token: None,
            proxy: None,
            offline: false,
            max_active_files: 3,
            connections_per_file: 8,
            multipart_threshold: 4 * 1024 * 1024,
            min_part_size: 4 * 1024 * 1024,
            verify_mode: VerifyMode::default(),
            stale_timeout: Duration::from_secs(600),
            retry_attempts: 4,
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            endpoint: "https://huggingface.co".to_string(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    if let Ok(explicit) = std::env::var("HF_HUB_CACHE") {
        return PathBuf::from(explicit);
    }
    if let Ok(home) = std::env::var("HF_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("huggingface")
}

impl Settings {
    /// Build settings from the environment, following the discovery order
    /// documented in spec.md §6: explicit `cache_dir` argument, then
    /// `HF_HOME`, then `~/.cache/<hub-brand>/`. `hub/` may be overridden
    /// independently via `HF_HUB_CACHE_HUB`.
    pub fn from_env(explicit_cache_dir: Option<PathBuf>) -> Self {
        let mut settings = Settings::default();
        if let Some(dir) = explicit_cache_dir {
            settings.cache_dir = dir;
        }
        settings.hub_dir = std::env::var("HF_HUB_CACHE_HUB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| settings.cache_dir.join("hub"));

        if let Ok(token) = std::env::var("HF_TOKEN") {
            if !token.is_empty() {
                settings.token = Some(Token::new(token));
            }
        }
        for var in ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"] {
            if let Ok(proxy) = std::env::var(var) {
                settings.proxy = Some(proxy);
                break;
            }
        }
        settings.offline = std::env::var("HF_HUB_OFFLINE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        settings
    }

    pub fn models_dir(&self) -> PathBuf {
        self.cache_dir.join("models")
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.cache_dir.join("datasets")
    }
}
