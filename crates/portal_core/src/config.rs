/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::engine::EngineSettings;
use crate::UserId;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortalConfig {
    pub db_path: Option<String>,
    pub owner_id: Option<UserId>,
    pub bot_token: Option<String>,
    pub api_base_url: Option<String>,
    pub network_name: Option<String>,
    pub cooldown_secs: Option<u64>,
    pub fanout_delay_ms: Option<u64>,
    pub teardown_delay_ms: Option<u64>,
    pub failure_preview: Option<usize>,
    pub bump_message: Option<String>,
    pub http_attempts: Option<u32>,
    pub http_timeout_secs: Option<u64>,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("net", "portal", "Portal").context("unable to determine platform dirs")
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(v) = std::env::var("PORTAL_DATA_DIR") {
        if !v.trim().is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    Ok(project_dirs()?.data_local_dir().to_path_buf())
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

pub fn parse_config(text: &str) -> Result<PortalConfig> {
    serde_json::from_str(text).context("parse config json")
}

/// Reads the config file. A missing file at the default location yields an empty
/// config; a missing file that was asked for explicitly is an error.
pub fn load_config(path: &Path, explicit: bool) -> Result<PortalConfig> {
    if !path.exists() && !explicit {
        return Ok(PortalConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text).with_context(|| format!("load config: {}", path.display()))
}

impl PortalConfig {
    /// Applies `PORTAL_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("PORTAL_DB") {
            self.db_path = Some(v);
        }
        if let Some(v) = get("PORTAL_OWNER_ID") {
            self.owner_id = Some(v.parse().context("PORTAL_OWNER_ID")?);
        }
        if let Some(v) = get("PORTAL_BOT_TOKEN") {
            self.bot_token = Some(v);
        }
        if let Some(v) = get("PORTAL_API_BASE") {
            self.api_base_url = Some(v);
        }
        if let Some(v) = get("PORTAL_NETWORK_NAME") {
            self.network_name = Some(v);
        }
        if let Some(v) = get("PORTAL_COOLDOWN_SECS") {
            self.cooldown_secs = Some(v.parse().context("PORTAL_COOLDOWN_SECS")?);
        }
        if let Some(v) = get("PORTAL_FANOUT_DELAY_MS") {
            self.fanout_delay_ms = Some(v.parse().context("PORTAL_FANOUT_DELAY_MS")?);
        }
        if let Some(v) = get("PORTAL_TEARDOWN_DELAY_MS") {
            self.teardown_delay_ms = Some(v.parse().context("PORTAL_TEARDOWN_DELAY_MS")?);
        }
        if let Some(v) = get("PORTAL_FAILURE_PREVIEW") {
            self.failure_preview = Some(v.parse().context("PORTAL_FAILURE_PREVIEW")?);
        }
        if let Some(v) = get("PORTAL_BUMP_MESSAGE") {
            self.bump_message = Some(v);
        }
        if let Some(v) = get("PORTAL_HTTP_ATTEMPTS") {
            self.http_attempts = Some(v.parse().context("PORTAL_HTTP_ATTEMPTS")?);
        }
        if let Some(v) = get("PORTAL_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = Some(v.parse().context("PORTAL_HTTP_TIMEOUT_SECS")?);
        }
        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match self.db_path.as_deref() {
            Some(p) if !p.trim().is_empty() => Ok(PathBuf::from(p)),
            _ => Ok(default_data_dir()?.join("portal.db")),
        }
    }

    pub fn api_base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_API_BASE)
            .to_string()
    }

    pub fn http_attempts(&self) -> u32 {
        self.http_attempts.unwrap_or(3).clamp(1, 10)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(15).max(1))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let d = EngineSettings::default();
        EngineSettings {
            cooldown_secs: self.cooldown_secs.unwrap_or(d.cooldown_secs),
            fanout_delay: self
                .fanout_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(d.fanout_delay),
            teardown_delay: self
                .teardown_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(d.teardown_delay),
            failure_preview: self.failure_preview.unwrap_or(d.failure_preview),
            network_name: self
                .network_name
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(d.network_name),
            bump_message: self.bump_message.clone().filter(|s| !s.trim().is_empty()),
        }
    }
}
