/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::PortalError;
use crate::format;
use crate::partner_db::{
    parse_tags, BlobMigration, NodeProfile, PartnerDb, PlanTier, TableOverview,
};
use crate::platform::{ChannelKind, ChatPlatform, PlatformError};
use crate::{ChannelId, NodeId, UserId};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub cooldown_secs: u64,
    /// Pause after each fan-out or sync target, to stay under platform rate limits.
    pub fanout_delay: Duration,
    pub teardown_delay: Duration,
    /// How many failures a rendered summary lists before collapsing the rest.
    pub failure_preview: usize,
    pub network_name: String,
    /// Posted into refreshed mirrors so they float to the top of the forum.
    pub bump_message: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: crate::cooldown::DEFAULT_WINDOW_SECS,
            fanout_delay: Duration::from_millis(1000),
            teardown_delay: Duration::from_millis(500),
            failure_preview: 10,
            network_name: "Portal".to_string(),
            bump_message: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub node_id: NodeId,
    pub name: String,
    pub advertisement: String,
    pub tags: Vec<String>,
    pub forum_channel_id: ChannelId,
    pub invite_url: Option<String>,
    pub plan: PlanTier,
}

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub created: bool,
    pub profile: NodeProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub whitelisted: u64,
    pub registered: u64,
    pub mirrors: u64,
    /// Ordered pairs of registered nodes that should each carry a mirror.
    pub expected_mirrors: u64,
    pub legacy_threads: u64,
    pub operators: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeListing {
    pub node_id: NodeId,
    pub name: Option<String>,
    pub last_bump_ts: i64,
}

/// Orchestrates the partner network. Built once at startup and shared by reference.
pub struct PortalEngine {
    pub(crate) db: Arc<PartnerDb>,
    pub(crate) platform: Arc<dyn ChatPlatform>,
    pub(crate) settings: EngineSettings,
    owner_id: Option<UserId>,
}

impl PortalEngine {
    pub fn new(
        db: Arc<PartnerDb>,
        platform: Arc<dyn ChatPlatform>,
        settings: EngineSettings,
        owner_id: Option<UserId>,
    ) -> Self {
        Self {
            db,
            platform,
            settings,
            owner_id,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs store work on the blocking pool; every call opens its own connection.
    pub(crate) async fn store<T, F>(&self, work: F) -> Result<T, PortalError>
    where
        T: Send + 'static,
        F: FnOnce(&PartnerDb) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let out = tokio::task::spawn_blocking(move || work(&db))
            .await
            .context("store task")??;
        Ok(out)
    }

    pub async fn is_whitelisted(&self, node_id: NodeId) -> Result<bool, PortalError> {
        self.store(move |db| db.is_whitelisted(node_id)).await
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_id == Some(user_id)
    }

    pub async fn is_operator(&self, user_id: UserId) -> Result<bool, PortalError> {
        if self.is_owner(user_id) {
            return Ok(true);
        }
        self.store(move |db| db.is_operator(user_id)).await
    }

    pub(crate) async fn require_operator(&self, caller: UserId) -> Result<(), PortalError> {
        if self.is_operator(caller).await? {
            return Ok(());
        }
        Err(PortalError::Unauthorized(format!("user {caller} is not an operator")))
    }

    fn require_owner(&self, caller: UserId) -> Result<(), PortalError> {
        if self.is_owner(caller) {
            return Ok(());
        }
        Err(PortalError::Unauthorized(format!("user {caller} is not the owner")))
    }

    pub async fn whitelist(&self, caller: UserId, node_id: NodeId) -> Result<bool, PortalError> {
        self.require_operator(caller).await?;
        let added = self.store(move |db| db.whitelist_node(node_id)).await?;
        if added {
            info!("node {node_id} whitelisted by {caller}");
        }
        Ok(added)
    }

    /// Removes a node from the network together with its profile and every mirror row
    /// that involves it. Posts already published stay up; a teardown removes them.
    pub async fn delist(&self, caller: UserId, node_id: NodeId) -> Result<(), PortalError> {
        self.require_operator(caller).await?;
        if !self.store(move |db| db.delist_cascade(node_id)).await? {
            return Err(PortalError::NotWhitelisted(node_id));
        }
        info!("node {node_id} removed from the network by {caller}");
        Ok(())
    }

    pub async fn add_operator(&self, caller: UserId, user_id: UserId) -> Result<bool, PortalError> {
        self.require_owner(caller)?;
        self.store(move |db| db.add_operator(user_id)).await
    }

    pub async fn remove_operator(&self, caller: UserId, user_id: UserId) -> Result<bool, PortalError> {
        self.require_owner(caller)?;
        self.store(move |db| db.remove_operator(user_id)).await
    }

    pub async fn list_operators(&self, caller: UserId) -> Result<Vec<UserId>, PortalError> {
        self.require_operator(caller).await?;
        self.store(|db| db.list_operators()).await
    }

    pub async fn list_whitelisted(&self, caller: UserId) -> Result<Vec<NodeId>, PortalError> {
        self.require_operator(caller).await?;
        self.store(|db| db.list_whitelisted()).await
    }

    /// Whitelisted nodes with their registered name, if any.
    pub async fn list_nodes(&self, caller: UserId) -> Result<Vec<NodeListing>, PortalError> {
        self.require_operator(caller).await?;
        self.store(|db| {
            let mut out = Vec::new();
            for node_id in db.list_whitelisted()? {
                let profile = db.load_profile(node_id)?;
                out.push(NodeListing {
                    node_id,
                    name: profile.as_ref().map(|p| p.name.clone()),
                    last_bump_ts: profile.map_or(0, |p| p.last_bump_ts),
                });
            }
            Ok(out)
        })
        .await
    }

    pub async fn network_status(&self, caller: UserId) -> Result<NetworkStatus, PortalError> {
        self.require_operator(caller).await?;
        self.store(|db| {
            let whitelisted = db.list_whitelisted()?;
            let mut registered = 0u64;
            for node in &whitelisted {
                if let Some(p) = db.load_profile(*node)? {
                    if p.has_advertisement() && p.forum_channel_id.is_some() {
                        registered += 1;
                    }
                }
            }
            Ok(NetworkStatus {
                whitelisted: whitelisted.len() as u64,
                registered,
                mirrors: db.count_mirrors()?,
                expected_mirrors: registered * registered.saturating_sub(1),
                legacy_threads: db.legacy_threads()?.len() as u64,
                operators: db.list_operators()?.len() as u64,
            })
        })
        .await
    }

    pub async fn table_overview(&self, caller: UserId) -> Result<Vec<TableOverview>, PortalError> {
        self.require_operator(caller).await?;
        self.store(|db| {
            db.health_check()?;
            db.table_overview()
        })
        .await
    }

    /// Folds legacy `propagated_threads` blobs into the mapping table.
    pub async fn migrate_legacy(&self, caller: UserId) -> Result<BlobMigration, PortalError> {
        self.require_operator(caller).await?;
        let m = self.store(|db| db.migrate_propagated_blobs()).await?;
        if m.rows > 0 {
            info!(
                "migrated {} legacy blobs: {} inserted, {} already mapped, {} unreadable",
                m.rows, m.inserted, m.already_mapped, m.invalid
            );
        }
        Ok(m)
    }

    /// Creates or edits a node's profile. Timestamp and home post are kept on edit,
    /// unless the content channel moved.
    pub async fn register(&self, reg: Registration) -> Result<RegisterOutcome, PortalError> {
        if !self.is_whitelisted(reg.node_id).await? {
            return Err(PortalError::Unauthorized(format!(
                "node {} is not whitelisted",
                reg.node_id
            )));
        }
        let name = reg.name.trim();
        if name.is_empty() {
            return Err(PortalError::InvalidInput("name must not be empty".to_string()));
        }
        if name.chars().count() > format::MAX_NAME_CHARS {
            return Err(PortalError::InvalidInput(format!(
                "name is longer than {} characters",
                format::MAX_NAME_CHARS
            )));
        }
        let advertisement = reg.advertisement.trim();
        if advertisement.is_empty() {
            return Err(PortalError::InvalidInput(
                "advertisement must not be empty".to_string(),
            ));
        }
        let invite = reg
            .invite_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(url) = invite {
            if !format::is_valid_invite(url) {
                return Err(PortalError::InvalidInput(format!("invalid invite url: {url}")));
            }
        }

        let channel = match self.platform.fetch_channel(reg.forum_channel_id).await {
            Ok(c) => c,
            Err(PlatformError::NotFound) => {
                return Err(PortalError::InvalidInput(format!(
                    "channel {} not found",
                    reg.forum_channel_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if channel.kind != ChannelKind::Forum {
            return Err(PortalError::InvalidInput(format!(
                "channel {} is not a forum channel",
                reg.forum_channel_id
            )));
        }

        let node_id = reg.node_id;
        let existing = self.store(move |db| db.load_profile(node_id)).await?;
        let created = existing.is_none();
        let mut profile = existing.unwrap_or_else(|| NodeProfile::new(node_id, ""));
        if profile.forum_channel_id != Some(channel.id) {
            profile.home_mirror_id = None;
        }
        profile.name = name.to_string();
        profile.advertisement = advertisement.to_string();
        profile.tags = parse_tags(&reg.tags.join(","));
        profile.forum_channel_id = Some(channel.id);
        profile.plan = reg.plan;

        match invite {
            Some(url) => profile.invite_url = Some(url.to_string()),
            None if profile.invite_url.is_none() => {
                match self.platform.create_invite(channel.id).await {
                    Ok(url) => profile.invite_url = Some(url),
                    Err(e) => warn!("invite for node {node_id} not created: {e}"),
                }
            }
            None => {}
        }

        let saved = profile.clone();
        self.store(move |db| db.save_profile(&saved)).await?;
        info!(
            "node {} {} (channel {})",
            profile.node_id,
            if created { "registered" } else { "updated its registration" },
            channel.id
        );
        Ok(RegisterOutcome { created, profile })
    }

    pub(crate) async fn pace(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
