/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Bump: refresh a node's home post and fan its advertisement out to every partner.

use crate::cooldown;
use crate::engine::{now_secs, PortalEngine};
use crate::error::PortalError;
use crate::format;
use crate::partner_db::{MirrorInsert, NodeProfile};
use crate::platform::{ChannelInfo, PlatformError};
use crate::summary::{BumpSummary, HomeOutcome, TargetFailure};
use crate::{ChannelId, NodeId, PostId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What happened to a single (host, advertised) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MirrorWrite {
    Created,
    /// A concurrent writer committed the pair first; ours was discarded.
    LostRace(PostId),
}

impl PortalEngine {
    pub async fn bump(&self, source: NodeId) -> Result<BumpSummary, PortalError> {
        self.bump_at(source, now_secs()).await
    }

    /// Bump with an explicit clock, in epoch seconds.
    pub async fn bump_at(&self, source: NodeId, now: i64) -> Result<BumpSummary, PortalError> {
        if !self.is_whitelisted(source).await? {
            return Err(PortalError::Unauthorized(format!(
                "node {source} is not whitelisted"
            )));
        }
        let profile = match self.store(move |db| db.load_profile(source)).await? {
            Some(p) if p.has_advertisement() => p,
            _ => return Err(PortalError::NotRegistered(source)),
        };
        let remaining = cooldown::remaining(profile.last_bump_ts, now, self.settings.cooldown_secs);
        if remaining > 0 {
            debug!("bump of {source} refused, {remaining}s left");
            return Err(PortalError::CooldownActive(remaining));
        }

        let title = format::mirror_title(&profile);
        let content = format::mirror_content(&profile, &self.settings.network_name, now);
        let (home, home_id) = self.refresh_home(&profile, &title, &content).await;

        let mut summary = BumpSummary {
            source,
            bumped_at: now,
            home,
            created: 0,
            updated: 0,
            skipped: Vec::new(),
            failures: Vec::new(),
        };
        let mut channels = HashMap::new();
        for target in self.store(|db| db.list_whitelisted()).await? {
            if target == source {
                continue;
            }
            match self
                .refresh_target(target, &profile, &title, &content, &mut channels)
                .await
            {
                Ok(TargetRefresh::Created) => summary.created += 1,
                Ok(TargetRefresh::Updated) => summary.updated += 1,
                Ok(TargetRefresh::Skipped) => {
                    summary.skipped.push(target);
                    continue;
                }
                Err(e) => {
                    warn!("mirror of {source} in {target} not refreshed: {e}");
                    summary.failures.push(TargetFailure::new(target, e.to_string()));
                }
            }
            self.pace(self.settings.fanout_delay).await;
        }

        // Re-read so a registration edit made during the fan-out is kept. A home
        // opened in a channel the node has since left is not recorded.
        let bumped_in = profile.forum_channel_id;
        let recorded = self
            .store(move |db| {
                let Some(mut latest) = db.load_profile(source)? else {
                    return Ok(false);
                };
                latest.last_bump_ts = now;
                if latest.forum_channel_id == bumped_in {
                    latest.home_mirror_id = home_id;
                } else {
                    info!("node {source} moved channels during its bump, home post not recorded");
                }
                db.save_profile(&latest)?;
                Ok(true)
            })
            .await?;
        if !recorded {
            return Err(PortalError::NotRegistered(source));
        }

        info!(
            "bump of {source}: {} created, {} updated, {} failed, {} skipped",
            summary.created,
            summary.updated,
            summary.failed(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    async fn refresh_target(
        &self,
        target: NodeId,
        advertised: &NodeProfile,
        title: &str,
        content: &str,
        channels: &mut HashMap<ChannelId, ChannelInfo>,
    ) -> Result<TargetRefresh, PortalError> {
        let advertised_id = advertised.node_id;
        let (forum_id, mapped) = self
            .store(move |db| {
                let forum_id = db.load_profile(target)?.and_then(|host| host.forum_channel_id);
                Ok((forum_id, db.get_mirror(target, advertised_id)?))
            })
            .await?;
        let Some(forum_id) = forum_id else {
            return Ok(TargetRefresh::Skipped);
        };

        let post_id = match mapped {
            Some(post_id) => post_id,
            None => {
                return match self
                    .create_mirror(target, forum_id, advertised, title, content, channels)
                    .await?
                {
                    MirrorWrite::Created => Ok(TargetRefresh::Created),
                    MirrorWrite::LostRace(winner) => {
                        self.platform.edit_thread_content(winner, content).await?;
                        self.nudge(winner).await;
                        Ok(TargetRefresh::Updated)
                    }
                };
            }
        };
        // A missing post keeps its mapping; a teardown or operator clears it.
        self.platform.edit_thread_content(post_id, content).await?;
        self.nudge(post_id).await;
        Ok(TargetRefresh::Updated)
    }

    /// Publishes a mirror of `advertised` in the host's forum and records it.
    /// When another writer recorded the pair first, our post is deleted again.
    pub(crate) async fn create_mirror(
        &self,
        host: NodeId,
        forum_id: ChannelId,
        advertised: &NodeProfile,
        title: &str,
        content: &str,
        channels: &mut HashMap<ChannelId, ChannelInfo>,
    ) -> Result<MirrorWrite, PortalError> {
        let channel = match channels.get(&forum_id) {
            Some(c) => c.clone(),
            None => {
                let c = self.platform.fetch_channel(forum_id).await?;
                channels.insert(forum_id, c.clone());
                c
            }
        };
        let tags = format::match_tags(&advertised.tags, &channel.available_tags);
        let post_id = self
            .platform
            .create_thread(channel.id, title, content, &tags)
            .await?;

        let advertised_id = advertised.node_id;
        match self
            .store(move |db| db.insert_mirror_if_absent(host, advertised_id, post_id))
            .await
        {
            Ok(MirrorInsert::Inserted) => {
                debug!("mirror of {} opened in {host} as {post_id}", advertised.node_id);
                Ok(MirrorWrite::Created)
            }
            Ok(MirrorInsert::Existing(winner)) => {
                info!(
                    "mirror of {} in {host} already recorded as {winner}, discarding {post_id}",
                    advertised.node_id
                );
                self.discard_post(post_id).await;
                Ok(MirrorWrite::LostRace(winner))
            }
            Err(e) => {
                self.discard_post(post_id).await;
                Err(e)
            }
        }
    }

    async fn discard_post(&self, post_id: PostId) {
        match self.platform.delete_thread(post_id).await {
            Ok(()) | Err(PlatformError::NotFound) => {}
            Err(e) => warn!("unrecorded post {post_id} left behind: {e}"),
        }
    }

    async fn nudge(&self, post_id: PostId) {
        let Some(message) = self.settings.bump_message.as_deref() else {
            return;
        };
        if let Err(e) = self.platform.send_message(post_id, message).await {
            warn!("bump message in {post_id} not sent: {e}");
        }
    }

    /// Refreshes the source's own home post. Never fails the bump; the returned id
    /// is the home post to store afterwards.
    async fn refresh_home(
        &self,
        profile: &NodeProfile,
        title: &str,
        content: &str,
    ) -> (HomeOutcome, Option<PostId>) {
        let Some(forum_id) = profile.forum_channel_id else {
            return (
                HomeOutcome::Failed {
                    reason: "no content channel registered".to_string(),
                },
                profile.home_mirror_id,
            );
        };

        let mut home_id = profile.home_mirror_id;
        if home_id.is_none() {
            let node_id = profile.node_id;
            let adopted = self
                .store(move |db| match db.legacy_thread_for(node_id)? {
                    Some(legacy) => Ok(db.adopt_legacy_home(node_id, legacy)?.then_some(legacy)),
                    None => Ok(None),
                })
                .await;
            match adopted {
                Ok(Some(legacy)) => {
                    info!("adopted legacy thread {legacy} as home of {node_id}");
                    home_id = Some(legacy);
                }
                Ok(None) => {}
                Err(e) => warn!("legacy lookup for {node_id} failed: {e}"),
            }
        }

        let Some(post_id) = home_id else {
            return match self.open_home(profile, forum_id, title, content).await {
                Ok(id) => (HomeOutcome::Created { post_id: id }, Some(id)),
                Err(e) => {
                    warn!("home post of {} not created: {e}", profile.node_id);
                    (HomeOutcome::Failed { reason: e.to_string() }, None)
                }
            };
        };

        match self.platform.edit_thread_content(post_id, content).await {
            Ok(()) => {
                self.nudge(post_id).await;
                (HomeOutcome::Updated { post_id }, Some(post_id))
            }
            Err(PlatformError::NotFound) => {
                match self.open_home(profile, forum_id, title, content).await {
                    Ok(id) => {
                        info!("home post {post_id} of {} was gone, reopened as {id}", profile.node_id);
                        (HomeOutcome::Recreated { post_id: id }, Some(id))
                    }
                    Err(e) => {
                        warn!("home post of {} not recreated: {e}", profile.node_id);
                        (HomeOutcome::Failed { reason: e.to_string() }, None)
                    }
                }
            }
            Err(e) => {
                warn!("home post {post_id} of {} not refreshed: {e}", profile.node_id);
                (HomeOutcome::Failed { reason: e.to_string() }, Some(post_id))
            }
        }
    }

    async fn open_home(
        &self,
        profile: &NodeProfile,
        forum_id: ChannelId,
        title: &str,
        content: &str,
    ) -> Result<PostId, PlatformError> {
        let channel = self.platform.fetch_channel(forum_id).await?;
        let tags = format::match_tags(&profile.tags, &channel.available_tags);
        self.platform.create_thread(channel.id, title, content, &tags).await
    }
}

enum TargetRefresh {
    Created,
    Updated,
    Skipped,
}
