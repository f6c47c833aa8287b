/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Network sync: backfills mirrors for every pair that should have one and does not.

use crate::engine::PortalEngine;
use crate::error::PortalError;
use crate::format;
use crate::partner_db::{NodeProfile, PartnerDb};
use crate::propagation::MirrorWrite;
use crate::summary::{SyncSummary, TargetFailure};
use crate::{NodeId, UserId};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

impl PortalEngine {
    pub async fn sync_network(&self, caller: UserId) -> Result<SyncSummary, PortalError> {
        self.require_operator(caller).await?;
        self.reconcile(None).await
    }

    /// Sync restricted to pairs where `node` is host or advertised.
    pub async fn sync_node(&self, caller: UserId, node: NodeId) -> Result<SyncSummary, PortalError> {
        self.require_operator(caller).await?;
        if !self.is_whitelisted(node).await? {
            return Err(PortalError::NotWhitelisted(node));
        }
        self.reconcile(Some(node)).await
    }

    async fn reconcile(&self, only: Option<NodeId>) -> Result<SyncSummary, PortalError> {
        let adopted = self.store(adopt_legacy_homes).await?;
        let migrated = self.store(|db| db.migrate_propagated_blobs()).await?;
        if adopted > 0 || migrated.rows > 0 {
            info!(
                "legacy data folded in: {adopted} home posts adopted, {} mirrors from {} blobs",
                migrated.inserted, migrated.rows
            );
        }

        let (nodes, profiles) = self
            .store(|db| {
                let nodes = db.list_whitelisted()?;
                let mut profiles: BTreeMap<NodeId, NodeProfile> = BTreeMap::new();
                for node in &nodes {
                    if let Some(p) = db.load_profile(*node)? {
                        profiles.insert(*node, p);
                    }
                }
                Ok((nodes, profiles))
            })
            .await?;

        let mut summary = SyncSummary::default();
        let mut channels = HashMap::new();
        for &host in &nodes {
            for &advertised in &nodes {
                if host == advertised {
                    continue;
                }
                if let Some(n) = only {
                    if host != n && advertised != n {
                        continue;
                    }
                }
                match self.store(move |db| db.get_mirror(host, advertised)).await {
                    Ok(Some(_)) => {
                        summary.already_mapped += 1;
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        summary
                            .failures
                            .push(TargetFailure::new(host, format!("mirror of {advertised}: {e}")));
                        continue;
                    }
                }

                let Some(ad) = profiles.get(&advertised).filter(|p| p.has_advertisement()) else {
                    summary.skipped += 1;
                    continue;
                };
                let Some(forum_id) = profiles.get(&host).and_then(|p| p.forum_channel_id) else {
                    summary.skipped += 1;
                    continue;
                };

                let title = format::mirror_title(ad);
                // The listing date is that of the advertised node's latest bump.
                let listed_at = if ad.last_bump_ts > 0 {
                    ad.last_bump_ts
                } else {
                    crate::engine::now_secs()
                };
                let content = format::mirror_content(ad, &self.settings.network_name, listed_at);
                match self
                    .create_mirror(host, forum_id, ad, &title, &content, &mut channels)
                    .await
                {
                    Ok(MirrorWrite::Created) => summary.created += 1,
                    Ok(MirrorWrite::LostRace(_)) => summary.already_mapped += 1,
                    Err(e) => {
                        warn!("sync of {advertised} into {host} failed: {e}");
                        summary
                            .failures
                            .push(TargetFailure::new(host, format!("mirror of {advertised}: {e}")));
                    }
                }
                self.pace(self.settings.fanout_delay).await;
            }
        }

        info!(
            "sync: {} created, {} already mapped, {} skipped, {} failed",
            summary.created,
            summary.already_mapped,
            summary.skipped,
            summary.failures.len()
        );
        Ok(summary)
    }
}

/// Legacy per-node threads become home posts for nodes that have none yet.
/// An adopted thread leaves the legacy table, so teardown never sees it again.
fn adopt_legacy_homes(db: &PartnerDb) -> anyhow::Result<u64> {
    let mut adopted = 0;
    for legacy in db.legacy_threads()? {
        if db.adopt_legacy_home(legacy.node_id, legacy.thread_id)? {
            adopted += 1;
        }
    }
    Ok(adopted)
}
