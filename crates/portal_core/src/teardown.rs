/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::engine::PortalEngine;
use crate::error::PortalError;
use crate::platform::{ChannelKind, PlatformError};
use crate::summary::{PostFailure, TeardownSummary};
use crate::{PostId, UserId};
use std::collections::BTreeSet;
use tracing::{info, warn};

enum Removal {
    Deleted,
    AlreadyGone,
}

impl PortalEngine {
    /// Deletes every recorded mirror post, then clears the mapping and legacy tables.
    /// Home posts stay, even when a legacy row still points at one.
    pub async fn delete_all_mirrors(&self, caller: UserId) -> Result<TeardownSummary, PortalError> {
        self.require_operator(caller).await?;

        let posts = self
            .store(|db| {
                let homes: BTreeSet<PostId> = db
                    .list_profiles()?
                    .into_iter()
                    .filter_map(|p| p.home_mirror_id)
                    .collect();
                let mut posts: BTreeSet<PostId> =
                    db.list_mirrors()?.into_iter().map(|m| m.post_id).collect();
                posts.extend(db.legacy_threads()?.into_iter().map(|t| t.thread_id));
                posts.retain(|id| !homes.contains(id));
                Ok(posts)
            })
            .await?;
        info!("teardown of {} mirror posts requested by {caller}", posts.len());

        let mut summary = TeardownSummary::default();
        for post_id in posts {
            match self.remove_post(post_id).await {
                Ok(Removal::Deleted) => summary.deleted += 1,
                Ok(Removal::AlreadyGone) => summary.already_gone += 1,
                Err(reason) => {
                    warn!("mirror post {post_id} not deleted: {reason}");
                    summary.failures.push(PostFailure {
                        post_id,
                        summary: reason,
                    });
                }
            }
            self.pace(self.settings.teardown_delay).await;
        }

        let cleared = self.store(|db| db.clear_all_mirrors()).await?;
        summary.cleared_mappings = cleared.mappings;
        summary.cleared_legacy = cleared.legacy;
        info!(
            "teardown: {} deleted, {} already gone, {} failed",
            summary.deleted,
            summary.already_gone,
            summary.failures.len()
        );
        Ok(summary)
    }

    async fn remove_post(&self, post_id: PostId) -> Result<Removal, String> {
        match self.platform.fetch_channel(post_id).await {
            Ok(c) if c.kind == ChannelKind::Thread => {}
            Ok(_) => return Err(format!("channel {post_id} is not a thread")),
            Err(PlatformError::NotFound) => return Ok(Removal::AlreadyGone),
            Err(e) => return Err(e.to_string()),
        }
        match self.platform.delete_thread(post_id).await {
            Ok(()) => Ok(Removal::Deleted),
            Err(PlatformError::NotFound) => Ok(Removal::AlreadyGone),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::EngineSettings;
    use crate::error::PortalError;
    use crate::summary::HomeOutcome;
    use crate::test_support::{quiet_settings, Fixture, OWNER};
    use std::time::Duration;

    #[tokio::test]
    async fn teardown_counts_already_gone_posts() {
        let fx = Fixture::new();
        for node in [1001, 1002] {
            fx.add_node(node, &[], &[]);
        }
        fx.engine.sync_network(OWNER).await.unwrap();
        let legacy = fx.db.get_mirror(1001, 1002).unwrap().unwrap();
        fx.db.insert_legacy_thread(1002, legacy, 0).unwrap();
        fx.db.insert_legacy_thread(1001, 31337, 0).unwrap();
        // three distinct posts, one of them removed by hand
        let gone = fx.db.get_mirror(1002, 1001).unwrap().unwrap();
        fx.platform.remove_post(gone);

        let s = fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert_eq!(s.deleted, 1);
        assert_eq!(s.already_gone, 2);
        assert!(s.failures.is_empty());
        assert_eq!((s.cleared_mappings, s.cleared_legacy), (2, 2));
        assert_eq!(fx.db.count_mirrors().unwrap(), 0);
        assert!(fx.db.legacy_threads().unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_with_partial_failure_still_clears_store() {
        let fx = Fixture::new();
        for node in [1001, 1002, 1003] {
            fx.add_node(node, &[], &[]);
        }
        fx.engine.bump_at(1001, 1_700_000_000).await.unwrap();
        fx.engine.bump_at(1002, 1_700_000_000).await.unwrap();
        let mirrors = fx.db.list_mirrors().unwrap();
        assert_eq!(mirrors.len(), 4);
        fx.platform.remove_post(mirrors[0].post_id);
        fx.platform.fail_deletes_of(mirrors[1].post_id);

        let s = fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert_eq!(s.deleted, 2);
        assert_eq!(s.already_gone, 1);
        assert_eq!(s.failures.len(), 1);
        assert_eq!(s.failures[0].post_id, mirrors[1].post_id);
        assert_eq!(fx.db.count_mirrors().unwrap(), 0);
    }

    #[tokio::test]
    async fn home_posts_survive_teardown() {
        let fx = Fixture::new();
        fx.add_node(1001, &[], &[]);
        fx.add_node(1002, &[], &[]);
        let s = fx.engine.bump_at(1001, 1_700_000_000).await.unwrap();
        let HomeOutcome::Created { post_id: home } = s.home else {
            panic!("unexpected home outcome {:?}", s.home)
        };
        fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert!(fx.platform.post(home).is_some());
        assert_eq!(fx.platform.post_count(), 1);
    }

    #[tokio::test]
    async fn home_listed_as_legacy_thread_is_kept() {
        let fx = Fixture::new();
        fx.add_node(1001, &[], &[]);
        fx.add_node(1002, &[], &[]);
        let s = fx.engine.bump_at(1001, 1_700_000_000).await.unwrap();
        let HomeOutcome::Created { post_id: home } = s.home else {
            panic!("unexpected home outcome {:?}", s.home)
        };
        fx.db.insert_legacy_thread(1001, home, 0).unwrap();
        fx.engine.sync_network(OWNER).await.unwrap();

        let s = fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert_eq!(s.deleted, 2);
        assert!(s.failures.is_empty());
        assert!(fx.platform.post(home).is_some());
        assert_eq!(fx.db.load_profile(1001).unwrap().unwrap().home_mirror_id, Some(home));
        assert!(fx.db.legacy_threads().unwrap().is_empty());
    }

    #[tokio::test]
    async fn adopted_legacy_home_is_kept() {
        let fx = Fixture::new();
        fx.add_node(1001, &[], &[]);
        fx.add_node(1002, &[], &[]);
        fx.platform.add_forum(4242, &[]);
        let old = {
            use crate::platform::ChatPlatform;
            fx.platform
                .create_thread(4242, "old layout", "old ad", &[])
                .await
                .unwrap()
        };
        fx.db.insert_legacy_thread(1001, old, 0).unwrap();

        fx.engine.sync_network(OWNER).await.unwrap();
        assert_eq!(fx.db.load_profile(1001).unwrap().unwrap().home_mirror_id, Some(old));
        assert!(fx.db.legacy_threads().unwrap().is_empty());

        fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert!(fx.platform.post(old).is_some());
    }

    #[tokio::test]
    async fn teardown_of_three_mirrors_with_one_gone() {
        let fx = Fixture::new();
        for node in [1001, 1002, 1003, 1004] {
            fx.add_node(node, &[], &[]);
        }
        fx.engine.bump_at(1001, 1_700_000_000).await.unwrap();
        let mirrors = fx.db.list_mirrors().unwrap();
        assert_eq!(mirrors.len(), 3);
        fx.platform.remove_post(mirrors[2].post_id);

        let s = fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert_eq!((s.deleted, s.already_gone), (2, 1));
        assert!(s.failures.is_empty());
        assert_eq!(s.cleared_mappings, 3);
        assert_eq!(fx.db.count_mirrors().unwrap(), 0);
        // only the home post is left
        assert_eq!(fx.platform.post_count(), 1);
    }

    #[tokio::test]
    async fn non_thread_channels_are_never_deleted() {
        let fx = Fixture::new();
        fx.add_node(1001, &[], &[]);
        fx.platform.add_text_channel(5555);
        fx.db.insert_legacy_thread(1001, 5555, 0).unwrap();

        let s = fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert_eq!(s.deleted, 0);
        assert_eq!(s.failures.len(), 1);
        assert!(s.failures[0].summary.contains("not a thread"));
        assert_eq!(s.cleared_legacy, 1);
    }

    #[tokio::test]
    async fn teardown_requires_operator() {
        let fx = Fixture::new();
        let err = fx.engine.delete_all_mirrors(42).await.unwrap_err();
        assert!(matches!(err, PortalError::Unauthorized(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_paced() {
        let fx = Fixture::with_settings(EngineSettings {
            teardown_delay: Duration::from_millis(500),
            ..quiet_settings()
        });
        for node in [1001, 1002] {
            fx.add_node(node, &[], &[]);
        }
        fx.engine.sync_network(OWNER).await.unwrap();
        let started = tokio::time::Instant::now();
        fx.engine.delete_all_mirrors(OWNER).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
