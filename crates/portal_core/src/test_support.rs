/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::engine::{EngineSettings, PortalEngine};
use crate::partner_db::{NodeProfile, PartnerDb};
use crate::platform::{ChannelInfo, ChannelKind, ChatPlatform, ForumTag, PlatformError};
use crate::{ChannelId, NodeId, PostId, UserId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Barrier;

pub const OWNER: UserId = 1;

pub fn forum_of(node: NodeId) -> ChannelId {
    node + 1000
}

#[derive(Debug, Clone)]
pub struct MockPost {
    pub forum_id: ChannelId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

struct CreateGate {
    forum_id: ChannelId,
    barrier: Arc<Barrier>,
    remaining: usize,
}

#[derive(Default)]
struct State {
    forums: HashMap<ChannelId, Vec<ForumTag>>,
    text_channels: HashSet<ChannelId>,
    posts: BTreeMap<PostId, MockPost>,
    next_id: PostId,
    fail_create_in: HashSet<ChannelId>,
    fail_edit: HashSet<PostId>,
    fail_delete: HashSet<PostId>,
    deny_invites: bool,
    messages: Vec<(PostId, String)>,
    gate: Option<CreateGate>,
}

/// In-memory forum platform with failure injection.
pub struct MockPlatform {
    state: Mutex<State>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 900_000,
                ..State::default()
            }),
        }
    }

    pub fn add_forum(&self, id: ChannelId, vocabulary: &[&str]) {
        let tags = vocabulary
            .iter()
            .enumerate()
            .map(|(i, n)| ForumTag {
                id: id * 100 + i as u64,
                name: n.to_string(),
            })
            .collect();
        self.state.lock().unwrap().forums.insert(id, tags);
    }

    pub fn add_text_channel(&self, id: ChannelId) {
        self.state.lock().unwrap().text_channels.insert(id);
    }

    pub fn fail_creates_in(&self, forum_id: ChannelId) {
        self.state.lock().unwrap().fail_create_in.insert(forum_id);
    }

    pub fn fail_edits_of(&self, post_id: PostId) {
        self.state.lock().unwrap().fail_edit.insert(post_id);
    }

    pub fn fail_deletes_of(&self, post_id: PostId) {
        self.state.lock().unwrap().fail_delete.insert(post_id);
    }

    pub fn deny_invites(&self) {
        self.state.lock().unwrap().deny_invites = true;
    }

    /// The next `count` creates in `forum_id` wait for each other after publishing,
    /// so concurrent writers all reach the mapping insert with a fresh post.
    pub fn gate_creates_in(&self, forum_id: ChannelId, count: usize) {
        self.state.lock().unwrap().gate = Some(CreateGate {
            forum_id,
            barrier: Arc::new(Barrier::new(count)),
            remaining: count,
        });
    }

    /// Simulates a moderator deleting the post by hand.
    pub fn remove_post(&self, post_id: PostId) {
        self.state.lock().unwrap().posts.remove(&post_id);
    }

    pub fn post(&self, post_id: PostId) -> Option<MockPost> {
        self.state.lock().unwrap().posts.get(&post_id).cloned()
    }

    pub fn posts_in(&self, forum_id: ChannelId) -> Vec<(PostId, MockPost)> {
        self.state
            .lock()
            .unwrap()
            .posts
            .iter()
            .filter(|(_, p)| p.forum_id == forum_id)
            .map(|(id, p)| (*id, p.clone()))
            .collect()
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    pub fn messages(&self) -> Vec<(PostId, String)> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelInfo, PlatformError> {
        let st = self.state.lock().unwrap();
        if let Some(tags) = st.forums.get(&channel_id) {
            return Ok(ChannelInfo {
                id: channel_id,
                kind: ChannelKind::Forum,
                available_tags: tags.clone(),
            });
        }
        let kind = if st.posts.contains_key(&channel_id) {
            ChannelKind::Thread
        } else if st.text_channels.contains(&channel_id) {
            ChannelKind::Text
        } else {
            return Err(PlatformError::NotFound);
        };
        Ok(ChannelInfo {
            id: channel_id,
            kind,
            available_tags: Vec::new(),
        })
    }

    async fn create_thread(
        &self,
        forum_id: ChannelId,
        title: &str,
        content: &str,
        tags: &[ForumTag],
    ) -> Result<PostId, PlatformError> {
        let (post_id, barrier) = {
            let mut st = self.state.lock().unwrap();
            if st.fail_create_in.contains(&forum_id) {
                return Err(PlatformError::Unavailable("simulated outage".to_string()));
            }
            if !st.forums.contains_key(&forum_id) {
                return Err(PlatformError::NotFound);
            }
            st.next_id += 1;
            let post_id = st.next_id;
            st.posts.insert(
                post_id,
                MockPost {
                    forum_id,
                    title: title.to_string(),
                    content: content.to_string(),
                    tags: tags.iter().map(|t| t.name.clone()).collect(),
                },
            );
            let barrier = match st.gate.as_mut() {
                Some(g) if g.forum_id == forum_id && g.remaining > 0 => {
                    g.remaining -= 1;
                    Some(g.barrier.clone())
                }
                _ => None,
            };
            (post_id, barrier)
        };
        if let Some(b) = barrier {
            b.wait().await;
        }
        Ok(post_id)
    }

    async fn edit_thread_content(&self, post_id: PostId, content: &str) -> Result<(), PlatformError> {
        let mut st = self.state.lock().unwrap();
        if st.fail_edit.contains(&post_id) {
            return Err(PlatformError::Denied("missing permissions".to_string()));
        }
        match st.posts.get_mut(&post_id) {
            Some(p) => {
                p.content = content.to_string();
                Ok(())
            }
            None => Err(PlatformError::NotFound),
        }
    }

    async fn send_message(&self, post_id: PostId, content: &str) -> Result<(), PlatformError> {
        let mut st = self.state.lock().unwrap();
        if !st.posts.contains_key(&post_id) {
            return Err(PlatformError::NotFound);
        }
        st.messages.push((post_id, content.to_string()));
        Ok(())
    }

    async fn delete_thread(&self, post_id: PostId) -> Result<(), PlatformError> {
        let mut st = self.state.lock().unwrap();
        if st.fail_delete.contains(&post_id) {
            return Err(PlatformError::Unavailable("simulated outage".to_string()));
        }
        match st.posts.remove(&post_id) {
            Some(_) => Ok(()),
            None => Err(PlatformError::NotFound),
        }
    }

    async fn create_invite(&self, channel_id: ChannelId) -> Result<String, PlatformError> {
        if self.state.lock().unwrap().deny_invites {
            return Err(PlatformError::Denied("missing permissions".to_string()));
        }
        Ok(format!("https://discord.gg/mock{channel_id}"))
    }
}

pub fn quiet_settings() -> EngineSettings {
    EngineSettings {
        fanout_delay: Duration::ZERO,
        teardown_delay: Duration::ZERO,
        ..EngineSettings::default()
    }
}

pub struct Fixture {
    _dir: TempDir,
    pub db: Arc<PartnerDb>,
    pub platform: Arc<MockPlatform>,
    pub engine: PortalEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(quiet_settings())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(PartnerDb::open(dir.path().join("portal.db")).unwrap());
        let platform = Arc::new(MockPlatform::new());
        let engine = PortalEngine::new(db.clone(), platform.clone(), settings, Some(OWNER));
        Self {
            _dir: dir,
            db,
            platform,
            engine,
        }
    }

    /// Whitelists and registers a node whose forum carries `vocabulary`.
    pub fn add_node(&self, node: NodeId, tags: &[&str], vocabulary: &[&str]) -> NodeProfile {
        self.db.whitelist_node(node).unwrap();
        self.platform.add_forum(forum_of(node), vocabulary);
        let mut p = NodeProfile::new(node, format!("Server {node}"));
        p.advertisement = format!("Advertisement of {node}");
        p.tags = tags.iter().map(|t| t.to_string()).collect();
        p.forum_channel_id = Some(forum_of(node));
        self.db.save_profile(&p).unwrap();
        p
    }
}
