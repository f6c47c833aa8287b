/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The chat platform as seen by the engine. Every call is a single attempt from the
//! engine's point of view; transport retries, if any, belong to the implementation.

use crate::{ChannelId, PostId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumTag {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Forum,
    Thread,
    Text,
    Other,
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub kind: ChannelKind,
    /// Tag vocabulary of a forum channel, in the order the platform reports it.
    pub available_tags: Vec<ForumTag>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found")]
    NotFound,

    #[error("denied: {0}")]
    Denied(String),

    #[error("rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelInfo, PlatformError>;

    /// Opens a post in a forum channel and returns its id.
    async fn create_thread(
        &self,
        forum_id: ChannelId,
        title: &str,
        content: &str,
        tags: &[ForumTag],
    ) -> Result<PostId, PlatformError>;

    /// Replaces the content of the post's opening message.
    async fn edit_thread_content(&self, post_id: PostId, content: &str) -> Result<(), PlatformError>;

    async fn send_message(&self, post_id: PostId, content: &str) -> Result<(), PlatformError>;

    async fn delete_thread(&self, post_id: PostId) -> Result<(), PlatformError>;

    /// Creates a permanent invite pointing at the channel.
    async fn create_invite(&self, channel_id: ChannelId) -> Result<String, PlatformError>;
}
