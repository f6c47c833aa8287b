/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Wire types for the subset of the Discord REST API the portal talks to.
//!
//! Snowflake ids travel as decimal strings on the wire; callers parse them at
//! the client boundary.

use serde::{Deserialize, Serialize};

pub const CHANNEL_TYPE_TEXT: u8 = 0;
pub const CHANNEL_TYPE_ANNOUNCEMENT_THREAD: u8 = 10;
pub const CHANNEL_TYPE_PUBLIC_THREAD: u8 = 11;
pub const CHANNEL_TYPE_PRIVATE_THREAD: u8 = 12;
pub const CHANNEL_TYPE_FORUM: u8 = 15;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelObject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub available_tags: Vec<ForumTagObject>,
}

impl ChannelObject {
    pub fn is_thread(&self) -> bool {
        matches!(
            self.kind,
            CHANNEL_TYPE_ANNOUNCEMENT_THREAD | CHANNEL_TYPE_PUBLIC_THREAD | CHANNEL_TYPE_PRIVATE_THREAD
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForumTagObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub moderated: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessagePayload {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StartThreadInForum {
    pub name: String,
    pub message: MessagePayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateInvite {
    pub max_age: u32,
    pub max_uses: u32,
    pub unique: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InviteObject {
    pub code: String,
}

impl InviteObject {
    pub fn url(&self) -> String {
        format!("https://discord.gg/{}", self.code)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: i64,
    /// Present on 429 responses, in seconds.
    #[serde(default)]
    pub retry_after: Option<f64>,
}
