/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Discord REST v10 implementation of [`ChatPlatform`].

use crate::http_retry::send_with_retry;
use crate::platform::{ChannelInfo, ChannelKind, ChatPlatform, ForumTag, PlatformError};
use crate::{ChannelId, PostId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use portal_protocol::{
    ApiErrorBody, ChannelObject, CreateInvite, InviteObject, MessagePayload, StartThreadInForum,
    CHANNEL_TYPE_FORUM, CHANNEL_TYPE_TEXT,
};
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct DiscordPlatform {
    client: reqwest::Client,
    base_url: String,
    token: String,
    attempts: u32,
}

impl DiscordPlatform {
    pub fn new(base_url: &str, token: &str, timeout: Duration, attempts: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("portal/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            attempts,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn idempotent(
        &self,
        build: impl FnMut() -> RequestBuilder,
    ) -> Result<Response, PlatformError> {
        let resp = send_with_retry(build, self.attempts)
            .await
            .map_err(transport_error)?;
        check(resp).await
    }

    /// Single attempt; used for calls that create something.
    async fn once(&self, rb: RequestBuilder) -> Result<Response, PlatformError> {
        let resp = rb.send().await.map_err(transport_error)?;
        check(resp).await
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelInfo, PlatformError> {
        let path = format!("/channels/{channel_id}");
        let resp = self
            .idempotent(|| self.request(reqwest::Method::GET, &path))
            .await?;
        let obj: ChannelObject = resp.json().await.map_err(decode_error)?;
        channel_info(obj)
    }

    async fn create_thread(
        &self,
        forum_id: ChannelId,
        title: &str,
        content: &str,
        tags: &[ForumTag],
    ) -> Result<PostId, PlatformError> {
        let body = StartThreadInForum {
            name: title.to_string(),
            message: MessagePayload {
                content: content.to_string(),
            },
            applied_tags: tags.iter().map(|t| t.id.to_string()).collect(),
        };
        let resp = self
            .once(
                self.request(reqwest::Method::POST, &format!("/channels/{forum_id}/threads"))
                    .json(&body),
            )
            .await?;
        let thread: ChannelObject = resp.json().await.map_err(decode_error)?;
        let id = parse_snowflake(&thread.id)?;
        debug!("thread {id} created in forum {forum_id}");
        Ok(id)
    }

    async fn edit_thread_content(&self, post_id: PostId, content: &str) -> Result<(), PlatformError> {
        // The starter message of a forum post shares the thread id.
        let path = format!("/channels/{post_id}/messages/{post_id}");
        let body = MessagePayload {
            content: content.to_string(),
        };
        self.idempotent(|| self.request(reqwest::Method::PATCH, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn send_message(&self, post_id: PostId, content: &str) -> Result<(), PlatformError> {
        let body = MessagePayload {
            content: content.to_string(),
        };
        self.once(
            self.request(reqwest::Method::POST, &format!("/channels/{post_id}/messages"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete_thread(&self, post_id: PostId) -> Result<(), PlatformError> {
        let path = format!("/channels/{post_id}");
        self.idempotent(|| self.request(reqwest::Method::DELETE, &path))
            .await?;
        Ok(())
    }

    async fn create_invite(&self, channel_id: ChannelId) -> Result<String, PlatformError> {
        let body = CreateInvite {
            max_age: 0,
            max_uses: 0,
            unique: false,
        };
        let resp = self
            .once(
                self.request(reqwest::Method::POST, &format!("/channels/{channel_id}/invites"))
                    .json(&body),
            )
            .await?;
        let invite: InviteObject = resp.json().await.map_err(decode_error)?;
        Ok(invite.url())
    }
}

async fn check(resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    Err(map_status(status, &body))
}

fn map_status(status: StatusCode, body: &ApiErrorBody) -> PlatformError {
    let detail = if body.message.is_empty() {
        status.to_string()
    } else {
        format!("{} ({})", body.message, body.code)
    };
    match status {
        StatusCode::NOT_FOUND => PlatformError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Denied(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            retry_after_ms: body
                .retry_after
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map_or(1000, |s| (s * 1000.0) as u64),
        },
        _ => PlatformError::Unavailable(format!("http {}: {detail}", status.as_u16())),
    }
}

fn transport_error(e: reqwest::Error) -> PlatformError {
    PlatformError::Unavailable(e.to_string())
}

fn decode_error(e: reqwest::Error) -> PlatformError {
    PlatformError::Unavailable(format!("decode response: {e}"))
}

fn parse_snowflake(raw: &str) -> Result<u64, PlatformError> {
    raw.trim()
        .parse()
        .map_err(|_| PlatformError::Unavailable(format!("invalid id in response: {raw}")))
}

fn channel_info(obj: ChannelObject) -> Result<ChannelInfo, PlatformError> {
    let kind = if obj.is_thread() {
        ChannelKind::Thread
    } else {
        match obj.kind {
            CHANNEL_TYPE_FORUM => ChannelKind::Forum,
            CHANNEL_TYPE_TEXT => ChannelKind::Text,
            _ => ChannelKind::Other,
        }
    };
    let available_tags = obj
        .available_tags
        .iter()
        .filter_map(|t| {
            Some(ForumTag {
                id: t.id.trim().parse().ok()?,
                name: t.name.clone(),
            })
        })
        .collect();
    Ok(ChannelInfo {
        id: parse_snowflake(&obj.id)?,
        kind,
        available_tags,
    })
}
