/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod config;
pub mod cooldown;
pub mod discord;
pub mod engine;
pub mod error;
pub mod format;
pub mod http_retry;
pub mod partner_db;
pub mod platform;
mod propagation;
mod reconcile;
pub mod summary;
mod teardown;
#[cfg(test)]
mod test_support;

/// Discord guild id of a participating community.
pub type NodeId = u64;
pub type UserId = u64;
pub type ChannelId = u64;
/// A forum thread id. For forum posts the starter message shares this id.
pub type PostId = u64;
