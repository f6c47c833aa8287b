/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::platform::PlatformError;
use crate::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("node {0} is not whitelisted")]
    NotWhitelisted(NodeId),

    #[error("node {0} has no registered advertisement")]
    NotRegistered(NodeId),

    #[error("cooldown active: {0}s remaining")]
    CooldownActive(u64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("platform unavailable: {0}")]
    ExternalUnavailable(#[from] PlatformError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl PortalError {
    /// Expected, user-facing outcomes that are not failures of the system.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::CooldownActive(_))
    }
}
