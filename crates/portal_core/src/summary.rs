/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::{NodeId, PostId};
use serde::Serialize;

/// A single target that could not be brought up to date during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub node_id: NodeId,
    pub summary: String,
}

impl TargetFailure {
    pub fn new(node_id: NodeId, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        let summary = summary.lines().next().unwrap_or("").trim();
        Self {
            node_id,
            summary: summary.chars().take(140).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HomeOutcome {
    Created { post_id: PostId },
    Updated { post_id: PostId },
    /// The stored home post was gone and has been opened again.
    Recreated { post_id: PostId },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BumpSummary {
    pub source: NodeId,
    pub bumped_at: i64,
    pub home: HomeOutcome,
    pub created: u64,
    pub updated: u64,
    /// Whitelisted targets without a registered channel.
    pub skipped: Vec<NodeId>,
    pub failures: Vec<TargetFailure>,
}

impl BumpSummary {
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    pub fn render(&self, preview: usize) -> String {
        let mut out = format!(
            "Bumped {}: {} created, {} updated, {} failed",
            self.source,
            self.created,
            self.updated,
            self.failed()
        );
        if !self.skipped.is_empty() {
            out.push_str(&format!(", {} not registered", self.skipped.len()));
        }
        out.push('.');
        if let HomeOutcome::Failed { reason } = &self.home {
            out.push_str(&format!("\nHome post could not be refreshed: {reason}"));
        }
        out.push_str(&render_failures(&self.failures, preview));
        out
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub created: u64,
    pub already_mapped: u64,
    /// Pairs left alone because one side has no channel or no advertisement.
    pub skipped: u64,
    pub failures: Vec<TargetFailure>,
}

impl SyncSummary {
    pub fn render(&self, preview: usize) -> String {
        let mut out = format!(
            "Synced network: {} created, {} already mapped, {} skipped, {} failed.",
            self.created,
            self.already_mapped,
            self.skipped,
            self.failures.len()
        );
        out.push_str(&render_failures(&self.failures, preview));
        out
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownSummary {
    pub deleted: u64,
    /// Posts that were already gone; counted as done.
    pub already_gone: u64,
    pub failures: Vec<PostFailure>,
    pub cleared_mappings: u64,
    pub cleared_legacy: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostFailure {
    pub post_id: PostId,
    pub summary: String,
}

impl TeardownSummary {
    pub fn render(&self, preview: usize) -> String {
        let mut out = format!(
            "Deleted {} mirrors. {} already gone, {} failed. Cleared {} mappings and {} legacy rows.",
            self.deleted,
            self.already_gone,
            self.failures.len(),
            self.cleared_mappings,
            self.cleared_legacy
        );
        for f in self.failures.iter().take(preview) {
            out.push_str(&format!("\n• post {}: {}", f.post_id, f.summary));
        }
        if self.failures.len() > preview {
            out.push_str(&format!("\n…and {} more", self.failures.len() - preview));
        }
        out
    }
}

fn render_failures(failures: &[TargetFailure], preview: usize) -> String {
    let mut out = String::new();
    for f in failures.iter().take(preview) {
        out.push_str(&format!("\n• {}: {}", f.node_id, f.summary));
    }
    if failures.len() > preview {
        out.push_str(&format!("\n…and {} more", failures.len() - preview));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_summary_is_single_line() {
        let f = TargetFailure::new(3, format!("first line\nsecond {}", "x".repeat(10)));
        assert_eq!(f.summary, "first line");
        let long = TargetFailure::new(3, "y".repeat(500));
        assert_eq!(long.summary.len(), 140);
    }

    #[test]
    fn render_caps_failures_and_keeps_true_count() {
        let s = BumpSummary {
            source: 1,
            bumped_at: 0,
            home: HomeOutcome::Updated { post_id: 9 },
            created: 1,
            updated: 2,
            skipped: vec![],
            failures: (10..15).map(|n| TargetFailure::new(n, "not found")).collect(),
        };
        let text = s.render(2);
        assert!(text.starts_with("Bumped 1: 1 created, 2 updated, 5 failed."));
        assert!(text.contains("• 10: not found"));
        assert!(text.contains("• 11: not found"));
        assert!(!text.contains("• 12:"));
        assert!(text.ends_with("…and 3 more"));
    }

    #[test]
    fn render_mentions_home_failure() {
        let s = BumpSummary {
            source: 1,
            bumped_at: 0,
            home: HomeOutcome::Failed { reason: "denied".to_string() },
            created: 0,
            updated: 0,
            skipped: vec![4],
            failures: vec![],
        };
        let text = s.render(10);
        assert!(text.contains("1 not registered"));
        assert!(text.contains("Home post could not be refreshed: denied"));
    }
}
