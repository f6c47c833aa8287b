/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Rendering of mirror posts.

use crate::partner_db::NodeProfile;
use crate::platform::ForumTag;

pub const MAX_CONTENT_CHARS: usize = 2000;
pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_APPLIED_TAGS: usize = 5;
/// Discord guild names are at most 100 characters.
pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_INVITE_CHARS: usize = 256;

fn display_name(profile: &NodeProfile) -> String {
    let name = profile.name.trim();
    if name.is_empty() {
        format!("Server {}", profile.node_id)
    } else {
        clamp_chars(name, MAX_NAME_CHARS)
    }
}

/// An absolute http(s) URL short enough to embed in a post.
pub fn is_valid_invite(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || url.chars().count() > MAX_INVITE_CHARS {
        return false;
    }
    matches!(
        reqwest::Url::parse(url).map(|u| u.scheme().to_string()).as_deref(),
        Ok("https") | Ok("http")
    )
}

pub fn mirror_title(profile: &NodeProfile) -> String {
    clamp_chars(&format!("🌸 {} — Partner Ad", display_name(profile)), MAX_TITLE_CHARS)
}

/// MM/DD/YYYY in UTC.
pub fn listed_on(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .format("%m/%d/%Y")
        .to_string()
}

pub fn mirror_content(profile: &NodeProfile, network_name: &str, listed_at: i64) -> String {
    let name = display_name(profile);
    let join = match profile.invite_url.as_deref() {
        Some(url) if is_valid_invite(url) => format!("[Join Server]({})", url.trim()),
        _ => format!("Server ID: {}", profile.node_id),
    };
    let tags = if profile.tags.is_empty() {
        "None".to_string()
    } else {
        profile.tags.join(", ")
    };
    let head = format!("**{name}** ({join})\n\n");
    let tail = format!(
        "\n\n💌 Added to {network_name} on {}\n\nTags: {tags}",
        listed_on(listed_at)
    );
    let budget = MAX_CONTENT_CHARS
        .saturating_sub(head.chars().count())
        .saturating_sub(tail.chars().count());
    let ad = clamp_chars(profile.advertisement.trim(), budget);
    // A long network name can still overflow; the platform rejects anything longer.
    clamp_chars(&format!("{head}{ad}{tail}"), MAX_CONTENT_CHARS)
}

/// Host vocabulary entries named in `wanted`, in vocabulary order. Unknown names are dropped.
pub fn match_tags(wanted: &[String], available: &[ForumTag]) -> Vec<ForumTag> {
    available
        .iter()
        .filter(|t| wanted.iter().any(|w| w == &t.name))
        .take(MAX_APPLIED_TAGS)
        .cloned()
        .collect()
}

fn clamp_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = input.chars().take(max - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: u64, name: &str) -> ForumTag {
        ForumTag { id, name: name.to_string() }
    }

    fn profile() -> NodeProfile {
        let mut p = NodeProfile::new(1001, "Server A");
        p.advertisement = "We are cozy.".to_string();
        p.tags = vec!["RP".to_string(), "ERP".to_string()];
        p
    }

    #[test]
    fn content_with_invite() {
        let mut p = profile();
        p.invite_url = Some("https://discord.gg/abc".to_string());
        let text = mirror_content(&p, "Portal", 0);
        assert_eq!(
            text,
            "**Server A** ([Join Server](https://discord.gg/abc))\n\nWe are cozy.\n\n💌 Added to Portal on 01/01/1970\n\nTags: RP, ERP"
        );
    }

    #[test]
    fn content_without_invite_or_tags() {
        let mut p = profile();
        p.tags.clear();
        let text = mirror_content(&p, "Portal", 1_700_000_000);
        assert!(text.starts_with("**Server A** (Server ID: 1001)"));
        assert!(text.contains("on 11/14/2023"));
        assert!(text.ends_with("Tags: None"));
    }

    #[test]
    fn long_advertisement_is_truncated_to_fit() {
        let mut p = profile();
        p.advertisement = "x".repeat(5000);
        let text = mirror_content(&p, "Portal", 0);
        assert_eq!(text.chars().count(), MAX_CONTENT_CHARS);
        assert!(text.contains('…'));
        assert!(text.ends_with("Tags: RP, ERP"));
    }

    #[test]
    fn oversized_name_and_invite_still_fit() {
        let mut p = NodeProfile::new(1, "n".repeat(2100));
        p.advertisement = "ad".to_string();
        p.invite_url = Some(format!("https://discord.gg/{}", "x".repeat(3000)));
        let text = mirror_content(&p, "Portal", 0);
        assert!(text.chars().count() <= MAX_CONTENT_CHARS);
        assert!(text.starts_with(&format!("**{}…** (Server ID: 1)", "n".repeat(99))));
        assert!(text.contains("\n\nad\n\n"));

        let text = mirror_content(&p, &"N".repeat(3000), 0);
        assert_eq!(text.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn invite_must_be_a_web_url() {
        assert!(is_valid_invite("https://discord.gg/abc"));
        assert!(is_valid_invite(" http://example.org/join "));
        assert!(!is_valid_invite("discord.gg/abc"));
        assert!(!is_valid_invite("javascript:alert(1)"));
        assert!(!is_valid_invite(&format!("https://discord.gg/{}", "x".repeat(300))));
    }

    #[test]
    fn title_falls_back_to_id() {
        let p = NodeProfile::new(7, "  ");
        assert_eq!(mirror_title(&p), "🌸 Server 7 — Partner Ad");
        let long = NodeProfile::new(7, "n".repeat(300));
        assert_eq!(mirror_title(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn unmatched_tags_are_dropped_silently() {
        let wanted = vec!["RP".to_string(), "ERP".to_string(), "Unknown".to_string()];
        let vocab = vec![tag(1, "RP"), tag(2, "ERP")];
        let names: Vec<_> = match_tags(&wanted, &vocab).into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["RP", "ERP"]);
    }

    #[test]
    fn tag_matching_follows_host_order_and_cap() {
        let wanted: Vec<String> = ["g", "f", "e", "d", "c", "b", "a"].iter().map(|s| s.to_string()).collect();
        let vocab: Vec<ForumTag> = ["a", "b", "c", "d", "e", "f", "g", "rp"]
            .iter()
            .enumerate()
            .map(|(i, n)| tag(i as u64, n))
            .collect();
        let names: Vec<_> = match_tags(&wanted, &vocab).into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["a", "b", "c", "d", "e"]);
        assert!(match_tags(&["RP".to_string()], &vocab).is_empty());
    }
}
