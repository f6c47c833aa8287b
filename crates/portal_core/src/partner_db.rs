/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::{ChannelId, NodeId, PostId, UserId};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone)]
pub struct PartnerDb {
    path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanTier {
    #[default]
    Affiliate,
    Premium,
}

impl std::str::FromStr for PlanTier {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "affiliate" | "" => Ok(Self::Affiliate),
            "premium" => Ok(Self::Premium),
            other => bail!("unknown plan: {other}"),
        }
    }
}

impl PlanTier {

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Affiliate => "affiliate",
            Self::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeProfile {
    pub node_id: NodeId,
    pub name: String,
    pub advertisement: String,
    pub tags: Vec<String>,
    pub forum_channel_id: Option<ChannelId>,
    pub home_mirror_id: Option<PostId>,
    /// Epoch seconds, 0 when the node never bumped.
    pub last_bump_ts: i64,
    pub invite_url: Option<String>,
    pub plan: PlanTier,
}

impl NodeProfile {
    pub fn new(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            node_id,
            name: name.into(),
            advertisement: String::new(),
            tags: Vec::new(),
            forum_channel_id: None,
            home_mirror_id: None,
            last_bump_ts: 0,
            invite_url: None,
            plan: PlanTier::Affiliate,
        }
    }

    pub fn has_advertisement(&self) -> bool {
        !self.advertisement.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorMapping {
    pub hosting: NodeId,
    pub advertised: NodeId,
    pub post_id: PostId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorInsert {
    Inserted,
    /// Another writer committed the pair first; carries the committed post id.
    Existing(PostId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyThread {
    pub node_id: NodeId,
    pub thread_id: PostId,
    pub last_bump: i64,
    pub next_bump: i64,
    pub last_bump_message_id: Option<PostId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedMirrors {
    pub mappings: u64,
    pub legacy: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobMigration {
    pub rows: u64,
    pub inserted: u64,
    pub already_mapped: u64,
    pub invalid: u64,
}

#[derive(Debug, Clone)]
pub struct TableOverview {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: u64,
}

impl PartnerDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create db dir: {}", parent.display()))?;
            }
        }
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS servers (
              server_id INTEGER PRIMARY KEY,
              server_name TEXT NOT NULL DEFAULT '',
              advertisement TEXT NOT NULL DEFAULT '',
              tags TEXT NOT NULL DEFAULT '',
              forum_channel_id INTEGER NULL,
              home_thread_id INTEGER NULL,
              last_bump_timestamp INTEGER NOT NULL DEFAULT 0,
              invite_url TEXT NULL,
              plan_type TEXT NOT NULL DEFAULT 'affiliate',
              propagated_threads TEXT NULL
            );

            CREATE TABLE IF NOT EXISTS whitelisted_servers (
              server_id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS devs (
              user_id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS global_partner_threads (
              hosting_server_id INTEGER NOT NULL,
              thread_id INTEGER NOT NULL,
              advertised_server_id INTEGER NOT NULL,
              PRIMARY KEY(hosting_server_id, advertised_server_id),
              CHECK(hosting_server_id <> advertised_server_id)
            );
            CREATE INDEX IF NOT EXISTS idx_gpt_advertised ON global_partner_threads(advertised_server_id);

            -- Pre-mapping layout: one thread per server, hosted in its own forum.
            CREATE TABLE IF NOT EXISTS partner_threads (
              server_id INTEGER NOT NULL,
              thread_id INTEGER NOT NULL,
              last_bump INTEGER NOT NULL DEFAULT 0,
              next_bump INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        ensure_columns(&conn, "servers", &[
            ("server_name", "TEXT NOT NULL DEFAULT ''"),
            ("advertisement", "TEXT NOT NULL DEFAULT ''"),
            ("tags", "TEXT NOT NULL DEFAULT ''"),
            ("forum_channel_id", "INTEGER NULL"),
            ("home_thread_id", "INTEGER NULL"),
            ("last_bump_timestamp", "INTEGER NOT NULL DEFAULT 0"),
            ("invite_url", "TEXT NULL"),
            ("plan_type", "TEXT NOT NULL DEFAULT 'affiliate'"),
            ("propagated_threads", "TEXT NULL"),
        ])?;
        ensure_columns(&conn, "partner_threads", &[
            ("last_bump_message_id", "INTEGER NULL"),
        ])?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("open db: {}", self.path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // --- profiles ---

    pub fn load_profile(&self, node_id: NodeId) -> Result<Option<NodeProfile>> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT server_id, server_name, advertisement, tags, forum_channel_id,
                   home_thread_id, last_bump_timestamp, invite_url, plan_type
            FROM servers WHERE server_id=?1
            "#,
            params![node_id],
            profile_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_profiles(&self) -> Result<Vec<NodeProfile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT server_id, server_name, advertisement, tags, forum_channel_id,
                   home_thread_id, last_bump_timestamp, invite_url, plan_type
            FROM servers ORDER BY server_id ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], profile_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Full upsert keyed by node id. The legacy `propagated_threads` column is left alone.
    pub fn save_profile(&self, profile: &NodeProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO servers(
              server_id, server_name, advertisement, tags, forum_channel_id,
              home_thread_id, last_bump_timestamp, invite_url, plan_type
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(server_id) DO UPDATE SET
              server_name=excluded.server_name,
              advertisement=excluded.advertisement,
              tags=excluded.tags,
              forum_channel_id=excluded.forum_channel_id,
              home_thread_id=excluded.home_thread_id,
              last_bump_timestamp=excluded.last_bump_timestamp,
              invite_url=excluded.invite_url,
              plan_type=excluded.plan_type
            "#,
            params![
                profile.node_id,
                profile.name,
                profile.advertisement,
                join_tags(&profile.tags),
                profile.forum_channel_id,
                profile.home_mirror_id,
                profile.last_bump_ts,
                profile.invite_url,
                profile.plan.as_str(),
            ],
        )?;
        Ok(())
    }

    // --- whitelist ---

    pub fn is_whitelisted(&self, node_id: NodeId) -> Result<bool> {
        let conn = self.conn()?;
        let v: Option<NodeId> = conn
            .query_row(
                "SELECT server_id FROM whitelisted_servers WHERE server_id=?1",
                params![node_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v.is_some())
    }

    /// Returns true when the node was not whitelisted before.
    pub fn whitelist_node(&self, node_id: NodeId) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO whitelisted_servers(server_id) VALUES (?1)",
            params![node_id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_whitelisted(&self) -> Result<Vec<NodeId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT server_id FROM whitelisted_servers ORDER BY server_id ASC")?;
        let rows = stmt
            .query_map([], |r| r.get::<_, NodeId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Removes the node and everything hanging off it in one transaction.
    /// Returns false (and changes nothing) when the node is not whitelisted.
    pub fn delist_cascade(&self, node_id: NodeId) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists: Option<NodeId> = tx
            .query_row(
                "SELECT server_id FROM whitelisted_servers WHERE server_id=?1",
                params![node_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }
        tx.execute("DELETE FROM whitelisted_servers WHERE server_id=?1", params![node_id])?;
        tx.execute("DELETE FROM servers WHERE server_id=?1", params![node_id])?;
        tx.execute("DELETE FROM partner_threads WHERE server_id=?1", params![node_id])?;
        tx.execute(
            "DELETE FROM global_partner_threads WHERE hosting_server_id=?1 OR advertised_server_id=?1",
            params![node_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Makes a legacy thread the node's home post and drops the legacy row, so the
    /// post is no longer treated as a mirror. No-op when the node already has a home.
    pub fn adopt_legacy_home(&self, node_id: NodeId, thread_id: PostId) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE servers SET home_thread_id=?2 WHERE server_id=?1 AND home_thread_id IS NULL",
            params![node_id, thread_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM partner_threads WHERE server_id=?1 AND thread_id=?2",
            params![node_id, thread_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    // --- operators ---

    pub fn is_operator(&self, user_id: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let v: Option<UserId> = conn
            .query_row("SELECT user_id FROM devs WHERE user_id=?1", params![user_id], |r| r.get(0))
            .optional()?;
        Ok(v.is_some())
    }

    pub fn add_operator(&self, user_id: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("INSERT OR IGNORE INTO devs(user_id) VALUES (?1)", params![user_id])?;
        Ok(changed > 0)
    }

    pub fn remove_operator(&self, user_id: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM devs WHERE user_id=?1", params![user_id])?;
        Ok(changed > 0)
    }

    pub fn list_operators(&self) -> Result<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id FROM devs ORDER BY user_id ASC")?;
        let rows = stmt
            .query_map([], |r| r.get::<_, UserId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // --- mirror mappings ---

    pub fn get_mirror(&self, hosting: NodeId, advertised: NodeId) -> Result<Option<PostId>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT thread_id FROM global_partner_threads WHERE hosting_server_id=?1 AND advertised_server_id=?2",
            params![hosting, advertised],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Insert-if-absent on the composite key. The first committed writer wins.
    pub fn insert_mirror_if_absent(
        &self,
        hosting: NodeId,
        advertised: NodeId,
        post_id: PostId,
    ) -> Result<MirrorInsert> {
        if hosting == advertised {
            bail!("refusing self mirror for node {hosting}");
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = insert_mirror_tx(&tx, hosting, advertised, post_id)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn list_mirrors(&self) -> Result<Vec<MirrorMapping>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT hosting_server_id, advertised_server_id, thread_id
            FROM global_partner_threads
            ORDER BY hosting_server_id ASC, advertised_server_id ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(MirrorMapping {
                    hosting: r.get(0)?,
                    advertised: r.get(1)?,
                    post_id: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_mirrors(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM global_partner_threads", [], |r| r.get(0))?;
        Ok(n)
    }

    /// Clears both the mapping table and the legacy table in one transaction.
    pub fn clear_all_mirrors(&self) -> Result<ClearedMirrors> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mappings = tx.execute("DELETE FROM global_partner_threads", [])? as u64;
        let legacy = tx.execute("DELETE FROM partner_threads", [])? as u64;
        tx.commit()?;
        Ok(ClearedMirrors { mappings, legacy })
    }

    // --- legacy layouts ---

    pub fn legacy_threads(&self) -> Result<Vec<LegacyThread>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT server_id, thread_id, last_bump, next_bump, last_bump_message_id
            FROM partner_threads ORDER BY server_id ASC, rowid ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(LegacyThread {
                    node_id: r.get(0)?,
                    thread_id: r.get(1)?,
                    last_bump: r.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    next_bump: r.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    last_bump_message_id: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn legacy_thread_for(&self, node_id: NodeId) -> Result<Option<PostId>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT thread_id FROM partner_threads WHERE server_id=?1 ORDER BY rowid ASC LIMIT 1",
            params![node_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn insert_legacy_thread(&self, node_id: NodeId, thread_id: PostId, last_bump: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO partner_threads(server_id, thread_id, last_bump, next_bump) VALUES (?1, ?2, ?3, 0)",
            params![node_id, thread_id, last_bump],
        )?;
        Ok(())
    }

    pub fn set_propagated_blob(&self, node_id: NodeId, blob: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE servers SET propagated_threads=?2 WHERE server_id=?1",
            params![node_id, blob],
        )?;
        if changed == 0 {
            bail!("no profile row for node {node_id}");
        }
        Ok(())
    }

    /// Moves every `propagated_threads` blob into the mapping table, then clears the column.
    /// The blob sits on the advertised node's row and maps hosting node -> thread id.
    pub fn migrate_propagated_blobs(&self) -> Result<BlobMigration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let blobs = {
            let mut stmt = tx.prepare(
                r#"
                SELECT server_id, propagated_threads FROM servers
                WHERE propagated_threads IS NOT NULL AND TRIM(propagated_threads) <> ''
                ORDER BY server_id ASC
                "#,
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, NodeId>(0)?, r.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut out = BlobMigration::default();
        for (advertised, blob) in blobs {
            out.rows += 1;
            let (entries, invalid) = parse_propagated_blob(&blob);
            out.invalid += invalid;
            for (hosting, post_id) in entries {
                if hosting == advertised {
                    out.invalid += 1;
                    continue;
                }
                match insert_mirror_tx(&tx, hosting, advertised, post_id)? {
                    MirrorInsert::Inserted => out.inserted += 1,
                    MirrorInsert::Existing(_) => out.already_mapped += 1,
                }
            }
            tx.execute(
                "UPDATE servers SET propagated_threads=NULL WHERE server_id=?1",
                params![advertised],
            )?;
        }
        tx.commit()?;
        Ok(out)
    }

    // --- inspection ---

    pub fn table_overview(&self) -> Result<Vec<TableOverview>> {
        let conn = self.conn()?;
        let names = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name ASC",
            )?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let columns = {
                let mut stmt = conn.prepare(&format!("PRAGMA table_info({name})"))?;
                let rows = stmt
                    .query_map([], |r| r.get::<_, String>(1))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            let rows: u64 = conn.query_row(&format!("SELECT COUNT(*) FROM {name}"), [], |r| r.get(0))?;
            out.push(TableOverview { name, columns, rows });
        }
        Ok(out)
    }
}

fn insert_mirror_tx(
    tx: &rusqlite::Transaction<'_>,
    hosting: NodeId,
    advertised: NodeId,
    post_id: PostId,
) -> Result<MirrorInsert> {
    let changed = tx.execute(
        r#"
        INSERT OR IGNORE INTO global_partner_threads(hosting_server_id, thread_id, advertised_server_id)
        VALUES (?1, ?2, ?3)
        "#,
        params![hosting, post_id, advertised],
    )?;
    if changed > 0 {
        return Ok(MirrorInsert::Inserted);
    }
    let existing: PostId = tx.query_row(
        "SELECT thread_id FROM global_partner_threads WHERE hosting_server_id=?1 AND advertised_server_id=?2",
        params![hosting, advertised],
        |r| r.get(0),
    )?;
    Ok(MirrorInsert::Existing(existing))
}

fn profile_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<NodeProfile> {
    let tags: Option<String> = r.get(3)?;
    let plan: Option<String> = r.get(8)?;
    Ok(NodeProfile {
        node_id: r.get(0)?,
        name: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
        advertisement: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
        tags: parse_tags(tags.as_deref().unwrap_or("")),
        forum_channel_id: r.get(4)?,
        home_mirror_id: r.get(5)?,
        last_bump_ts: r.get::<_, Option<i64>>(6)?.unwrap_or(0),
        invite_url: r.get::<_, Option<String>>(7)?.filter(|s| !s.trim().is_empty()),
        plan: plan
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default(),
    })
}

/// Splits a comma separated tag list: trimmed, empties dropped, first occurrence wins.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(|s| s.to_string())
        .collect()
}

fn join_tags(tags: &[String]) -> String {
    let joined = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    parse_tags(&joined).join(",")
}

fn parse_id(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts `{"<hosting_id>": <thread_id>}` or `[{"hosting_server_id": .., "thread_id": ..}]`.
/// Returns the parsed pairs and the number of entries that could not be read.
fn parse_propagated_blob(blob: &str) -> (Vec<(NodeId, PostId)>, u64) {
    let Ok(v) = serde_json::from_str::<Value>(blob) else {
        return (Vec::new(), 1);
    };
    let mut out = Vec::new();
    let mut invalid = 0;
    match v {
        Value::Object(map) => {
            for (k, v) in map {
                match (k.trim().parse::<u64>().ok(), parse_id(&v)) {
                    (Some(h), Some(t)) => out.push((h, t)),
                    _ => invalid += 1,
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let h = item.get("hosting_server_id").and_then(parse_id);
                let t = item.get("thread_id").and_then(parse_id);
                match (h, t) {
                    (Some(h), Some(t)) => out.push((h, t)),
                    _ => invalid += 1,
                }
            }
        }
        _ => invalid += 1,
    }
    (out, invalid)
}

fn ensure_columns(conn: &Connection, table: &str, cols: &[(&str, &str)]) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut existing = HashSet::new();
    for r in rows {
        existing.insert(r?);
    }
    for (name, ty) in cols {
        if !existing.contains(*name) {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {ty}"), [])?;
        }
    }
    Ok(())
}
