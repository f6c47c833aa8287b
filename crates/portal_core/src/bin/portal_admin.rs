/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - Portal Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use portal_core::config::{default_config_path, load_config};
use portal_core::cooldown;
use portal_core::discord::DiscordPlatform;
use portal_core::engine::{PortalEngine, Registration};
use portal_core::error::PortalError;
use portal_core::partner_db::{PartnerDb, PlanTier};
use portal_core::{ChannelId, NodeId, UserId};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Operator console for the partner portal network.
#[derive(Parser, Debug)]
#[command(name = "portal_admin", version)]
struct Args {
    /// Path of the JSON config file
    #[arg(long, env = "PORTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Act as this user id (defaults to the configured owner)
    #[arg(long)]
    as_user: Option<UserId>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh a node's advertisement across the network
    Bump { node: NodeId },
    /// Create or edit a node's registration
    Register {
        node: NodeId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        ad: String,
        /// Comma separated tag names
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long)]
        forum_channel: ChannelId,
        #[arg(long)]
        invite: Option<String>,
        #[arg(long, default_value = "affiliate")]
        plan: String,
    },
    /// Create every missing mirror in the network
    Sync,
    /// Create missing mirrors involving one node
    SyncNode { node: NodeId },
    /// Delete every mirror post and clear the mapping store
    DeleteAllMirrors {
        #[arg(long)]
        yes: bool,
    },
    Whitelist { node: NodeId },
    Delist { node: NodeId },
    AddOperator { user: UserId },
    RemoveOperator { user: UserId },
    Operators,
    Nodes,
    Status,
    /// Fold legacy data into the mapping table
    Migrate,
    InspectDb,
}

impl Command {
    fn uses_platform(&self) -> bool {
        matches!(
            self,
            Self::Bump { .. }
                | Self::Register { .. }
                | Self::Sync
                | Self::SyncNode { .. }
                | Self::DeleteAllMirrors { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().context("parse log directive")?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (cfg_path, explicit) = match args.config.clone() {
        Some(p) => (p, true),
        None => (default_config_path()?, false),
    };
    let mut cfg = load_config(&cfg_path, explicit)?;
    cfg.apply_env()?;
    info!("config: {}", cfg_path.display());

    let db_path = cfg.db_path()?;
    let db = Arc::new(PartnerDb::open(&db_path)?);
    info!("db: {}", db_path.display());

    let token = cfg.bot_token.clone().unwrap_or_default();
    if token.trim().is_empty() && args.command.uses_platform() {
        bail!("bot token missing: set PORTAL_BOT_TOKEN or bot_token in the config file");
    }
    let platform = DiscordPlatform::new(
        &cfg.api_base_url(),
        &token,
        cfg.http_timeout(),
        cfg.http_attempts(),
    )?;
    let engine = PortalEngine::new(db, Arc::new(platform), cfg.engine_settings(), cfg.owner_id);
    let preview = engine.settings().failure_preview;

    let caller = match args.as_user.or(cfg.owner_id) {
        Some(id) => id,
        None => bail!("no caller: pass --as-user or set owner_id"),
    };

    match run(&engine, caller, args.command, args.json, preview).await {
        Ok(()) => Ok(()),
        Err(RunError::Portal(e)) if e.is_expected() => {
            println!("{}", explain(&e));
            Ok(())
        }
        Err(RunError::Portal(e)) => Err(e.into()),
        Err(RunError::Other(e)) => Err(e),
    }
}

fn explain(e: &PortalError) -> String {
    match e {
        PortalError::CooldownActive(secs) => {
            format!("Cooldown active. Try again in {}.", cooldown::describe(*secs))
        }
        other => other.to_string(),
    }
}

enum RunError {
    Portal(PortalError),
    Other(anyhow::Error),
}

impl From<PortalError> for RunError {
    fn from(e: PortalError) -> Self {
        Self::Portal(e)
    }
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: String) -> Result<(), RunError> {
    if json {
        let out = serde_json::to_string_pretty(value).context("encode json")?;
        println!("{out}");
    } else {
        println!("{text}");
    }
    Ok(())
}

async fn run(
    engine: &PortalEngine,
    caller: UserId,
    command: Command,
    json: bool,
    preview: usize,
) -> Result<(), RunError> {
    match command {
        Command::Bump { node } => {
            let s = engine.bump(node).await?;
            emit(json, &s, s.render(preview))
        }
        Command::Register {
            node,
            name,
            ad,
            tags,
            forum_channel,
            invite,
            plan,
        } => {
            let plan: PlanTier = plan
                .parse()
                .map_err(|e: anyhow::Error| PortalError::InvalidInput(e.to_string()))?;
            let out = engine
                .register(Registration {
                    node_id: node,
                    name,
                    advertisement: ad,
                    tags: tags.split(',').map(str::to_string).collect(),
                    forum_channel_id: forum_channel,
                    invite_url: invite,
                    plan,
                })
                .await?;
            let verb = if out.created { "Registered" } else { "Updated" };
            println!(
                "{verb} {} ({}) with channel {}.",
                out.profile.name,
                out.profile.node_id,
                forum_channel
            );
            Ok(())
        }
        Command::Sync => {
            let s = engine.sync_network(caller).await?;
            emit(json, &s, s.render(preview))
        }
        Command::SyncNode { node } => {
            let s = engine.sync_node(caller, node).await?;
            emit(json, &s, s.render(preview))
        }
        Command::DeleteAllMirrors { yes } => {
            if !yes {
                return Err(anyhow::anyhow!("refusing to delete every mirror without --yes").into());
            }
            let s = engine.delete_all_mirrors(caller).await?;
            emit(json, &s, s.render(preview))
        }
        Command::Whitelist { node } => {
            let added = engine.whitelist(caller, node).await?;
            println!(
                "{}",
                if added {
                    format!("Node {node} whitelisted.")
                } else {
                    format!("Node {node} was already whitelisted.")
                }
            );
            Ok(())
        }
        Command::Delist { node } => {
            engine.delist(caller, node).await?;
            println!("Node {node} removed from the network.");
            Ok(())
        }
        Command::AddOperator { user } => {
            let added = engine.add_operator(caller, user).await?;
            println!("Operator {user} {}.", if added { "added" } else { "already present" });
            Ok(())
        }
        Command::RemoveOperator { user } => {
            let removed = engine.remove_operator(caller, user).await?;
            println!("Operator {user} {}.", if removed { "removed" } else { "not found" });
            Ok(())
        }
        Command::Operators => {
            let ops = engine.list_operators(caller).await?;
            let text = if ops.is_empty() {
                "No operators.".to_string()
            } else {
                ops.iter().map(|u| u.to_string()).collect::<Vec<_>>().join("\n")
            };
            emit(json, &ops, text)
        }
        Command::Nodes => {
            let nodes = engine.list_nodes(caller).await?;
            let lines: Vec<String> = nodes
                .iter()
                .map(|n| match &n.name {
                    Some(name) => format!(
                        "{}  {name}  last bump {}",
                        n.node_id,
                        if n.last_bump_ts > 0 {
                            portal_core::format::listed_on(n.last_bump_ts)
                        } else {
                            "never".to_string()
                        }
                    ),
                    None => format!("{}  (not registered)", n.node_id),
                })
                .collect();
            emit(json, &nodes, lines.join("\n"))
        }
        Command::Status => {
            let s = engine.network_status(caller).await?;
            let text = format!(
                "{} whitelisted, {} registered, {}/{} mirrors, {} legacy threads, {} operators.",
                s.whitelisted, s.registered, s.mirrors, s.expected_mirrors, s.legacy_threads, s.operators
            );
            emit(json, &s, text)
        }
        Command::Migrate => {
            let m = engine.migrate_legacy(caller).await?;
            println!(
                "Migrated {} blobs: {} inserted, {} already mapped, {} unreadable.",
                m.rows, m.inserted, m.already_mapped, m.invalid
            );
            Ok(())
        }
        Command::InspectDb => {
            for t in engine.table_overview(caller).await? {
                println!("{} ({} rows): {}", t.name, t.rows, t.columns.join(", "));
            }
            Ok(())
        }
    }
}
