//! Directory synchronization against the per-user transaction log.
//!
//! Each round fetches the remote log, pushes local files the log has never
//! seen, and reconciles every known path by comparing the latest entry
//! timestamps in the freshly fetched log against the log from the previous
//! round. Conflicts resolve last-writer-wins by Lamport timestamp; equal
//! timestamps are a no-op.

use std::cmp::Ordering;
use std::path::{Component, Path};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use peervault_protocol::txlog::{Operation, TransactionEntity, TransactionLog};
use peervault_protocol::{Identifier, Method};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{download, routing, txlog, upload, Ctx};

/// Uploads one file and records an `Update` entry in the transaction log.
pub async fn post_file(ctx: &Ctx, local_root: &Path, rel: &str) -> Result<()> {
    upload::upload_file(ctx, local_root, rel).await?;
    txlog::append_entry(ctx, rel, Operation::Update).await
}

/// Deletes the resource from its responsible node and records a `Delete`
/// entry. A node that no longer holds the envelope is not an error; the log
/// entry is what propagates the deletion.
pub async fn delete_file(ctx: &Ctx, rel: &str) -> Result<()> {
    let key = Identifier::resource_id(rel);
    let node = routing::locate(ctx, key).await?;
    let transport = ctx.connect(&node);
    let mut header = ctx.header();
    header.key = key;
    header.resource_name = rel.to_owned();
    header.log = true;
    let response = transport
        .round_trip(Method::DeleteFile, header, Vec::new())
        .await?;
    if !response.is_success() {
        debug!(path = %rel, "remote had no envelope to delete");
    }
    txlog::append_entry(ctx, rel, Operation::Delete).await
}

/// What one sync round should do for a path found in the remote log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Download,
    RemoveLocal,
    Upload,
    DeleteRemote,
    Noop,
}

/// Pure reconciliation decision for one path, given the latest entries of
/// the previous round's log and the freshly fetched one.
pub fn decide(prior: Option<&TransactionEntity>, remote: &TransactionEntity) -> SyncAction {
    let Some(remote_last) = remote.latest_entry() else {
        return SyncAction::Noop;
    };
    let Some(prior_last) = prior.and_then(TransactionEntity::latest_entry) else {
        // This client has never seen the path: materialize it.
        return SyncAction::Download;
    };
    match prior_last.timestamp.cmp(&remote_last.timestamp) {
        Ordering::Less => match remote_last.operation {
            Operation::Delete => SyncAction::RemoveLocal,
            Operation::Update => SyncAction::Download,
        },
        Ordering::Equal => SyncAction::Noop,
        Ordering::Greater => match prior_last.operation {
            Operation::Delete => SyncAction::DeleteRemote,
            Operation::Update => SyncAction::Upload,
        },
    }
}

/// One reconciliation round. Returns the fetched remote log, which becomes
/// `prior` for the next round. Per-file failures are logged and skipped.
pub async fn synchronize(
    ctx: &Ctx,
    local_root: &Path,
    prior: &TransactionLog,
) -> Result<TransactionLog> {
    let remote = match txlog::get_transaction_log(ctx).await {
        Ok(log) => log,
        Err(error) => {
            warn!(?error, "failed to fetch transaction log, proceeding as empty");
            TransactionLog::default()
        }
    };

    // Push files the network has never seen.
    for rel in upload::collect_files(local_root)? {
        if !remote.contains(&rel) {
            debug!(path = %rel, "pushing file unknown to the log");
            if let Err(error) = post_file(ctx, local_root, &rel).await {
                warn!(?error, path = %rel, "failed to push new file");
            }
        }
    }

    // Reconcile every path the log knows about.
    for (path, entity) in remote.iter() {
        let action = decide(prior.get(path), entity);
        let result = match action {
            SyncAction::Download => download::materialize(ctx, local_root, path).await,
            SyncAction::RemoveLocal => remove_local(local_root, path),
            SyncAction::Upload => post_file(ctx, local_root, path).await,
            SyncAction::DeleteRemote => delete_file(ctx, path).await,
            SyncAction::Noop => Ok(()),
        };
        if let Err(error) = result {
            warn!(?error, path = %path, ?action, "sync action failed");
        }
    }

    Ok(remote)
}

fn remove_local(local_root: &Path, rel: &str) -> Result<()> {
    match fs_err::remove_file(download::local_path(local_root, rel)?) {
        Ok(()) => {
            info!(path = %rel, "removed locally (deleted remotely)");
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Runs `synchronize` on every poll tick and propagates filesystem events in
/// between. The watcher is detached for the duration of each round so files
/// the round itself rewrites do not echo back as events. Returns cleanly on
/// interrupt; a broken watcher ends the loop with an error.
pub async fn sync_loop(ctx: &Ctx, local_root: &Path, poll_interval: Duration) -> Result<()> {
    let mut prior = synchronize(ctx, local_root, &TransactionLog::default()).await?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event| {
        let _ = events_tx.send(event);
    })?;
    watcher.watch(local_root, RecursiveMode::Recursive)?;

    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    poll.tick().await; // the first tick completes immediately

    info!(root = %local_root.display(), "sync loop started");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping sync");
                return Ok(());
            }
            _ = poll.tick() => {
                watcher.unwatch(local_root)?;
                match synchronize(ctx, local_root, &prior).await {
                    Ok(log) => prior = log,
                    Err(error) => warn!(?error, "sync round failed"),
                }
                watcher.watch(local_root, RecursiveMode::Recursive)?;
            }
            event = events.recv() => {
                let event = event
                    .context("watcher event channel closed")?
                    .context("filesystem watcher failed")?;
                handle_event(ctx, local_root, event).await;
            }
        }
    }
}

async fn handle_event(ctx: &Ctx, local_root: &Path, event: notify::Event) {
    for path in &event.paths {
        let Some(rel) = relative_name(local_root, path) else {
            continue;
        };
        let result = match event.kind {
            EventKind::Remove(_) => {
                info!(path = %rel, "local file removed");
                delete_file(ctx, &rel).await
            }
            EventKind::Create(_) | EventKind::Modify(_) if path.is_file() => {
                info!(path = %rel, "local file written");
                post_file(ctx, local_root, &rel).await
            }
            _ => Ok(()),
        };
        if let Err(error) = result {
            warn!(?error, path = %rel, "failed to propagate local change");
        }
    }
}

/// Resource name ('/'-separated) of an absolute path below `root`; `None`
/// for the root itself or anything outside it.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
