//! Client file synchronisation against the real filesystem.

use super::helpers::{PlaneFixture, file_server, plane, read_json};
use crate::test_helpers::{server_id, server_with_tool};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use switchyard::error::ErrorKind;
use switchyard::sync::domain::SyncOutcome;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_sync_leaves_bytes_identical(plane: PlaneFixture) -> eyre::Result<()> {
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    let path = plane.client_path("claude-desktop");

    let first = plane.plane.sync_client("claude-desktop").await;
    eyre::ensure!(first.success, "first sync failed: {}", first.detail);
    let written = fs::read(&path)?;
    let second = plane.plane.sync_client("claude-desktop").await;

    assert_eq!(second.value.map(|summary| summary.outcome), Some(SyncOutcome::Unchanged));
    assert_eq!(fs::read(&path)?, written);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_writes_each_client_in_its_own_shape(plane: PlaneFixture) -> eyre::Result<()> {
    plane.registry.insert(file_server("files")?, &DefaultClock)?;

    let synced = plane.plane.sync_all().await;

    let reports = synced.value.unwrap_or_default();
    assert!(reports.iter().all(|(_, result)| result.success));
    assert_eq!(
        read_json(&plane.client_path("claude-desktop"))?,
        json!({"mcpServers": {"files": {"command": "/opt/files/server", "args": ["--root", "/srv"]}}})
    );
    assert_eq!(
        read_json(&plane.client_path("vscode"))?,
        json!({"servers": {"files": {"type": "stdio", "command": "/opt/files/server", "args": ["--root", "/srv"]}}})
    );
    assert_eq!(
        read_json(&plane.client_path("zed"))?,
        json!({"context_servers": {"files": {"command": {"path": "/opt/files/server", "args": ["--root", "/srv"]}}}})
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn add_then_remove_restores_user_content(plane: PlaneFixture) -> eyre::Result<()> {
    let path = plane.client_path("claude-desktop");
    let original = json!({
        "globalShortcut": "Ctrl+Space",
        "mcpServers": {"mine": {"command": "/usr/local/bin/mine"}}
    });
    fs::create_dir_all(plane.root.join("Claude"))?;
    fs::write(&path, serde_json::to_string_pretty(&original)?)?;
    plane.registry.insert(file_server("files")?, &DefaultClock)?;

    let added = plane.plane.add_server("claude-desktop", "files").await;
    eyre::ensure!(added.success, "add failed: {}", added.detail);
    let with_files = read_json(&path)?;
    let removed = plane.plane.remove_server("claude-desktop", "files").await;
    eyre::ensure!(removed.success, "remove failed: {}", removed.detail);

    assert!(with_files.pointer("/mcpServers/files").is_some());
    assert_eq!(read_json(&path)?, original);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn removing_a_server_from_the_registry_drops_only_its_entry(plane: PlaneFixture) -> eyre::Result<()> {
    let path = plane.client_path("claude-desktop");
    fs::create_dir_all(plane.root.join("Claude"))?;
    fs::write(&path, r#"{"mcpServers": {"mine": {"command": "/usr/local/bin/mine"}}}"#)?;
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    plane.plane.sync_client("claude-desktop").await;

    plane.registry.remove(&server_id("files")?)?;
    let resynced = plane.plane.sync_client("claude-desktop").await;

    assert!(resynced.success, "{}", resynced.detail);
    assert_eq!(
        read_json(&path)?,
        json!({"mcpServers": {"mine": {"command": "/usr/local/bin/mine"}}})
    );
    let backup = fs::read_to_string(plane.root.join("Claude/claude_desktop_config.json.bak"))?;
    assert!(backup.contains("/opt/files/server"));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn corrupt_file_is_never_overwritten(plane: PlaneFixture) -> eyre::Result<()> {
    let path = plane.client_path("claude-desktop");
    fs::create_dir_all(plane.root.join("Claude"))?;
    fs::write(&path, "{\"mcpServers\": {\"mine\": ")?;
    plane.registry.insert(file_server("files")?, &DefaultClock)?;

    let synced = plane.plane.sync_client("claude-desktop").await;

    assert_eq!(synced.error_kind, Some(ErrorKind::ConfigCorruption));
    assert_eq!(fs::read_to_string(&path)?, "{\"mcpServers\": {\"mine\": ");
    assert!(!plane.root.join("Claude/claude_desktop_config.json.bak").exists());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_syncs_never_expose_a_partial_file(plane: PlaneFixture) -> eyre::Result<()> {
    let path = plane.client_path("claude-desktop");
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    plane.plane.sync_client("claude-desktop").await;

    let done = Arc::new(AtomicBool::new(false));
    let watcher = {
        let done = Arc::clone(&done);
        let path = path.clone();
        tokio::task::spawn_blocking(move || -> eyre::Result<usize> {
            let mut observed = 0_usize;
            while !done.load(Ordering::SeqCst) {
                let text = fs::read_to_string(&path)?;
                serde_json::from_str::<serde_json::Value>(&text)?;
                observed = observed.saturating_add(1);
            }
            Ok(observed)
        })
    };

    let mut syncs = tokio::task::JoinSet::new();
    for index in 0..16 {
        let definition = server_with_tool(&format!("srv-{index}"), "ping", "/opt/srv/server")?;
        plane.registry.insert(definition, &DefaultClock)?;
        let worker = Arc::clone(&plane.plane);
        syncs.spawn(async move { worker.sync_client("claude-desktop").await });
    }
    while let Some(joined) = syncs.join_next().await {
        let result = joined?;
        eyre::ensure!(
            result.success || result.error_kind == Some(ErrorKind::ConcurrentModification),
            "unexpected sync failure: {}",
            result.detail
        );
    }
    done.store(true, Ordering::SeqCst);
    let observed = watcher.await??;

    let settled = plane.plane.sync_client("claude-desktop").await;
    eyre::ensure!(settled.success, "final sync failed: {}", settled.detail);
    let servers = read_json(&path)?;
    assert_eq!(
        servers.get("mcpServers").and_then(serde_json::Value::as_object).map(serde_json::Map::len),
        Some(17)
    );
    assert!(observed > 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restore_backup_reinstates_the_previous_file(plane: PlaneFixture) -> eyre::Result<()> {
    let path = plane.client_path("claude-desktop");
    fs::create_dir_all(plane.root.join("Claude"))?;
    fs::write(&path, "{\"theme\": \"light\"}\n")?;
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    plane.plane.sync_client("claude-desktop").await;

    let restored = plane.plane.restore_backup("claude-desktop").await;

    assert!(restored.success, "{}", restored.detail);
    assert_eq!(fs::read_to_string(&path)?, "{\"theme\": \"light\"}\n");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn add_then_remove_keeps_a_pre_existing_empty_section(plane: PlaneFixture) -> eyre::Result<()> {
    let path = plane.client_path("claude-desktop");
    let original = json!({"theme": "dark", "mcpServers": {}});
    fs::create_dir_all(plane.root.join("Claude"))?;
    fs::write(&path, serde_json::to_string_pretty(&original)?)?;
    plane.registry.insert(file_server("files")?, &DefaultClock)?;

    let added = plane.plane.add_server("claude-desktop", "files").await;
    eyre::ensure!(added.success, "add failed: {}", added.detail);
    let removed = plane.plane.remove_server("claude-desktop", "files").await;
    eyre::ensure!(removed.success, "remove failed: {}", removed.detail);

    assert_eq!(read_json(&path)?, original);
    Ok(())
}
