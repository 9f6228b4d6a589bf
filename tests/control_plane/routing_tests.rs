//! Tool execution through the control-plane facade.

use super::helpers::{PlaneFixture, file_server, plane};
use crate::test_helpers::{server_id, server_with_tool};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;
use switchyard::error::ErrorKind;
use switchyard::router::domain::{CallOutcome, ToolCallRecord};

async fn outcomes(fixture: &PlaneFixture) -> Vec<CallOutcome> {
    fixture
        .plane
        .call_history(usize::MAX)
        .await
        .value
        .unwrap_or_default()
        .iter()
        .map(ToolCallRecord::outcome)
        .collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn running_server_answers_a_parameterless_tool(plane: PlaneFixture) -> eyre::Result<()> {
    plane
        .registry
        .insert(server_with_tool("srv-1", "ping", "/opt/srv-1/server")?, &DefaultClock)?;
    let started = plane.plane.start("srv-1").await;
    eyre::ensure!(started.success, "start failed: {}", started.detail);

    let called = plane.plane.execute("srv-1", "ping", json!({})).await;

    assert!(called.success, "{}", called.detail);
    assert_eq!(called.value.map(|result| result.outcome), Some(CallOutcome::Success));
    assert_eq!(outcomes(&plane).await, [CallOutcome::Success]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_server_is_not_ready_and_never_spawned(plane: PlaneFixture) -> eyre::Result<()> {
    plane.registry.insert(file_server("files")?, &DefaultClock)?;

    let called = plane
        .plane
        .execute("files", "read_file", json!({"path": "/srv/a.txt"}))
        .await;

    assert_eq!(called.error_kind, Some(ErrorKind::ServerNotReady));
    assert_eq!(plane.host.spawn_count(), 0);
    assert!(plane.transport.sent().is_empty());
    Ok(())
}

#[rstest]
#[case::missing_required(json!({"limit": 5}), &["path"])]
#[case::every_violation(
    json!({"path": "", "limit": 0, "encoding": "ebcdic", "mode": "fast"}),
    &["path", "limit", "encoding", "mode"]
)]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_parameters_are_rejected_before_dispatch(
    plane: PlaneFixture,
    #[case] parameters: serde_json::Value,
    #[case] fields: &[&str],
) -> eyre::Result<()> {
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    plane.plane.start("files").await;

    let called = plane.plane.execute("files", "read_file", parameters).await;

    assert_eq!(called.error_kind, Some(ErrorKind::ValidationError));
    for field in fields {
        assert!(called.detail.contains(field), "{field} missing from: {}", called.detail);
    }
    assert!(plane.transport.sent().is_empty());
    assert_eq!(outcomes(&plane).await, [CallOutcome::ValidationError]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_failure_is_a_completed_call(plane: PlaneFixture) -> eyre::Result<()> {
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    plane.plane.start("files").await;
    plane
        .transport
        .fail_tool(&server_id("files")?, "read_file", "no such file");

    let called = plane
        .plane
        .execute("files", "read_file", json!({"path": "/srv/missing.txt"}))
        .await;

    assert!(called.success);
    assert_eq!(called.value.map(|result| result.outcome), Some(CallOutcome::ToolFailure));
    assert_eq!(outcomes(&plane).await, [CallOutcome::ToolFailure]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_tool_is_recorded_as_rejected(plane: PlaneFixture) -> eyre::Result<()> {
    plane.registry.insert(file_server("files")?, &DefaultClock)?;
    plane.plane.start("files").await;

    let called = plane.plane.execute("files", "write_file", json!({})).await;

    assert_eq!(called.error_kind, Some(ErrorKind::UnknownTool));
    assert_eq!(outcomes(&plane).await, [CallOutcome::Rejected]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_server_id_is_still_recorded(plane: PlaneFixture) -> eyre::Result<()> {
    let called = plane.plane.execute("srv 1", "ping", json!({})).await;

    assert_eq!(called.error_kind, Some(ErrorKind::UnknownServer));
    let records = plane.plane.call_history(usize::MAX).await.value.unwrap_or_default();
    let [record] = records.as_slice() else {
        return Err(eyre::eyre!("expected one record, found {}", records.len()));
    };
    assert_eq!(record.outcome(), CallOutcome::Rejected);
    assert_eq!(record.server_id(), "srv 1");
    assert_eq!(plane.host.spawn_count(), 0);
    Ok(())
}
