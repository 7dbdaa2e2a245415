use std::time::Duration;

use ordersync_core::{FieldValue, Role, Row, RowId};
use ordersync_engine::{EditError, EditOutcome, EngineConfig, EngineError, MutationRequest};
use ordersync_harness::{TestClient, order_row, settle};
use tokio::task::JoinHandle;

fn dataset() -> Vec<Row> {
    vec![
        order_row(Some(1), "P-300", "defensa"),
        order_row(Some(2), "P-300", "cofre").with_field("CHOFER", "Ana".into()),
    ]
}

/// Start an edit in the background and let it reach its scheduled write.
async fn spawn_edit(
    client: &TestClient,
    id: i64,
    field: &str,
    value: &str,
) -> Result<JoinHandle<Result<EditOutcome, EngineError>>, Box<dyn std::error::Error>> {
    let engine = client.engine.clone();
    let request = client.request(id, field, value)?;
    let handle = tokio::spawn(async move { engine.submit_edit(request).await });
    settle().await;
    Ok(handle)
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn typing_burst_sends_one_write() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());

    let first = spawn_edit(&client, 1, "CODIGO", "A").await?;
    tokio::time::advance(Duration::from_millis(100)).await;
    let second = spawn_edit(&client, 1, "CODIGO", "AB").await?;
    tokio::time::advance(Duration::from_millis(100)).await;
    let third = spawn_edit(&client, 1, "CODIGO", "ABC").await?;

    // Every keystroke shows immediately; nothing has been sent yet.
    assert_eq!(client.value(1, "CODIGO")?, FieldValue::from("ABC"));
    assert_eq!(client.remote.call_count(), 0);
    assert_eq!(client.engine.pending_writes(), 1);

    assert_eq!(first.await??, EditOutcome::Superseded);
    assert_eq!(second.await??, EditOutcome::Superseded);
    assert_eq!(
        third.await??,
        EditOutcome::Committed {
            applied: "ABC".into(),
            network: true
        }
    );
    assert_eq!(
        client.remote.requests(),
        vec![MutationRequest {
            id: RowId::new(1),
            field: "CODIGO".into(),
            value: "ABC".into(),
        }]
    );
    assert_eq!(client.engine.pending_writes(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn write_waits_for_quiet_period() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let handle = spawn_edit(&client, 1, "CODIGO", "X1").await?;

    tokio::time::advance(Duration::from_millis(399)).await;
    settle().await;
    assert_eq!(client.remote.call_count(), 0);

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(client.remote.call_count(), 1);
    assert!(handle.await??.is_success());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cells_debounce_independently() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let codigo = spawn_edit(&client, 1, "CODIGO", "C-1").await?;
    let chofer = spawn_edit(&client, 1, "CHOFER", "Beto").await?;
    let other_row = spawn_edit(&client, 2, "CODIGO", "C-2").await?;
    assert_eq!(client.engine.pending_writes(), 3);

    assert!(codigo.await??.is_success());
    assert!(chofer.await??.is_success());
    assert!(other_row.await??.is_success());
    assert_eq!(client.remote.call_count(), 3);
    assert_eq!(client.engine.undo_depth(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn configured_delay_is_used() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_toml_str("debounce_ms = 50")?;
    let client = TestClient::with_config(Role::Supervisor, dataset(), config);
    let handle = spawn_edit(&client, 1, "CODIGO", "Z").await?;

    tokio::time::advance(Duration::from_millis(50)).await;
    settle().await;
    assert_eq!(client.remote.call_count(), 1);
    assert!(handle.await??.is_success());
    Ok(())
}

// ============================================================================
// Flush and cancel
// ============================================================================

#[tokio::test(start_paused = true)]
async fn flush_sends_pending_write_now() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let handle = spawn_edit(&client, 1, "CODIGO", "BLUR").await?;

    assert!(client.engine.flush(RowId::new(1), "CODIGO").await);
    assert_eq!(client.remote.call_count(), 1);
    assert!(handle.await??.is_success());

    // Nothing left to flush.
    assert!(!client.engine.flush(RowId::new(1), "CODIGO").await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn flush_all_drains_every_cell() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let a = spawn_edit(&client, 1, "CODIGO", "A").await?;
    let b = spawn_edit(&client, 2, "COSTO", "120").await?;

    assert_eq!(client.engine.flush_all().await, 2);
    assert_eq!(client.remote.call_count(), 2);
    assert_eq!(client.engine.pending_writes(), 0);
    assert!(a.await??.is_success());
    assert!(b.await??.is_success());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_restores_value_from_before_burst() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let first = spawn_edit(&client, 2, "CHOFER", "Anab").await?;
    let second = spawn_edit(&client, 2, "CHOFER", "Anabel").await?;

    assert!(client.engine.cancel(RowId::new(2), "CHOFER"));
    assert_eq!(first.await??, EditOutcome::Superseded);
    assert_eq!(
        second.await??,
        EditOutcome::RolledBack {
            error: EditError::Cancelled {
                field: "CHOFER".into()
            },
            restored: "Ana".into(),
        }
    );
    assert_eq!(client.value(2, "CHOFER")?, FieldValue::from("Ana"));
    assert_eq!(client.remote.call_count(), 0);
    assert!(!client.engine.cancel(RowId::new(2), "CHOFER"));
    Ok(())
}

// ============================================================================
// History
// ============================================================================

#[tokio::test(start_paused = true)]
async fn burst_records_single_undo_entry() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let first = spawn_edit(&client, 2, "CHOFER", "Luis").await?;
    let second = spawn_edit(&client, 2, "CHOFER", "Luisa").await?;
    first.await??;
    assert!(second.await??.is_success());
    assert_eq!(client.engine.undo_depth(), 1);

    client.engine.undo().await?;
    assert_eq!(client.value(2, "CHOFER")?, FieldValue::from("Ana"));
    assert_eq!(client.engine.undo_depth(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_burst_starts_from_committed_value() -> Result<(), Box<dyn std::error::Error>> {
    let client = TestClient::supervisor(dataset());
    let first = spawn_edit(&client, 2, "CHOFER", "Luis").await?;
    assert!(first.await??.is_success());
    let second = spawn_edit(&client, 2, "CHOFER", "Pedro").await?;
    assert!(second.await??.is_success());
    assert_eq!(client.engine.undo_depth(), 2);

    client.engine.undo().await?;
    assert_eq!(client.value(2, "CHOFER")?, FieldValue::from("Luis"));
    Ok(())
}
