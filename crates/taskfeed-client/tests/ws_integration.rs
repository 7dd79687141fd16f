//! End-to-end runs against a local tungstenite server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use taskfeed_client::{store_handlers, ConnectionManager, ManagerConfig, WsConnector};
use taskfeed_core::{ConnectionState, FeedError, TaskId, TaskStatus};
use taskfeed_store::{StoreConfig, StoreEvent, TaskProgressStore};

const WAIT: Duration = Duration::from_secs(10);

fn manager_config(addr: SocketAddr) -> ManagerConfig {
    ManagerConfig {
        base_url: format!("http://{addr}/api"),
        max_reconnect_attempts: 2,
        reconnect_delay: Duration::from_millis(50),
        close_grace: Duration::from_millis(50),
        auto_connect: true,
    }
}

fn store() -> TaskProgressStore {
    TaskProgressStore::new(StoreConfig {
        hide_panel_delay: Duration::from_secs(60),
        clear_active_delay: Duration::from_secs(60),
    })
}

/// Serve one connection per entry in `scripts`, sending its frames in order
/// and then holding the socket until the client goes away. Reports the
/// request path of each accepted connection.
async fn serve(scripts: Vec<Vec<String>>) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (paths_tx, paths_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for frames in scripts {
            let (stream, _) = listener.accept().await.unwrap();
            let paths_tx = paths_tx.clone();
            let callback =
                move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = paths_tx.send(req.uri().path().to_string());
                    Ok(resp)
                };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            tokio::spawn(async move {
                for frame in frames {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    (addr, paths_rx)
}

async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<StoreEvent>,
    pred: impl Fn(&StoreEvent) -> bool,
) -> StoreEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn streamed_task_completes_in_store() {
    let frames = vec![
        r#"{"type":"connected"}"#.to_string(),
        r#"{"type":"progress","status":"downloading","progress":25,"progress_message":"fetching","downloaded_count":250,"estimated_total":1000}"#.to_string(),
        r#"{"type":"progress","status":"downloading","progress":75,"progress_message":"fetching","downloaded_count":750,"estimated_total":1000}"#.to_string(),
        r#"{"type":"complete","downloaded_count":1000}"#.to_string(),
    ];
    let (addr, mut paths) = serve(vec![frames]).await;

    let store = store();
    let id = TaskId::new("job 7");
    store.start_download(id.clone(), "AAPL_1d.csv");
    let mut events = store.subscribe();

    let manager = ConnectionManager::with_websocket(manager_config(addr))
        .with_handlers(store_handlers(store.clone(), id.clone()));
    manager.bind(Some(id.clone()), false);

    let path = timeout(WAIT, paths.recv()).await.unwrap().unwrap();
    assert_eq!(path, "/ws/data/job%207");

    wait_for_event(&mut events, |e| matches!(e, StoreEvent::Completed(_))).await;
    let task = store.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
    assert_eq!(task.downloaded_count, 1000);

    let mut state = manager.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn dropped_connections_exhaust_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            // Complete the handshake, then vanish without a close frame.
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                drop(ws);
            }
        }
    });

    let store = store();
    let id = TaskId::new("flaky");
    store.start_download(id.clone(), "f.csv");
    let mut events = store.subscribe();

    let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    let handlers = store_handlers(store.clone(), id.clone()).and_then(
        taskfeed_client::ProgressHandlers::new().on_error(move |e| seen.lock().push(e.clone())),
    );
    let manager = ConnectionManager::new(manager_config(addr), Arc::new(WsConnector::default()))
        .with_handlers(handlers);
    manager.bind(Some(id.clone()), false);

    let event = wait_for_event(&mut events, |e| matches!(e, StoreEvent::Failed { .. })).await;
    assert_eq!(
        event,
        StoreEvent::Failed {
            task_id: id.clone(),
            error: "Max reconnection attempts (2) reached".into(),
        }
    );
    assert_eq!(manager.state(), ConnectionState::Error);
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
    assert_eq!(
        *errors.lock(),
        vec![FeedError::ReconnectExhausted { attempts: 2 }]
    );
}

#[tokio::test]
async fn error_frame_fails_task() {
    let frames = vec![
        r#"{"type":"connected"}"#.to_string(),
        r#"{"type":"error","error":"symbol not found"}"#.to_string(),
    ];
    let (addr, _paths) = serve(vec![frames]).await;

    let store = store();
    let id = TaskId::new("bad-symbol");
    store.start_download(id.clone(), "ZZZZ.csv");
    let mut events = store.subscribe();

    let manager = ConnectionManager::with_websocket(manager_config(addr))
        .with_handlers(store_handlers(store.clone(), id.clone()));
    manager.bind(Some(id.clone()), false);

    wait_for_event(&mut events, |e| matches!(e, StoreEvent::Failed { .. })).await;
    let task = store.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("symbol not found"));

    let mut state = manager.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Error))
        .await
        .unwrap()
        .unwrap();
}
