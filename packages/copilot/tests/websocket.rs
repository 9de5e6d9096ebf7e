//! End-to-end runs of the panel against a real local WebSocket server.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

use copilot::config::PanelConfig;
use copilot::connection::{BackoffPolicy, Endpoint, Status, WsTransport};
use copilot::host_bridge::HostBridge;
use copilot::panel::{Frontend, Panel, PanelEvent, PanelHandle, PanelView};
use copilot::plain::spawn_line_reader;
use copilot::transcript::Origin;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct Recorder {
    entries: Arc<Mutex<Vec<(Origin, String)>>>,
}

impl Recorder {
    fn entries(&self) -> Vec<(Origin, String)> {
        self.entries.lock().unwrap().clone()
    }

    async fn wait_for_entries(&self, n: usize) -> Vec<(Origin, String)> {
        timeout(TEST_TIMEOUT, async {
            loop {
                let entries = self.entries();
                if entries.len() >= n {
                    return entries;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for transcript entries")
    }
}

impl Frontend for Recorder {
    fn draw(&mut self, view: &PanelView<'_>) -> io::Result<()> {
        *self.entries.lock().unwrap() = view
            .transcript
            .entries()
            .iter()
            .map(|e| (e.origin, e.source.clone()))
            .collect();
        Ok(())
    }
}

fn config_for(port: u16) -> PanelConfig {
    PanelConfig {
        endpoint: Endpoint::new("127.0.0.1", port),
        backoff: BackoffPolicy {
            step: Duration::from_millis(50),
            max: Duration::from_millis(200),
            reset_on_open: true,
        },
        ..Default::default()
    }
}

fn start_panel(config: &PanelConfig) -> (PanelHandle, Recorder, tokio::task::JoinHandle<io::Result<()>>) {
    let panel = Panel::new(config, HostBridge::detached(), WsTransport::new);
    let handle = panel.handle();
    let recorder = Recorder::default();
    let mut frontend = recorder.clone();
    let task = tokio::spawn(async move { panel.run(&mut frontend).await });
    (handle, recorder, task)
}

async fn wait_connected(handle: &PanelHandle) {
    let mut status = handle.status();
    timeout(TEST_TIMEOUT, status.wait_for(|s| s.is_connected()))
        .await
        .expect("timed out waiting for connection")
        .expect("panel stopped");
}

#[tokio::test]
async fn greets_echoes_and_renders_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text("**welcome**")).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                ws.send(Message::text(format!("echo: {}", text.as_str())))
                    .await
                    .unwrap();
            }
        }
    });

    let (handle, recorder, task) = start_panel(&config_for(port));
    wait_connected(&handle).await;
    recorder.wait_for_entries(1).await;

    handle.post(PanelEvent::Line("ping `code`".into()));
    let entries = recorder.wait_for_entries(3).await;
    assert_eq!(
        entries,
        vec![
            (Origin::Inbound, "**welcome**".to_string()),
            (Origin::Echo, "ping `code`".to_string()),
            (Origin::Inbound, "echo: ping `code`".to_string()),
        ]
    );

    handle.quit();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn host_text_reaches_server_without_echo() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (got_tx, mut got_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = got_tx.send(text.as_str().to_owned());
            }
        }
    });

    let (handle, recorder, task) = start_panel(&config_for(port));
    wait_connected(&handle).await;
    assert!(handle.send_text("fn main() {}\n"));

    let received = timeout(TEST_TIMEOUT, got_rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, "fn main() {}\n");
    assert!(recorder.entries().is_empty());

    handle.quit();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn reconnects_after_server_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));

    let accepted_server = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let n = accepted_server.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let _ = ws.send(Message::text(format!("hello {n}"))).await;
                let _ = ws.close(None).await;
            });
        }
    });

    let (handle, recorder, task) = start_panel(&config_for(port));

    let entries = recorder.wait_for_entries(3).await;
    assert!(accepted.load(Ordering::SeqCst) >= 3);
    assert_eq!(entries[0], (Origin::Inbound, "hello 1".to_string()));
    assert_eq!(entries[1], (Origin::Inbound, "hello 2".to_string()));

    handle.quit();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(*handle.status().borrow(), Status::Disconnected);
}

#[tokio::test]
async fn unreachable_server_keeps_retrying() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (handle, _recorder, task) = start_panel(&config_for(port));
    sleep(Duration::from_millis(400)).await;
    assert!(!handle.status().borrow().is_connected());
    assert!(!task.is_finished());

    handle.quit();
    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn piped_lines_wait_for_the_server_then_quit() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (got_tx, mut got_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        // Accept late so the whole input is read before the connection opens.
        sleep(Duration::from_millis(200)).await;
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = got_tx.send(text.as_str().to_owned());
            }
        }
    });

    let (handle, recorder, task) = start_panel(&config_for(port));
    let reader = spawn_line_reader(io::Cursor::new(b"hi\nthere\n".to_vec()), handle.clone());

    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap().unwrap();
    tokio::task::spawn_blocking(move || reader.join().unwrap())
        .await
        .unwrap();

    let first = timeout(TEST_TIMEOUT, got_rx.recv()).await.unwrap().unwrap();
    let second = timeout(TEST_TIMEOUT, got_rx.recv()).await.unwrap().unwrap();
    assert_eq!([first, second], ["hi", "there"]);
    assert_eq!(
        recorder.entries(),
        vec![
            (Origin::Echo, "hi".to_string()),
            (Origin::Echo, "there".to_string()),
        ]
    );
}
