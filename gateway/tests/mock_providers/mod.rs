//! Mock speech service for integration tests
//!
//! A local WebSocket server speaking the OpenAI Realtime event protocol.
//! Each accepted connection is greeted with `session.created`, records every
//! client event, and replies according to a [`MockScript`].

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// How the mock answers a connection.
#[derive(Clone, Debug, Default)]
pub struct MockScript {
    /// Events sent once the client's `session.update` arrives
    pub after_session_update: Vec<Value>,
    /// Events sent after every `input_audio_buffer.append`
    pub after_append: Vec<Value>,
    /// Drop the TCP connection without a close frame after the
    /// `session.update` events are sent
    pub drop_after_session_update: bool,
}

/// Upgrade request details captured during the handshake.
#[derive(Clone, Debug, Default)]
pub struct CapturedRequest {
    pub uri: String,
    pub authorization: Option<String>,
    pub beta: Option<String>,
}

/// Handle to a running mock server.
pub struct MockRealtimeServer {
    pub addr: SocketAddr,
    /// Every JSON event received from clients, in order
    pub received: mpsc::UnboundedReceiver<Value>,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
    pub connection_count: Arc<AtomicU64>,
    task: tokio::task::JoinHandle<()>,
}

impl MockRealtimeServer {
    /// Bind to an ephemeral port and serve `script` to every connection.
    pub async fn start(script: MockScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connection_count = Arc::new(AtomicU64::new(0));

        let task = {
            let requests = requests.clone();
            let connection_count = connection_count.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let conn_id = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                    let script = script.clone();
                    let received_tx = received_tx.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, conn_id, script, received_tx, requests).await
                        {
                            eprintln!("Mock realtime connection error: {}", e);
                        }
                    });
                }
            })
        };

        Self {
            addr,
            received,
            requests,
            connection_count,
            task,
        }
    }

    /// WebSocket URL of the server.
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// Next event received from a client, with a timeout.
    pub async fn next_event(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("mock server stopped")
    }

    /// Next received event of the given type, skipping others.
    pub async fn next_event_of(&mut self, event_type: &str) -> Value {
        loop {
            let event = self.next_event().await;
            if event["type"] == event_type {
                return event;
            }
        }
    }

    pub fn connections(&self) -> u64 {
        self.connection_count.load(Ordering::SeqCst)
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    script: MockScript,
    received_tx: mpsc::UnboundedSender<Value>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let capture = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        requests.lock().unwrap().push(CapturedRequest {
            uri: request.uri().to_string(),
            authorization: header("authorization"),
            beta: header("openai-beta"),
        });
        Ok(response)
    };
    let ws_stream = accept_hdr_async(stream, capture).await?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(session_created(&format!("sess_mock_{conn_id}")).to_string().into()))
        .await?;

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(event) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let event_type = event["type"].as_str().unwrap_or_default().to_string();
                let _ = received_tx.send(event);

                match event_type.as_str() {
                    "session.update" => {
                        for reply in &script.after_session_update {
                            write.send(Message::Text(reply.to_string().into())).await?;
                        }
                        if script.drop_after_session_update {
                            // Dropping both halves resets the TCP stream without a close frame
                            return Ok(());
                        }
                    }
                    "input_audio_buffer.append" => {
                        for reply in &script.after_append {
                            write.send(Message::Text(reply.to_string().into())).await?;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Mock realtime WebSocket error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

// =============================================================================
// Server event builders
// =============================================================================

pub fn session_created(id: &str) -> Value {
    json!({
        "type": "session.created",
        "event_id": "evt_created",
        "session": { "id": id, "model": "gpt-4o-realtime-preview" }
    })
}

pub fn audio_delta(pcm: &[u8]) -> Value {
    json!({
        "type": "response.audio.delta",
        "response_id": "resp_1",
        "item_id": "item_1",
        "delta": BASE64_STANDARD.encode(pcm)
    })
}

pub fn audio_done() -> Value {
    json!({ "type": "response.audio.done", "response_id": "resp_1", "item_id": "item_1" })
}

pub fn transcript_done(text: &str) -> Value {
    json!({
        "type": "response.audio_transcript.done",
        "item_id": "item_1",
        "transcript": text
    })
}

pub fn server_error(code: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "event_id": "evt_error",
        "error": { "type": "invalid_request_error", "code": code, "message": message }
    })
}

/// An event type the bridge does not act on.
pub fn rate_limits_updated() -> Value {
    json!({ "type": "rate_limits.updated", "rate_limits": [] })
}

/// Little-endian PCM bytes with a recognisable ramp pattern.
pub fn ramp_pcm(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
