//! In-process WebSocket room server for integration tests.
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
    WebSocketStream,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Peer {
    pub path: String,
    pub ws: WebSocketStream<TcpStream>,
}

impl Peer {
    /// Next text frame as JSON, skipping control frames
    pub async fn next_json(&mut self) -> Value {
        loop {
            let frame = timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection ended")
                .expect("websocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).expect("client sent invalid json");
            }
        }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    /// Resolves once the client closed its side
    pub async fn closed(&mut self) {
        timeout(WAIT, async {
            while let Some(Ok(frame)) = self.ws.next().await {
                if matches!(frame, Message::Close(_)) {
                    break;
                }
            }
        })
        .await
        .expect("client never closed the connection");
    }
}

pub struct TestServer {
    pub url: String,
    pub peers: mpsc::UnboundedReceiver<Peer>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, peers) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let path = Arc::new(Mutex::new(String::new()));
                    let seen = Arc::clone(&path);
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        *seen.lock() = req.uri().path().to_string();
                        Ok(resp)
                    };
                    if let Ok(ws) = accept_hdr_async(stream, callback).await {
                        let path = path.lock().clone();
                        let _ = tx.send(Peer { path, ws });
                    }
                });
            }
        });
        Self {
            url: format!("ws://{addr}/ws"),
            peers,
        }
    }

    pub async fn accept(&mut self) -> Peer {
        timeout(WAIT, self.peers.recv())
            .await
            .expect("client never connected")
            .expect("server stopped")
    }
}
