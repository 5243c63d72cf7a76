//! WebSocket socket transport
//!
//! Each session runs in its own task: it connects, reports `Opened`, then
//! forwards outbound frames from its handle and inbound text frames to the
//! session sink until either side closes. Frames are JSON objects in both
//! directions.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use medlink_chat::{
    ChatError, InboundFrame, OutboundFrame, Result, SessionKey, SessionSink, SocketHandle,
    SocketTransport,
};

use crate::config::RemoteConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket transport over tokio-tungstenite
pub struct WebSocketTransport {
    config: RemoteConfig,
}

impl WebSocketTransport {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn request_for(&self, key: &SessionKey) -> Result<Request> {
        let url = self.config.socket_url_for(key)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        if let Some(token) = &self.config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ChatError::Validation(format!("invalid token: {}", e)))?;
            request.headers_mut().insert("Authorization", value);
        }
        Ok(request)
    }
}

impl SocketTransport for WebSocketTransport {
    fn open(&self, key: &SessionKey, sink: SessionSink) -> Result<Box<dyn SocketHandle>> {
        let request = self.request_for(key)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::Transport(format!("no async runtime: {}", e)))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let task = runtime.spawn(run_session(request, sink, outbound_rx, connected.clone()));

        Ok(Box::new(WebSocketHandle {
            outbound: Some(outbound_tx),
            connected,
            task,
        }))
    }
}

/// Handle to one session task
pub struct WebSocketHandle {
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SocketHandle for WebSocketHandle {
    fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| ChatError::Transport("session closed".to_string()))?;
        outbound
            .send(frame)
            .map_err(|_| ChatError::Transport("session task ended".to_string()))
    }

    fn close(&mut self) {
        // dropping the sender lets a connected task send a close frame
        self.outbound.take();
        if !self.connected.load(Ordering::SeqCst) {
            self.task.abort();
        }
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_session(
    request: Request,
    sink: SessionSink,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    connected: Arc<AtomicBool>,
) {
    let key = sink.key().clone();
    let ws = match connect_async(request).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("Socket {} failed to connect: {}", key, e);
            sink.error(e.to_string());
            return;
        }
    };
    connected.store(true, Ordering::SeqCst);
    info!("Socket {} connected", key);
    sink.opened();

    pump(ws, &sink, outbound).await;
    debug!("Socket {} task finished", key);
}

/// Shuttle frames until the handle is closed or the remote goes away
async fn pump(
    ws: WsStream,
    sink: &SessionSink,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Could not encode outbound frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    sink.error(e.to_string());
                    break;
                }
            }
            message = ws_rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundFrame>(text.as_str()) {
                            Ok(frame) => {
                                if !sink.frame(frame) {
                                    break;
                                }
                            }
                            Err(e) => warn!("Dropping malformed socket frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        sink.closed();
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        sink.error(e.to_string());
                        break;
                    }
                }
            }
        }
    }
}
