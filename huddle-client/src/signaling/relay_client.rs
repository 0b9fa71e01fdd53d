use crate::call::CallHandle;
use crate::config::RelayConfig;
use crate::error::CallError;
use crate::signaling::signaling_output::SignalingOutput;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use huddle_core::{ClientSignal, RelaySignal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn relay_url(base: &str, user: &str) -> String {
    format!("{}/ws/{}", base.trim_end_matches('/'), user)
}

/// Sending half of the relay connection. Refuses to queue while offline.
#[derive(Clone)]
pub struct RelayClient {
    tx: mpsc::UnboundedSender<String>,
    online: Arc<AtomicBool>,
}

/// Owns the socket and reconnects it; feeds everything it receives into the controller.
pub struct RelayLink {
    url: String,
    config: RelayConfig,
    rx: mpsc::UnboundedReceiver<String>,
    online: Arc<AtomicBool>,
}

enum LinkEnd {
    Disconnected,
    ControllerGone,
    ClientDropped,
}

impl RelayClient {
    pub fn new(base_url: &str, user: &str, config: RelayConfig) -> (Self, RelayLink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let online = Arc::new(AtomicBool::new(false));

        let link = RelayLink {
            url: relay_url(base_url, user),
            config,
            rx,
            online: online.clone(),
        };
        (Self { tx, online }, link)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingOutput for RelayClient {
    async fn send(&self, signal: ClientSignal) -> Result<(), CallError> {
        if !self.is_online() {
            return Err(CallError::Transport(format!(
                "{} not sent, relay offline",
                signal.op()
            )));
        }

        let text =
            serde_json::to_string(&signal).map_err(|e| CallError::Transport(e.to_string()))?;
        self.tx
            .send(text)
            .map_err(|_| CallError::Transport("relay link stopped".to_string()))
    }
}

impl RelayLink {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run(mut self, handle: CallHandle) {
        let mut attempt = 0u32;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!("Connected to relay {}", self.url);
                    attempt = 0;
                    self.online.store(true, Ordering::SeqCst);
                    let end = self.pump(stream, &handle).await;
                    self.online.store(false, Ordering::SeqCst);

                    match end {
                        LinkEnd::ControllerGone | LinkEnd::ClientDropped => break,
                        LinkEnd::Disconnected => {
                            warn!("Relay connection lost");
                            if handle.relay_disconnected().await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("Relay connection to {} failed: {}", self.url, e),
            }

            let delay = self.config.backoff(attempt);
            attempt = attempt.saturating_add(1);
            info!("Reconnecting to relay in {:?}", delay);
            tokio::time::sleep(delay).await;
        }

        info!("Relay link stopped");
    }

    async fn pump(&mut self, stream: RelayStream, handle: &CallHandle) -> LinkEnd {
        let (mut ws_write, mut ws_read) = stream.split();

        // Anything queued before this connection was addressed under the old session.
        let mut stale = 0;
        while self.rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Dropped {} messages queued while offline", stale);
        }

        loop {
            tokio::select! {
                out = self.rx.recv() => {
                    let Some(text) = out else {
                        let _ = ws_write.send(Message::Close(None)).await;
                        return LinkEnd::ClientDropped;
                    };
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        warn!("Relay write failed: {}", e);
                        return LinkEnd::Disconnected;
                    }
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<RelaySignal>(&text) {
                                Ok(signal) => {
                                    if handle.relay_signal(signal).await.is_err() {
                                        return LinkEnd::ControllerGone;
                                    }
                                }
                                Err(e) => warn!("Unparseable relay message: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return LinkEnd::Disconnected,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Relay read failed: {}", e);
                            return LinkEnd::Disconnected;
                        }
                    }
                }
            }
        }
    }
}
