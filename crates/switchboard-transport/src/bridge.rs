//! WebSocket bridge provider using `tokio-tungstenite`.
//!
//! The bridge is a sidecar process that owns the real chat-network
//! clients. Each account gets its own socket at
//! `{base_url}/sessions/{account_id}`. The bridge pushes JSON
//! [`BridgeFrame`]s; we push JSON [`BridgeCommand`]s back. Liveness is a
//! plain WebSocket ping answered by a pong.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use switchboard_protocol::{
    AccountId, BridgeCommand, BridgeFrame, Codec, DisconnectReason, JsonCodec, TransportEvent,
};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{EventSender, MessageAck, TransportError, TransportProvider, generate_message_id};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for [`WsBridgeProvider`].
#[derive(Debug, Clone)]
pub struct WsBridgeConfig {
    /// Base URL of the bridge, e.g. `ws://127.0.0.1:3100`.
    pub base_url: String,
    /// Upper bound on waiting for a pong.
    pub liveness_timeout: Duration,
}

impl Default for WsBridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:3100".to_string(),
            liveness_timeout: Duration::from_secs(10),
        }
    }
}

/// A [`TransportProvider`] backed by one bridge socket per account.
#[derive(Debug, Clone)]
pub struct WsBridgeProvider {
    config: WsBridgeConfig,
    codec: JsonCodec,
}

impl WsBridgeProvider {
    pub fn new(config: WsBridgeConfig) -> Self {
        Self {
            config,
            codec: JsonCodec,
        }
    }

    fn session_url(&self, account: AccountId) -> String {
        format!(
            "{}/sessions/{}",
            self.config.base_url.trim_end_matches('/'),
            account.0
        )
    }

    async fn send_command(
        &self,
        handle: &WsBridgeHandle,
        command: &BridgeCommand,
    ) -> Result<(), TransportError> {
        if handle.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(format!(
                "bridge socket for {} is closed",
                handle.account
            )));
        }
        let bytes = self.codec.encode(command)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        handle
            .sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

/// Live bridge socket for one account.
///
/// Dropping the handle stops its reader task.
pub struct WsBridgeHandle {
    account: AccountId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    /// Count of pongs seen by the reader task.
    pongs: watch::Receiver<u64>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WsBridgeHandle {
    /// The account this socket serves.
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// `true` once the socket has been closed from either side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for WsBridgeHandle {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl TransportProvider for WsBridgeProvider {
    type Handle = WsBridgeHandle;

    async fn connect(
        &self,
        account: AccountId,
        events: EventSender,
    ) -> Result<WsBridgeHandle, TransportError> {
        let url = self.session_url(account);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{url}: {e}")))?;
        tracing::debug!(%account, %url, "bridge socket connected");

        let (sink, stream) = ws.split();
        let (pong_tx, pong_rx) = watch::channel(0u64);
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            account,
            stream,
            events,
            pong_tx,
            Arc::clone(&closed),
            self.codec,
        ));

        Ok(WsBridgeHandle {
            account,
            sink: Mutex::new(sink),
            pongs: pong_rx,
            closed,
            reader,
        })
    }

    async fn query_liveness(&self, handle: &WsBridgeHandle) -> Result<bool, TransportError> {
        if handle.is_closed() {
            return Ok(false);
        }
        let mut pongs = handle.pongs.clone();
        pongs.borrow_and_update();

        handle
            .sink
            .lock()
            .await
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        match tokio::time::timeout(self.config.liveness_timeout, pongs.changed()).await {
            Ok(Ok(())) => Ok(true),
            // Reader task is gone: the socket closed while we waited.
            Ok(Err(_)) => Ok(false),
            Err(_) => Err(TransportError::Timeout(self.config.liveness_timeout)),
        }
    }

    async fn send_message(
        &self,
        handle: &WsBridgeHandle,
        to: &str,
        body: &str,
    ) -> Result<MessageAck, TransportError> {
        let message_id = generate_message_id();
        self.send_command(
            handle,
            &BridgeCommand::Send {
                id: message_id.clone(),
                to: to.to_string(),
                body: body.to_string(),
            },
        )
        .await?;
        tracing::debug!(account = %handle.account, %message_id, "message handed to bridge");
        Ok(MessageAck {
            message_id,
            to: to.to_string(),
        })
    }

    async fn soft_refresh(&self, handle: &WsBridgeHandle) -> Result<(), TransportError> {
        self.send_command(handle, &BridgeCommand::Refresh).await
    }

    async fn teardown(&self, handle: &WsBridgeHandle) -> Result<(), TransportError> {
        handle.reader.abort();
        let already_closed = handle.closed.swap(true, Ordering::AcqRel);
        if already_closed {
            return Ok(());
        }
        handle
            .sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::ConnectionClosed(e.to_string()))
    }
}

/// Reads frames until the socket closes, forwarding validated events.
///
/// Emits a final `Disconnected(NetworkLoss)` when the socket ends on its
/// own. An aborted reader (teardown) emits nothing.
async fn read_loop(
    account: AccountId,
    mut stream: SplitStream<WsStream>,
    events: EventSender,
    pongs: watch::Sender<u64>,
    closed: Arc<AtomicBool>,
    codec: JsonCodec,
) {
    while let Some(msg) = stream.next().await {
        let data = match msg {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Pong(_)) => {
                pongs.send_modify(|count| *count += 1);
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(%account, error = %e, "bridge socket read failed");
                break;
            }
        };

        let event = match codec
            .decode::<BridgeFrame>(&data)
            .and_then(BridgeFrame::into_event)
        {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%account, error = %e, "dropping undecodable bridge frame");
                continue;
            }
        };

        if events.send(event).await.is_err() {
            // Nobody is listening any more; the session is gone.
            tracing::debug!(%account, "event receiver dropped, stopping reader");
            closed.store(true, Ordering::Release);
            return;
        }
    }

    closed.store(true, Ordering::Release);
    tracing::info!(%account, "bridge socket closed");
    let _ = events
        .send(TransportEvent::Disconnected {
            reason: DisconnectReason::NetworkLoss,
        })
        .await;
}
