//! Outbound WebSocket connection lifecycle
//!
//! A [`ConnectionManager`] owns one background I/O task holding the socket.
//! The streaming loop hands it payloads through a bounded queue, so a slow
//! network never stalls a tick; anything that cannot be queued is dropped and
//! counted. Connectivity transitions are published as [`ConnectionEvent`]s.

use crate::types::{ConnectionEvent, ConnectionState, DisconnectReason, StreamSettings};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

/// WebSocket status code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Where connectivity events are delivered
pub type EventSink = mpsc::UnboundedSender<ConnectionEvent>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Command {
    Send(String),
    Close(CloseFrame<'static>),
}

/// State shared between the manager handle and its I/O task
struct Link {
    state: watch::Sender<ConnectionState>,
    events: EventSink,
    dropped: AtomicU64,
    sent: AtomicU64,
    close_timeout: Duration,
}

impl Link {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn record_drop(&self, why: &str) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(why, dropped, "Dropped outbound frame");
    }

    /// Move to Disconnected and notify, at most once per connection
    fn finish(&self, reason: DisconnectReason) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnected;
                true
            }
        });

        if changed {
            info!(%reason, "Disconnected");
            let _ = self.events.send(ConnectionEvent::Disconnected(reason));
        }
    }
}

/// Handle to one persistent outbound connection
///
/// Created already connecting. Dropping the handle without calling
/// [`close`](Self::close) still closes the socket with a normal closure, in
/// the background.
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    link: Arc<Link>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start connecting to `address` in the background
    ///
    /// Never fails: an unreachable or malformed address is reported as
    /// `Disconnected(ConnectFailed)` on `events`. Must be called from within a
    /// tokio runtime.
    ///
    /// # Arguments
    /// * `address` - WebSocket URL, `ws://` or `wss://`
    /// * `settings` - Queue capacity and close timeout
    /// * `events` - Receives `Connected` / `Disconnected` notifications
    pub fn connect(address: &str, settings: &StreamSettings, events: EventSink) -> Self {
        let (commands, receiver) = mpsc::channel(
            settings
                .send_queue_capacity
                .clamp(1, StreamSettings::MAX_SEND_QUEUE_CAPACITY),
        );
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let link = Arc::new(Link {
            state,
            events,
            dropped: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            close_timeout: settings.close_timeout,
        });

        debug!(address, "Connecting");
        let task = tokio::spawn(run_link(address.to_owned(), receiver, Arc::clone(&link)));

        Self {
            commands,
            link,
            task: Some(task),
        }
    }

    /// Queue a text frame for transmission
    ///
    /// Best-effort and non-blocking. Returns `false` when the frame was
    /// dropped: not connected, queue full, or the connection already ended.
    pub fn send(&self, payload: String) -> bool {
        if self.state() != ConnectionState::Connected {
            self.link.record_drop("not connected");
            return false;
        }

        match self.commands.try_send(Command::Send(payload)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.link.record_drop("send queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.link.record_drop("connection task ended");
                false
            }
        }
    }

    /// Close gracefully and wait for the connection to end
    ///
    /// Sends a close frame with `code` and `reason`, then waits for the peer's
    /// confirmation up to the configured close timeout. Idempotent.
    pub async fn close(&mut self, code: u16, reason: &str) {
        let Some(mut task) = self.task.take() else {
            return;
        };

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_owned()),
        };

        // The queue may hold frames ahead of the close; allow for draining them.
        let grace = self.link.close_timeout.saturating_mul(2);
        let commands = &self.commands;
        let finished = tokio::time::timeout(grace, async {
            let _ = commands.send(Command::Close(frame)).await;
            let _ = (&mut task).await;
        })
        .await;

        if finished.is_err() {
            warn!(?grace, "Connection task did not finish closing, aborting it");
            task.abort();
        }

        self.link.finish(DisconnectReason::Closed);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.link.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.link.state.subscribe()
    }

    /// Frames dropped since the connection was created
    pub fn dropped_sends(&self) -> u64 {
        self.link.dropped.load(Ordering::Relaxed)
    }

    /// Frames written to the socket
    pub fn frames_sent(&self) -> u64 {
        self.link.sent.load(Ordering::Relaxed)
    }
}

fn normal_closure() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: Cow::Borrowed(""),
    }
}

/// Discard queued sends until a close is requested or the handle is dropped
async fn wait_for_close(commands: &mut mpsc::Receiver<Command>, link: &Link) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Send(_) => link.record_drop("not connected"),
            Command::Close(_) => return,
        }
    }
}

async fn run_link(address: String, mut commands: mpsc::Receiver<Command>, link: Arc<Link>) {
    let mut socket = tokio::select! {
        result = connect_async(address.as_str()) => match result {
            Ok((socket, _response)) => socket,
            Err(e) => {
                warn!(address = %address, error = %e, "WebSocket connect failed");
                link.finish(DisconnectReason::ConnectFailed(e.to_string()));
                return;
            }
        },
        _ = wait_for_close(&mut commands, &link) => {
            debug!(address = %address, "Closed before the connection was established");
            link.finish(DisconnectReason::Closed);
            return;
        }
    };

    link.set_state(ConnectionState::Connected);
    info!(address = %address, "Connected");
    let _ = link.events.send(ConnectionEvent::Connected);

    let mut peer_closed = false;
    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => {
                    match socket.send(Message::text(payload)).await {
                        Ok(()) => {
                            link.sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            trace!(error = %e, "Socket write failed");
                            link.record_drop("socket write failed");
                        }
                    }
                }
                Some(Command::Close(frame)) => break close_handshake(&mut socket, frame, &link).await,
                None => break close_handshake(&mut socket, normal_closure(), &link).await,
            },
            inbound = socket.next() => match inbound {
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer sent close frame");
                    peer_closed = true;
                    link.set_state(ConnectionState::Closing);
                }
                Some(Ok(_)) => trace!("Ignoring inbound frame"),
                Some(Err(e)) if !peer_closed => break DisconnectReason::Lost(e.to_string()),
                Some(Err(_)) => break DisconnectReason::ClosedByPeer,
                None if peer_closed => break DisconnectReason::ClosedByPeer,
                None => break DisconnectReason::Lost("stream ended without close frame".into()),
            },
        }
    };

    link.finish(reason);
}

/// Send our close frame and wait for the peer to confirm
async fn close_handshake(
    socket: &mut Socket,
    frame: CloseFrame<'static>,
    link: &Link,
) -> DisconnectReason {
    link.set_state(ConnectionState::Closing);
    debug!(code = u16::from(frame.code), reason = %frame.reason, "Closing connection");

    if let Err(e) = socket.close(Some(frame)).await {
        debug!(error = %e, "Close frame not delivered");
        return DisconnectReason::Closed;
    }

    let confirmed = tokio::time::timeout(link.close_timeout, async {
        while let Some(message) = socket.next().await {
            if message.is_err() {
                break;
            }
        }
    })
    .await;

    if confirmed.is_err() {
        warn!(timeout = ?link.close_timeout, "Peer did not confirm close");
    }

    DisconnectReason::Closed
}
