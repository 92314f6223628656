use super::frame::{Frame, Opcode};
use super::room::RoomIndex;
use super::{WsConnectionHandle, WsHandlerFn, WsMessage, WsOptions};
use crate::Request;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// A single upgraded WebSocket connection. Exactly one task owns the read
/// half (enforced by construction: only
/// [`run`] ever calls `Frame::read_masked`); writes may originate from any
/// task holding this `Arc` but are serialized through `sender`, a
/// per-connection `mpsc` channel drained by a single writer task.
pub(crate) struct WsConnection {
    pub(crate) id: Uuid,
    pub(crate) url: String,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    rooms: Mutex<HashSet<Box<str>>>,
    sender: mpsc::UnboundedSender<Frame>,
}

impl WsConnection {
    pub(crate) fn rooms(&self) -> std::sync::MutexGuard<'_, HashSet<Box<str>>> {
        self.rooms.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::SeqCst)
    }

    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.sender.send(Frame::text(text));
    }

    pub(crate) fn send_binary(&self, payload: Vec<u8>) {
        let _ = self.sender.send(Frame::binary(payload));
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.sender.send(Frame::close(code, reason));
    }

    #[cfg(test)]
    pub(crate) fn for_test(url: &str) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        WsConnection {
            id: Uuid::new_v4(),
            url: url.to_owned(),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            rooms: Mutex::new(HashSet::new()),
            sender: tx,
        }
    }
}

/// Runs one connection's duplex loop to completion: a reader that decodes
/// masked client frames and forwards text/binary payloads to the
/// application's handler task, a writer task that serializes unmasked
/// outgoing frames, and a heartbeat timer that pings on an interval and
/// closes the connection if no pong arrives within `options.pong_timeout`.
/// Removes the connection from `rooms` unconditionally on exit.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run<S>(
    stream: S,
    url: String,
    auto_join: Option<Box<str>>,
    options: Arc<WsOptions>,
    rooms: Arc<RoomIndex>,
    handler: Arc<WsHandlerFn>,
    request: Request,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<WsMessage>();

    let connection = Arc::new(WsConnection {
        id: Uuid::new_v4(),
        url,
        is_alive: AtomicBool::new(true),
        last_pong: Mutex::new(Instant::now()),
        rooms: Mutex::new(HashSet::new()),
        sender: tx,
    });
    rooms.register(connection.clone());
    if let Some(room) = &auto_join {
        rooms.join(connection.id, room);
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if frame.write_unmasked(&mut write_half).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let handle = WsConnectionHandle {
        conn: connection.clone(),
        rooms: rooms.clone(),
        inbox: inbox_rx,
    };
    let handler_task = tokio::spawn(async move {
        if let Err(error) = handler(handle, request).await {
            log::warn!("websocket handler error: {error:#}");
        }
    });

    // Signals the reader loop below to stop waiting on `read_masked`, which
    // otherwise never returns for a peer that has gone silently dead - the
    // heartbeat task is the only thing that can detect that case, so it
    // needs a way to wake the reader rather than just flipping `is_alive`.
    let shutdown = Arc::new(Notify::new());

    let heartbeat_connection = connection.clone();
    let heartbeat_sender = heartbeat_connection.sender.clone();
    let heartbeat_shutdown = shutdown.clone();
    let pong_timeout = options.pong_timeout;
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(options.heartbeat_interval);
        loop {
            ticker.tick().await;
            let elapsed = heartbeat_connection
                .last_pong
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .elapsed();
            if elapsed > pong_timeout {
                heartbeat_connection.is_alive.store(false, Ordering::SeqCst);
                let _ = heartbeat_sender.send(Frame::close(1006, ""));
                heartbeat_shutdown.notify_one();
                break;
            }
            if heartbeat_sender.send(Frame::ping(Vec::new())).is_err() {
                break;
            }
        }
    });

    loop {
        if !connection.is_alive() {
            break;
        }
        let frame = tokio::select! {
            _ = shutdown.notified() => break,
            frame = Frame::read_masked(&mut read_half, options.max_message_size) => frame,
        };
        match frame {
            Ok(frame) => match frame.opcode {
                Opcode::Text => {
                    let text = String::from_utf8_lossy(&frame.payload).into_owned();
                    if inbox_tx.send(WsMessage::Text(text)).is_err() {
                        break;
                    }
                }
                Opcode::Binary => {
                    if inbox_tx.send(WsMessage::Binary(frame.payload)).is_err() {
                        break;
                    }
                }
                Opcode::Ping => {
                    let _ = connection.sender.send(Frame::pong(frame.payload));
                }
                Opcode::Pong => {
                    *connection
                        .last_pong
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner) = Instant::now();
                }
                Opcode::Close => {
                    let _ = connection.sender.send(Frame::close(1000, ""));
                    break;
                }
                Opcode::Continuation => {}
            },
            Err(error) => {
                log::debug!("{} connection error: {}", connection.id, error);
                let _ = connection.sender.send(Frame::close(1006, "abnormal"));
                break;
            }
        }
    }

    drop(inbox_tx);
    heartbeat.abort();
    handler_task.abort();
    rooms.drop_connection(connection.id);
    drop(connection);
    let _ = writer.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn noop_handler() -> Arc<WsHandlerFn> {
        Arc::new(|_handle: WsConnectionHandle, _req: Request| {
            Box::pin(async move { Ok(()) })
                as std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), anyhow::Error>> + Send>>
        })
    }

    /// A peer that never replies to pings must not wedge `run()` forever -
    /// the heartbeat task has to be able to wake the reader, which is
    /// parked in `Frame::read_masked` waiting on bytes that will never
    /// arrive.
    #[tokio::test]
    async fn heartbeat_timeout_tears_down_the_connection() {
        let (server, _client) = tokio::io::duplex(1024);
        let options = Arc::new(WsOptions {
            heartbeat_interval: Duration::from_millis(10),
            pong_timeout: Duration::from_millis(5),
            ..WsOptions::default()
        });
        let rooms = Arc::new(RoomIndex::default());
        let request = Request::get("/ws").unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            run(server, "/ws".to_owned(), None, options, rooms.clone(), noop_handler(), request),
        )
        .await;

        assert!(outcome.is_ok(), "run() should return once the peer is detected dead, not hang");
    }
}
