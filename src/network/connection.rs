//! Per-connection lifecycle.
//!
//! Each connection runs two tasks: this read/event loop and a single
//! writer draining the outbound queue, which preserves per-connection
//! FIFO of pushed events. Protocol violations (oversize frames,
//! malformed JSON) terminate the connection; handler-level failures
//! never do.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use palaver_proto::names::event;
use palaver_proto::{args, ClientFrame, FrameCodec, ServerFrame, WireError};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handlers::{Context, Registry};
use crate::state::{Fabric, OutboundHandle};

const LIFECYCLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

enum LoopExit {
    /// Peer closed or transport failed.
    Transport,
    /// Protocol violation; a `Fatal`-style close was attempted.
    Protocol,
    /// Handshake or idle deadline hit.
    Expired,
    /// Server is shutting down.
    Shutdown,
    /// Writer task ended (slow-consumer overflow or write error).
    WriterGone,
}

/// Drive one connection from accept to cleanup.
pub async fn run(
    fabric: Arc<Fabric>,
    registry: Arc<Registry>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote = %addr, "Connection accepted");

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(
        read_half,
        FrameCodec::<ClientFrame>::new(fabric.limits.max_frame_bytes),
    );
    let writer_framed = FramedWrite::new(
        write_half,
        FrameCodec::<ClientFrame>::new(fabric.limits.max_frame_bytes),
    );

    let outbound = OutboundHandle::new(fabric.limits.outbound_queue_frames);
    fabric.connections.register(&conn_id, outbound.clone());

    let mut writer_task = tokio::spawn(write_loop(writer_framed, outbound.clone()));

    // The handshake frame is the first thing on the wire.
    outbound.push(Arc::new(ServerFrame::event(
        event::CONNECTION_HANDSHAKE,
        args![conn_id, Utc::now(), fabric.server_name],
    )));

    let mut shutdown_rx = fabric.lifecycle.subscribe();
    let mut lifecycle_timer = tokio::time::interval(LIFECYCLE_CHECK_INTERVAL);
    lifecycle_timer.tick().await;

    let exit = loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    debug!(conn_id = %conn_id, method = %frame.method, "Invocation");
                    let ctx = Context { conn_id: &conn_id, fabric: &fabric };
                    registry.dispatch(&ctx, &frame).await;
                }
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "Protocol violation - closing");
                    outbound.push(Arc::new(ServerFrame::event(
                        event::SERVER_ERROR,
                        args![format!("Protocol violation: {e}")],
                    )));
                    break LoopExit::Protocol;
                }
                None => break LoopExit::Transport,
            },

            _ = lifecycle_timer.tick() => {
                if let Some(reason) = lifecycle_check(&fabric, &conn_id) {
                    info!(conn_id = %conn_id, reason, "Closing connection");
                    break LoopExit::Expired;
                }
            }

            _ = shutdown_rx.recv() => {
                outbound.push(Arc::new(ServerFrame::event(
                    event::SERVER_SHUTDOWN,
                    args![],
                )));
                break LoopExit::Shutdown;
            }

            _ = &mut writer_task => {
                debug!(conn_id = %conn_id, "Writer task ended");
                break LoopExit::WriterGone;
            }
        }
    };

    match exit {
        LoopExit::Transport => debug!(conn_id = %conn_id, "Peer disconnected"),
        LoopExit::Protocol | LoopExit::Expired | LoopExit::Shutdown => {
            // Give the writer a moment to flush the final frame.
            outbound.close();
            let _ = tokio::time::timeout(Duration::from_secs(1), &mut writer_task).await;
        }
        LoopExit::WriterGone => {
            if outbound.is_overflowed() {
                warn!(conn_id = %conn_id, "Slow consumer - force disconnect");
            }
        }
    }

    fabric.disconnect(&conn_id).await;
    writer_task.abort();
    info!(conn_id = %conn_id, "Connection closed");
}

/// Deadline checks: unauthenticated connections must finish the
/// handshake in time; authenticated ones must not idle forever.
fn lifecycle_check(fabric: &Arc<Fabric>, conn_id: &str) -> Option<&'static str> {
    if !fabric.connections.is_authenticated(conn_id) {
        let age = fabric.connections.handshake_age(conn_id)?;
        if age > fabric.limits.handshake_timeout() {
            return Some("handshake timeout");
        }
        return None;
    }
    if fabric.limits.idle_timeout_secs > 0 {
        let idle = Duration::from_secs(fabric.limits.idle_timeout_secs);
        if fabric
            .connections
            .last_seen_age(conn_id)
            .is_some_and(|age| age > idle)
        {
            return Some("idle timeout");
        }
    }
    None
}

/// Single writer per connection: drains the outbound queue in order.
/// Ends on queue close, critical overflow, or a transport write error.
async fn write_loop(
    mut sink: FramedWrite<tokio::net::tcp::OwnedWriteHalf, FrameCodec<ClientFrame>>,
    outbound: OutboundHandle,
) {
    while let Some(frame) = outbound.pop().await {
        if let Err(e) = send_frame(&mut sink, &frame).await {
            debug!(error = %e, "Write failed");
            return;
        }
    }
    let _ = futures_util::SinkExt::<&ClientFrame>::flush(&mut sink).await;
}

async fn send_frame(
    sink: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, FrameCodec<ClientFrame>>,
    frame: &ServerFrame,
) -> Result<(), WireError> {
    sink.send(frame).await
}
