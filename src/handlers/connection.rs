//! 연결 핸들러
//!
//! 연결마다 읽기 경로와 쓰기 경로가 독립적으로 돈다. 둘 사이는 연결이 소유한
//! bounded 송신 큐 하나로만 이어진다.

use super::{handle_disconnect, route_frame};
use crate::error::RelayError;
use crate::state::{AppState, Connection};
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

/// 수립된 연결 하나를 끝날 때까지 처리한다.
///
/// `stream`/`sink`는 이미 프레임 단위로 나뉜 전이중 연결의 양쪽이다.
pub async fn serve_connection<S, W, E>(state: Arc<AppState>, stream: S, sink: W)
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    let (conn, outbound) = Connection::new(state.config.connection.outbound_capacity);
    tracing::info!(conn_id = %conn.conn_id(), "New connection established");

    let keepalive = state.config.connection.keepalive_interval;
    let send_task = tokio::spawn(write_pump(
        state.clone(),
        conn.clone(),
        sink,
        outbound,
        keepalive,
    ));

    read_pump(&state, &conn, stream).await;
    handle_disconnect(&state, &conn);

    if let Err(e) = send_task.await {
        tracing::warn!(conn_id = %conn.conn_id(), error = %e, "Write task ended abnormally");
    }
    conn.mark_closed();

    tracing::info!(
        conn_id = %conn.conn_id(),
        elapsed_ms = conn.connected_at().elapsed().as_millis() as u64,
        "Connection closed"
    );
}

/// 수신 루프. 전송 에러, close 프레임, 종료 신호 중 하나가 올 때까지 돈다.
async fn read_pump<S, E>(state: &Arc<AppState>, conn: &Arc<Connection>, mut stream: S)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let closed = conn.closed();
    tokio::pin!(closed);

    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut closed => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(frame)) => {
                if let Err(e) = route_frame(state, conn, &frame) {
                    log_route_error(conn, &e);
                }
            }
            Some(Err(e)) => {
                tracing::warn!(conn_id = %conn.conn_id(), error = %e, "Read error");
                break;
            }
        }
    }
}

fn log_route_error(conn: &Connection, error: &RelayError) {
    match error {
        RelayError::EmptyFrame => {
            tracing::debug!(conn_id = %conn.conn_id(), "Empty message skipped")
        }
        RelayError::Decode(_) => {
            tracing::warn!(conn_id = %conn.conn_id(), error = %error, "Invalid message dropped")
        }
        _ => tracing::warn!(conn_id = %conn.conn_id(), error = %error, "Message dropped"),
    }
}

/// 송신 루프. 큐가 닫히고 비면 끝난다. 쓰기 실패 시 연결을 정리한다.
async fn write_pump<W>(
    state: Arc<AppState>,
    conn: Arc<Connection>,
    mut sink: W,
    mut outbound: mpsc::Receiver<Message>,
    keepalive: Duration,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display + Send,
{
    let period = keepalive.max(Duration::from_secs(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let failed = loop {
        tokio::select! {
            biased;
            message = outbound.recv() => {
                let Some(message) = message else {
                    break false;
                };
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(conn_id = %conn.conn_id(), error = %e, "Write error");
                    break true;
                }
            }
            _ = ticker.tick(), if !keepalive.is_zero() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    tracing::warn!(conn_id = %conn.conn_id(), error = %e, "Keepalive failed");
                    break true;
                }
            }
        }
    };

    if failed {
        handle_disconnect(&state, &conn);
    } else {
        let _ = sink.close().await;
    }
}
