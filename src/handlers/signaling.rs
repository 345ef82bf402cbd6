//! WebRTC 시그널링 중계

use crate::error::RelayError;
use crate::protocol::{Envelope, ServerMessage};
use crate::state::{AppState, Connection};
use axum::extract::ws::Message;

/// offer/answer/candidate/chat 중계.
///
/// 대상에게는 받은 프레임을 다시 직렬화하지 않고 그대로 넣는다.
pub fn handle_relay(
    state: &AppState,
    envelope: &Envelope,
    frame: &Message,
) -> Result<(), RelayError> {
    let kind = envelope.kind.as_str();
    let target_id = envelope
        .target()
        .ok_or(RelayError::MissingTarget { kind })?;

    let target = state
        .registry
        .lookup(&envelope.room, target_id)
        .ok_or_else(|| RelayError::TargetNotFound {
            room: envelope.room.clone(),
            target: target_id.to_string(),
        })?;

    target.enqueue(frame.clone())?;

    tracing::debug!(
        kind,
        from = %envelope.sender,
        to = %target_id,
        room = %envelope.room,
        "Relayed message"
    );
    Ok(())
}

/// Heartbeat 처리
pub fn handle_ping(conn: &Connection) {
    super::room::send_to(conn, &ServerMessage::Pong);
}
