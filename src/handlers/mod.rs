//! 핸들러 모듈

pub mod connection;
pub mod room;
pub mod signaling;

pub use connection::*;
pub use room::*;
pub use signaling::*;

use crate::error::RelayError;
use crate::protocol::{Envelope, MessageKind};
use crate::state::{AppState, Connection};
use axum::extract::ws::Message;
use std::sync::Arc;

/// 수신 프레임 하나를 해석해 처리기로 보낸다.
///
/// 에러는 호출 측이 로그만 남긴다. 어떤 경우에도 송신자에게 에러 메시지를 보내지 않는다.
pub fn route_frame(
    state: &Arc<AppState>,
    conn: &Arc<Connection>,
    frame: &Message,
) -> Result<(), RelayError> {
    let bytes: &[u8] = match frame {
        Message::Text(text) => text.as_bytes(),
        Message::Binary(data) => data.as_slice(),
        _ => return Ok(()),
    };
    let envelope = Envelope::decode(bytes)?;

    match envelope.kind {
        MessageKind::Join | MessageKind::Reconnect => {
            handle_join_room(
                state,
                conn,
                &envelope.room,
                &envelope.sender,
                envelope.kind == MessageKind::Reconnect,
            );
            Ok(())
        }
        kind if kind.is_relay() => handle_relay(state, &envelope, frame),
        MessageKind::Leave => {
            handle_disconnect(state, conn);
            Ok(())
        }
        MessageKind::Ping => {
            handle_ping(conn);
            Ok(())
        }
        _ => {
            tracing::warn!(
                conn_id = %conn.conn_id(),
                room = %envelope.room,
                "Unrecognized message type"
            );
            Ok(())
        }
    }
}
