//! 방 참여/이탈 및 presence 알림

use crate::protocol::ServerMessage;
use crate::registry::Removal;
use crate::state::{AppState, Connection, ConnectionState, Membership};
use std::sync::{Arc, Weak};
use tokio::task::AbortHandle;
use uuid::Uuid;

/// 방 참여 처리 (`join`/`reconnect`)
pub fn handle_join_room(
    state: &Arc<AppState>,
    conn: &Arc<Connection>,
    room_id: &str,
    client_id: &str,
    reconnect: bool,
) {
    let client_id = if client_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        client_id.to_string()
    };
    let membership = Membership {
        room: room_id.to_string(),
        client_id: client_id.clone(),
    };

    let announcement = if reconnect {
        ServerMessage::PeerReconnected {
            room: room_id.to_string(),
            sender: client_id.clone(),
        }
    } else {
        ServerMessage::NewPeer {
            room: room_id.to_string(),
            sender: client_id.clone(),
        }
    };

    // 세션 락을 쥔 채 등록해야 동시에 진행되는 정리와 엇갈리지 않는다
    let (previous, registration) = {
        let mut session = conn.session();
        if !session.state.is_open() {
            tracing::debug!(
                conn_id = %conn.conn_id(),
                room = %room_id,
                "Join ignored on closing connection"
            );
            return;
        }
        let previous = session
            .membership
            .replace(membership.clone())
            .filter(|prev| *prev != membership);
        session.state = ConnectionState::Joined;

        let previous = previous.map(|prev| {
            let removal = remove_and_notify(state, &prev, &Arc::downgrade(conn));
            (prev, removal)
        });
        let registration = state
            .registry
            .register_with(room_id, &client_id, conn, |roster, peers| {
                let welcome = ServerMessage::welcome(room_id, &client_id, roster.to_vec());
                send_to(conn, &welcome);
                deliver(peers, room_id, &announcement);
            });
        (previous, registration)
    };

    if let Some((prev, Removal::Removed { .. })) = previous {
        tracing::info!(
            client_id = %prev.client_id,
            room = %prev.room,
            new_room = %room_id,
            "Client switched rooms"
        );
    }

    if registration.displaced {
        tracing::info!(
            client_id = %client_id,
            room = %room_id,
            "Newer connection took over client id"
        );
    }

    tracing::info!(
        conn_id = %conn.conn_id(),
        client_id = %client_id,
        room = %room_id,
        members = registration.roster.len(),
        reconnect,
        "Client joined room"
    );
}

/// 연결 정리. 연결당 한 번만 효과가 있다.
///
/// 레지스트리에서 이 연결을 빼고, 남은 구성원에게 `peer-left`를 알리고,
/// 송신 큐를 닫는다. 유예 후 재확인하는 reaper도 예약하며, 즉시 제거가
/// 확인되면 취소한다.
pub fn handle_disconnect(state: &Arc<AppState>, conn: &Arc<Connection>) {
    let Some(membership) = conn.begin_leaving() else {
        return;
    };

    if let Some(membership) = membership {
        let weak = Arc::downgrade(conn);
        let reaper = schedule_reaper(state.clone(), membership.clone(), weak.clone());

        match remove_and_notify(state, &membership, &weak) {
            Removal::Removed { remaining: 0 } => {
                tracing::info!(room = %membership.room, "Room deleted");
            }
            Removal::Removed { .. } | Removal::NotFound => {}
            Removal::Replaced => {
                tracing::debug!(
                    client_id = %membership.client_id,
                    room = %membership.room,
                    "Client id already claimed by newer connection"
                );
            }
        }

        if !state
            .registry
            .holds(&membership.room, &membership.client_id, &weak)
        {
            reaper.abort();
        }

        tracing::info!(
            conn_id = %conn.conn_id(),
            client_id = %membership.client_id,
            room = %membership.room,
            "Client left room"
        );
    }

    conn.close();
}

/// 유예 시간 뒤 (room, id) 항목이 아직 이 연결이면 제거한다.
/// 다른 연결이 id를 차지했다면 건드리지 않는다.
fn schedule_reaper(
    state: Arc<AppState>,
    membership: Membership,
    conn: Weak<Connection>,
) -> AbortHandle {
    let grace = state.config.connection.reaper_grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        reap(&state, &membership, &conn);
    })
    .abort_handle()
}

/// reaper 본체
pub fn reap(state: &AppState, membership: &Membership, conn: &Weak<Connection>) -> Removal {
    let removal =
        state
            .registry
            .unregister_connection(&membership.room, &membership.client_id, conn);
    if let Removal::Removed { remaining } = removal {
        tracing::warn!(
            client_id = %membership.client_id,
            room = %membership.room,
            remaining,
            "Reaper removed orphaned registry entry"
        );
    }
    removal
}

/// 죽은 참조 정리 (주기 작업)
pub fn prune_registry(state: &AppState) {
    let pruned = state.registry.prune();
    if pruned > 0 {
        tracing::info!(pruned, "Registry prune completed");
    }
}

/// 이 연결의 항목을 지우고, 같은 임계 구역에서 남은 구성원에게 `peer-left`를 넣는다
fn remove_and_notify(
    state: &AppState,
    membership: &Membership,
    conn: &Weak<Connection>,
) -> Removal {
    let message = ServerMessage::PeerLeft {
        room: membership.room.clone(),
        sender: membership.client_id.clone(),
    };
    state.registry.unregister_connection_with(
        &membership.room,
        &membership.client_id,
        conn,
        |peers| deliver(peers, &membership.room, &message),
    )
}

/// 특정 연결에게 서버 메시지 전송
pub(crate) fn send_to(conn: &Connection, message: &ServerMessage) {
    let result = message.to_frame().and_then(|frame| conn.enqueue(frame));
    if let Err(e) = result {
        tracing::warn!(conn_id = %conn.conn_id(), error = %e, "Dropped server message");
    }
}

/// 여러 연결에 같은 서버 메시지 전송
fn deliver(peers: &[Arc<Connection>], room_id: &str, message: &ServerMessage) {
    if peers.is_empty() {
        return;
    }
    let frame = match message.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode broadcast");
            return;
        }
    };
    for peer in peers {
        if let Err(e) = peer.enqueue(frame.clone()) {
            tracing::warn!(
                conn_id = %peer.conn_id(),
                room = %room_id,
                error = %e,
                "Dropped broadcast"
            );
        }
    }
}
