//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::error::RelayError;
use crate::registry::RoomRegistry;
use axum::extract::ws::Message;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 방 명단 (room -> client id -> connection)
    pub registry: RoomRegistry,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            registry: RoomRegistry::new(),
            config: Arc::new(config),
        }
    }
}

/// 연결 생명주기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 수락됨, 아직 id/방 없음
    Connecting,
    Joined,
    /// 정리 진행 중
    Leaving,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connecting | Self::Joined)
    }
}

/// 연결이 속한 방과 그 안에서의 id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room: String,
    pub client_id: String,
}

#[derive(Debug)]
pub struct Session {
    pub state: ConnectionState,
    pub membership: Option<Membership>,
}

/// 클라이언트 연결 하나.
///
/// 송신 큐와 종료 신호를 소유한다. 레지스트리는 `Weak` 참조만 가진다.
pub struct Connection {
    conn_id: Uuid,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    session: Mutex<Session>,
    shutdown: watch::Sender<bool>,
    connected_at: Instant,
}

impl Connection {
    /// 연결과 그 송신 큐의 수신단을 만든다
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let conn = Arc::new(Self {
            conn_id: Uuid::new_v4(),
            outbound: Mutex::new(Some(tx)),
            session: Mutex::new(Session {
                state: ConnectionState::Connecting,
                membership: None,
            }),
            shutdown,
            connected_at: Instant::now(),
        });
        (conn, rx)
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.session().state
    }

    pub fn membership(&self) -> Option<Membership> {
        self.session().membership.clone()
    }

    /// 송신 큐에 넣는다. 가득 차면 새 메시지를 버린다.
    pub fn enqueue(&self, message: Message) -> Result<(), RelayError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(RelayError::QueueClosed);
        };
        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RelayError::QueueClosed,
        })
    }

    /// Leaving으로 전환. 이미 정리 중이거나 닫혔으면 `None` (한 번만 성공).
    pub fn begin_leaving(&self) -> Option<Option<Membership>> {
        let mut session = self.session();
        if !session.state.is_open() {
            return None;
        }
        session.state = ConnectionState::Leaving;
        Some(session.membership.take())
    }

    /// 송신 큐를 닫고 읽기 경로에 종료를 알린다. 이미 쌓인 메시지는 송신 태스크가 비운다.
    pub fn close(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shutdown.send_replace(true);
    }

    pub fn mark_closed(&self) {
        self.session().state = ConnectionState::Closed;
    }

    /// `close()`가 불릴 때 완료되는 future
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("conn_id", &self.conn_id)
            .field("session", &*self.session())
            .finish()
    }
}
