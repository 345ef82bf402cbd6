//! 릴레이 에러 정의

use thiserror::Error;

/// 라우팅/큐잉 과정에서 발생하는 에러.
///
/// 어느 것도 원격 송신자에게 전달되지 않는다. 호출 측은 로그만 남기고 연결을 유지한다.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("empty frame")]
    EmptyFrame,

    #[error("{kind} message without target")]
    MissingTarget { kind: &'static str },

    #[error("target {target} not found in room {room}")]
    TargetNotFound { room: String, target: String },

    #[error("outbound queue full")]
    QueueFull,

    #[error("outbound queue closed")]
    QueueClosed,

    #[error("failed to encode server message: {0}")]
    Encode(serde_json::Error),
}
