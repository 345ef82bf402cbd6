//! 방 단위 WebRTC 시그널링 릴레이
//!
//! 클라이언트는 방에 들어와 offer/answer/candidate를 서버를 거쳐 주고받는다.
//! 서버는 payload를 해석하지 않고 대상에게 그대로 넘기며, 방 구성원의 입장/퇴장을 알린다.

pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod state;

pub use config::Config;
pub use error::RelayError;
pub use handlers::serve_connection;
pub use state::AppState;
