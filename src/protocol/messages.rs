//! 클라이언트-서버 메시지 프로토콜 정의

use crate::error::RelayError;
use axum::extract::ws::Message;
use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// 서버가 보내는 메시지의 발신자 표기
pub const SERVER_SENDER: &str = "server";

/// 메시지 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Join,
    Reconnect,
    Offer,
    Answer,
    #[serde(alias = "ice")]
    Candidate,
    Chat,
    Leave,
    Ping,
    /// `type`이 없거나 알 수 없는 값
    #[default]
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// 대상 피어에게 그대로 중계되는 종류인지
    pub fn is_relay(self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::Candidate | Self::Chat)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Reconnect => "reconnect",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Chat => "chat",
            Self::Leave => "leave",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        }
    }
}

/// 클라이언트 → 서버 메시지 봉투.
///
/// `payload`는 해석하지 않는다. 중계 시에는 수신한 원본 바이트를 그대로 넘긴다.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, alias = "data")]
    pub payload: Option<Box<RawValue>>,
}

impl Envelope {
    /// 텍스트/바이너리 프레임 본문을 봉투로 해석
    pub fn decode(bytes: &[u8]) -> Result<Self, RelayError> {
        let Some(first) = bytes.iter().find(|b| !b.is_ascii_whitespace()) else {
            return Err(RelayError::EmptyFrame);
        };
        // 파생 구현은 배열도 위치 순서로 받아들이므로 객체만 통과시킨다
        if *first != b'{' {
            let unexpected = match first {
                b'[' => Unexpected::Seq,
                _ => Unexpected::Other("non-object JSON"),
            };
            return Err(RelayError::Decode(de::Error::invalid_type(
                unexpected,
                &"a JSON object",
            )));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// 비어 있지 않은 대상 id
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.is_empty())
    }
}

/// 필드가 `null`이면 빠진 것과 같게 취급
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 서버 → 클라이언트 메시지 (presence 및 pong)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// 새로 들어온 클라이언트에게 보내는 방 명단. `target`은 수신자 자신의 id.
    Welcome {
        room: String,
        sender: String,
        target: String,
        clients: Vec<String>,
    },
    NewPeer {
        room: String,
        sender: String,
    },
    PeerReconnected {
        room: String,
        sender: String,
    },
    PeerLeft {
        room: String,
        sender: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn welcome(room: &str, client_id: &str, clients: Vec<String>) -> Self {
        Self::Welcome {
            room: room.to_string(),
            sender: SERVER_SENDER.to_string(),
            target: client_id.to_string(),
            clients,
        }
    }

    /// 전송 프레임으로 직렬화
    pub fn to_frame(&self) -> Result<Message, RelayError> {
        serde_json::to_string(self)
            .map(Message::Text)
            .map_err(RelayError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_join() {
        let env = Envelope::decode(br#"{"type":"join","room":"r1","sender":"A"}"#).unwrap();
        assert_eq!(env.kind, MessageKind::Join);
        assert_eq!(env.room, "r1");
        assert_eq!(env.sender, "A");
        assert_eq!(env.target(), None);
        assert!(env.payload.is_none());
    }

    #[test]
    fn payload_is_kept_opaque() {
        let raw = br#"{"type":"offer","room":"r1","sender":"A","target":"B",
            "payload":{"sdp":"v=0\r\n","n":[1, 2]}}"#;
        let env = Envelope::decode(raw).unwrap();
        assert!(env.kind.is_relay());
        assert_eq!(env.target(), Some("B"));
        assert_eq!(env.payload.unwrap().get(), r#"{"sdp":"v=0\r\n","n":[1, 2]}"#);
    }

    #[test]
    fn data_alias_and_ice_alias() {
        let env =
            Envelope::decode(br#"{"type":"ice","room":"r","target":"B","data":{"c":1}}"#).unwrap();
        assert_eq!(env.kind, MessageKind::Candidate);
        assert!(env.payload.is_some());
    }

    #[test]
    fn unknown_and_missing_type() {
        let env = Envelope::decode(br#"{"type":"dance","room":"r"}"#).unwrap();
        assert_eq!(env.kind, MessageKind::Unknown);

        let env = Envelope::decode(br#"{"room":"r","extra":true}"#).unwrap();
        assert_eq!(env.kind, MessageKind::Unknown);
    }

    #[test]
    fn empty_target_is_none() {
        let env = Envelope::decode(br#"{"type":"answer","room":"r","target":""}"#).unwrap();
        assert_eq!(env.target(), None);
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(
            Envelope::decode(b"{not json"),
            Err(RelayError::Decode(_))
        ));
        assert!(matches!(
            Envelope::decode(br#"{"type":1}"#),
            Err(RelayError::Decode(_))
        ));
        assert!(matches!(Envelope::decode(b"  "), Err(RelayError::EmptyFrame)));
        assert!(matches!(
            Envelope::decode(br#"["join","r1","A"]"#),
            Err(RelayError::Decode(_))
        ));
        assert!(matches!(
            Envelope::decode(br#" ["offer","r1","A","B",{"sdp":"x"}]"#),
            Err(RelayError::Decode(_))
        ));
        assert!(matches!(
            Envelope::decode(br#""join""#),
            Err(RelayError::Decode(_))
        ));
    }

    #[test]
    fn null_fields_read_as_missing() {
        let env = Envelope::decode(
            br#"{"type":"join","room":null,"sender":null,"target":null,"payload":null}"#,
        )
        .unwrap();
        assert_eq!(env.kind, MessageKind::Join);
        assert_eq!(env.room, "");
        assert_eq!(env.sender, "");
        assert_eq!(env.target(), None);
        assert!(env.payload.is_none());

        let env = Envelope::decode(br#"{"type":null,"room":"r"}"#).unwrap();
        assert_eq!(env.kind, MessageKind::Unknown);
    }

    #[test]
    fn server_message_wire_shape() {
        let welcome = ServerMessage::welcome("r1", "A", vec!["A".into()]);
        let json: serde_json::Value = serde_json::to_value(&welcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "welcome",
                "room": "r1",
                "sender": "server",
                "target": "A",
                "clients": ["A"]
            })
        );

        let left = ServerMessage::PeerLeft {
            room: "r1".into(),
            sender: "B".into(),
        };
        assert_eq!(
            serde_json::to_value(&left).unwrap(),
            serde_json::json!({"type": "peer-left", "room": "r1", "sender": "B"})
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
    }
}
