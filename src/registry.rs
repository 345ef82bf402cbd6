//! 방 명단 레지스트리
//!
//! room -> client id -> `Weak<Connection>`. 방 하나는 DashMap 샤드 락 하나로 보호되므로
//! 같은 방에 대한 조회는 동시에, 등록/해제는 배타적으로 실행된다.
//! 빈 방은 마지막 해제와 같은 임계 구역에서 지워진다.

use crate::state::Connection;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

type Members = HashMap<String, Weak<Connection>>;

/// `register` 결과
#[derive(Debug)]
pub struct Registration {
    /// 등록 직후의 방 명단 (자신 포함)
    pub roster: Vec<String>,
    /// 같은 id를 쓰던 다른 연결을 밀어냈는지
    pub displaced: bool,
}

/// 식별자 비교 해제 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// 이 연결의 항목을 지움. `remaining`은 남은 인원.
    Removed { remaining: usize },
    /// 같은 id를 다른 연결이 차지하고 있어 건드리지 않음
    Replaced,
    NotFound,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Members>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 방에 연결을 등록하고 같은 임계 구역에서 명단을 찍는다
    pub fn register(&self, room: &str, client_id: &str, conn: &Arc<Connection>) -> Registration {
        self.register_with(room, client_id, conn, |_, _| {})
    }

    /// `register`와 같되, 방 락을 놓기 전에 `on_registered(명단, 다른 구성원)`을 부른다.
    ///
    /// 여기서 큐에 넣은 메시지는 같은 방의 다른 등록/해제 알림과 섞이지 않는다.
    pub fn register_with(
        &self,
        room: &str,
        client_id: &str,
        conn: &Arc<Connection>,
        on_registered: impl FnOnce(&[String], &[Arc<Connection>]),
    ) -> Registration {
        let mut members = self.rooms.entry(room.to_string()).or_default();
        let weak = Arc::downgrade(conn);
        let previous = members.insert(client_id.to_string(), weak.clone());
        let displaced =
            previous.is_some_and(|prev| !Weak::ptr_eq(&prev, &weak) && prev.strong_count() > 0);
        let roster: Vec<String> = members.keys().cloned().collect();
        on_registered(&roster, &live_except(&members, client_id));
        Registration { roster, displaced }
    }

    /// 연결 식별 없이 id로 해제. 남은 인원 수를 돌려준다.
    pub fn unregister(&self, room: &str, client_id: &str) -> Option<usize> {
        match self.rooms.entry(room.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().remove(client_id)?;
                let remaining = entry.get().len();
                if remaining == 0 {
                    entry.remove();
                }
                Some(remaining)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// 항목이 바로 이 연결일 때만 해제
    pub fn unregister_connection(
        &self,
        room: &str,
        client_id: &str,
        conn: &Weak<Connection>,
    ) -> Removal {
        self.unregister_connection_with(room, client_id, conn, |_| {})
    }

    /// `unregister_connection`과 같되, 실제로 지웠고 방에 누가 남아 있으면
    /// 방 락을 놓기 전에 `on_removed(남은 구성원)`을 부른다.
    pub fn unregister_connection_with(
        &self,
        room: &str,
        client_id: &str,
        conn: &Weak<Connection>,
        on_removed: impl FnOnce(&[Arc<Connection>]),
    ) -> Removal {
        let Entry::Occupied(mut entry) = self.rooms.entry(room.to_string()) else {
            return Removal::NotFound;
        };
        match entry.get().get(client_id) {
            None => return Removal::NotFound,
            Some(current) if !Weak::ptr_eq(current, conn) => return Removal::Replaced,
            Some(_) => {}
        }

        entry.get_mut().remove(client_id);
        let remaining = entry.get().len();
        if remaining == 0 {
            entry.remove();
        } else {
            on_removed(&live_except(entry.get(), client_id));
        }
        Removal::Removed { remaining }
    }

    pub fn lookup(&self, room: &str, client_id: &str) -> Option<Arc<Connection>> {
        self.rooms.get(room)?.get(client_id)?.upgrade()
    }

    /// (room, id) 항목이 이 연결을 가리키는지
    pub fn holds(&self, room: &str, client_id: &str, conn: &Weak<Connection>) -> bool {
        self.rooms
            .get(room)
            .and_then(|members| members.get(client_id).map(|c| Weak::ptr_eq(c, conn)))
            .unwrap_or(false)
    }

    pub fn snapshot_members(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `exclude`를 뺀 방 구성원의 살아 있는 연결들
    pub fn broadcast_targets(&self, room: &str, exclude: &str) -> Vec<Arc<Connection>> {
        self.rooms
            .get(room)
            .map(|members| live_except(&members, exclude))
            .unwrap_or_default()
    }

    /// 사라진 연결의 항목과 그로 인해 빈 방을 제거. 지운 항목 수를 돌려준다.
    pub fn prune(&self) -> usize {
        let mut pruned = 0;
        self.rooms.retain(|_, members| {
            let before = members.len();
            members.retain(|_, conn| conn.strong_count() > 0);
            pruned += before - members.len();
            !members.is_empty()
        });
        pruned
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn client_count(&self) -> usize {
        self.rooms.iter().map(|room| room.len()).sum()
    }
}

fn live_except(members: &Members, exclude: &str) -> Vec<Arc<Connection>> {
    members
        .iter()
        .filter(|(id, _)| id.as_str() != exclude)
        .filter_map(|(_, conn)| conn.upgrade())
        .collect()
}
