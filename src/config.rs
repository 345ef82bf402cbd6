//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub connection: ConnectionConfig,
    pub log_level: String,
}

/// 연결 단위 설정
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// 연결별 송신 큐 크기
    pub outbound_capacity: usize,
    /// keepalive ping 주기 (0이면 비활성화)
    pub keepalive_interval: Duration,
    /// 정리 후 재확인(reaper)까지의 유예 시간
    pub reaper_grace: Duration,
    /// 죽은 참조를 주기적으로 걷어내는 간격
    pub prune_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            keepalive_interval: Duration::from_secs(30),
            reaper_grace: Duration::from_secs(30),
            prune_interval: Duration::from_secs(300),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["*".to_string()],
            connection: ConnectionConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_or = |key: &str, default| parse_var(&lookup, key, default);

        Self {
            port: parse_var(&lookup, "PORT", defaults.port),
            host: lookup("HOST").unwrap_or(defaults.host),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            connection: ConnectionConfig {
                outbound_capacity: parse_or(
                    "OUTBOUND_QUEUE_CAPACITY",
                    defaults.connection.outbound_capacity as u64,
                )
                .max(1) as usize,
                keepalive_interval: Duration::from_secs(parse_or(
                    "KEEPALIVE_INTERVAL_SECS",
                    defaults.connection.keepalive_interval.as_secs(),
                )),
                reaper_grace: Duration::from_secs(parse_or(
                    "REAPER_GRACE_SECS",
                    defaults.connection.reaper_grace.as_secs(),
                )),
                prune_interval: Duration::from_secs(
                    parse_or(
                        "PRUNE_INTERVAL_SECS",
                        defaults.connection.prune_interval.as_secs(),
                    )
                    .max(1),
                ),
            },
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.connection.outbound_capacity, 256);
        assert_eq!(config.connection.reaper_grace, Duration::from_secs(30));
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("OUTBOUND_QUEUE_CAPACITY", "0"),
            ("KEEPALIVE_INTERVAL_SECS", "not-a-number"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.connection.outbound_capacity, 1);
        assert_eq!(config.connection.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }
}
