use std::{net::SocketAddr, path::PathBuf, time::Duration};

const DEFAULT_API_KEY: &str = "change-this-in-production";
const DEFAULT_BIND: ([u8; 4], u16) = ([0, 0, 0, 0], 8001);
const DEFAULT_PID_DIR: &str = "/tmp/stream_pids";
const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 15_000;

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    env_trimmed(name).and_then(|v| v.parse::<u64>().ok())
}

fn callback_timeout_ms(raw: Option<u64>) -> u64 {
    raw.map(|v| v.clamp(1_000, 120_000))
        .unwrap_or(DEFAULT_CALLBACK_TIMEOUT_MS)
}

fn parse_bind(raw: Option<String>) -> SocketAddr {
    raw.and_then(|v| v.parse::<SocketAddr>().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND))
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub bind_addr: SocketAddr,
    pub pid_dir: PathBuf,
    pub callback_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let api_key = env_trimmed("RELAY_AGENT_API_KEY").unwrap_or_else(|| {
            tracing::warn!("RELAY_AGENT_API_KEY is not set; using the insecure default key");
            DEFAULT_API_KEY.to_string()
        });
        let bind_addr = parse_bind(env_trimmed("RELAY_AGENT_BIND"));
        let pid_dir = env_trimmed("RELAY_AGENT_PID_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PID_DIR));
        let callback_timeout =
            Duration::from_millis(callback_timeout_ms(env_u64("RELAY_AGENT_CALLBACK_TIMEOUT_MS")));

        Self {
            api_key,
            bind_addr,
            pid_dir,
            callback_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_timeout_defaults_and_clamps() {
        assert_eq!(callback_timeout_ms(None), 15_000);
        assert_eq!(callback_timeout_ms(Some(30_000)), 30_000);
        assert_eq!(callback_timeout_ms(Some(10)), 1_000);
        assert_eq!(callback_timeout_ms(Some(u64::MAX)), 120_000);
    }

    #[test]
    fn bind_defaults_on_missing_or_garbage() {
        assert_eq!(parse_bind(None), SocketAddr::from(DEFAULT_BIND));
        assert_eq!(
            parse_bind(Some("not-an-addr".to_string())),
            SocketAddr::from(DEFAULT_BIND)
        );
        assert_eq!(
            parse_bind(Some("127.0.0.1:9000".to_string())),
            "127.0.0.1:9000".parse().unwrap()
        );
    }
}
