//! Environment injected into mobile client deployments.

use crate::model::{EnvVar, TunnelRecord};

pub const ENV_TUNNEL_URL: &str = "MOBILE_TUNNEL_URL";
pub const ENV_TUNNEL_ID: &str = "MOBILE_TUNNEL_ID";
pub const ENV_ACCESS_SECRET: &str = "MOBILE_ACCESS_SECRET";
pub const ENV_REMOTE_MODE: &str = "MOBILE_REMOTE_MODE";

/// Per-call overrides for a fresh mobile deployment.
pub fn deploy_env(tunnel: &TunnelRecord, access_secret: &str) -> Vec<EnvVar> {
    let mut env = tunnel_env(tunnel);
    env.push(EnvVar::new(ENV_ACCESS_SECRET, access_secret));
    env.push(EnvVar::new(ENV_REMOTE_MODE, "true"));
    env
}

/// Variables that change when a tunnel is replaced during recovery.
pub fn tunnel_env(tunnel: &TunnelRecord) -> Vec<EnvVar> {
    vec![
        EnvVar::new(ENV_TUNNEL_URL, tunnel.public_url.as_str()),
        EnvVar::new(ENV_TUNNEL_ID, tunnel.id.as_str()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tunnel() -> TunnelRecord {
        TunnelRecord {
            id: "tn_1".into(),
            public_url: "https://abc.tunnel.example".into(),
            local_port: 8787,
            created_at: Utc::now(),
            verified: true,
        }
    }

    #[test]
    fn deploy_env_carries_url_secret_and_remote_flag() {
        let env = deploy_env(&tunnel(), "s3cret");
        let keys: Vec<_> = env.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![ENV_TUNNEL_URL, ENV_TUNNEL_ID, ENV_ACCESS_SECRET, ENV_REMOTE_MODE]
        );
        assert_eq!(env[0].value, "https://abc.tunnel.example");
        assert_eq!(env[3].value, "true");
    }

    #[test]
    fn recovery_env_never_touches_the_secret() {
        let env = tunnel_env(&tunnel());
        assert!(env.iter().all(|v| v.key != ENV_ACCESS_SECRET));
    }
}
