use serde::{Deserialize, Serialize};

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Close sessions that have seen no request for this long. `0` keeps
    /// sessions until the client deletes them or the gateway stops.
    #[serde(default = "d_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// How often the idle reaper runs.
    #[serde(default = "d_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: d_idle_timeout(),
            reap_interval_secs: d_reap_interval(),
        }
    }
}

fn d_idle_timeout() -> u64 {
    3600
}

fn d_reap_interval() -> u64 {
    60
}
