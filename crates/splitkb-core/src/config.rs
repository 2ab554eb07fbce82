use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing profile shared by every stage of the pipeline.
///
/// Built once at start-up and handed to the key groups, the engine and the
/// halves by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Window in which the keys of a chord must all go down.
    #[serde(default = "default_combo_term_ms")]
    pub combo_term_ms: u64,
    /// Press duration after which a tap-hold key counts as held.
    #[serde(default = "default_tap_hold_term_ms")]
    pub tap_hold_term_ms: u64,
    /// Sleep at the tail of each polling loop iteration.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_permissive_hold")]
    pub permissive_hold: bool,
}

fn default_combo_term_ms() -> u64 {
    50
}

fn default_tap_hold_term_ms() -> u64 {
    200
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_permissive_hold() -> bool {
    true
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            combo_term_ms: 50,
            tap_hold_term_ms: 200,
            poll_interval_ms: 1,
            permissive_hold: true,
        }
    }
}

impl Profile {
    pub fn combo_term(&self) -> Duration {
        Duration::from_millis(self.combo_term_ms)
    }

    pub fn tap_hold_term(&self) -> Duration {
        Duration::from_millis(self.tap_hold_term_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_profile_keeps_defaults() {
        let profile: Profile = serde_json::from_str(r#"{ "tap_hold_term_ms": 180 }"#).unwrap();
        assert_eq!(profile.tap_hold_term(), Duration::from_millis(180));
        assert_eq!(profile.combo_term(), Duration::from_millis(50));
        assert!(profile.permissive_hold);
    }
}
