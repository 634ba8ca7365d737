use serde::{Deserialize, Serialize};

/// Response body from the session status probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    /// Whether the probe itself succeeded.
    pub success: bool,

    /// Whether the backend still tracks the session.
    #[serde(default)]
    pub exists: bool,
}

impl SessionStatus {
    /// True only when the backend confirmed the session is alive.
    pub fn is_live(&self) -> bool {
        self.success && self.exists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_session() {
        let status: SessionStatus =
            serde_json::from_str(r#"{"success":true,"exists":true}"#).unwrap();
        assert!(status.is_live());
    }

    #[test]
    fn missing_exists_means_dead() {
        let status: SessionStatus = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(!status.is_live());
    }

    #[test]
    fn failed_probe_means_dead() {
        let status: SessionStatus =
            serde_json::from_str(r#"{"success":false,"exists":true}"#).unwrap();
        assert!(!status.is_live());
    }
}
