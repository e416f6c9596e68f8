//! 用户情绪信号（规划时顺带评估，仅用于观测，不影响规划）

use serde::{Deserialize, Serialize};

/// 0–10 分的情绪评估
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmotion {
    #[serde(default)]
    pub happiness: u8,
    #[serde(default)]
    pub frustration: u8,
    #[serde(default)]
    pub urgency: u8,
    #[serde(default)]
    pub confusion: u8,
}

impl UserEmotion {
    /// 截断到 0–10
    pub fn clamped(self) -> Self {
        Self {
            happiness: self.happiness.min(10),
            frustration: self.frustration.min(10),
            urgency: self.urgency.min(10),
            confusion: self.confusion.min(10),
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.urgency >= 7
    }

    pub fn record(&self, thread_id: &str) {
        tracing::info!(
            thread_id,
            happiness = self.happiness,
            frustration = self.frustration,
            urgency = self.urgency,
            confusion = self.confusion,
            "user emotion"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_and_partial_fields() {
        let e: UserEmotion = serde_json::from_str(r#"{"urgency": 42}"#).unwrap();
        let e = e.clamped();
        assert_eq!(e.urgency, 10);
        assert_eq!(e.happiness, 0);
        assert!(e.is_urgent());
    }
}
