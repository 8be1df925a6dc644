use serde::{Deserialize, Serialize};

/// Minimum whole days between cancellation and session start for a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoticePeriod(i64);

impl NoticePeriod {
    pub const MS_PER_DAY: i64 = 86_400_000;

    pub fn from_days(days: i64) -> anyhow::Result<Self> {
        if days < 0 {
            return Err(anyhow::anyhow!("notice period cannot be negative: {days}"));
        }
        Ok(Self(days))
    }

    /// Negative inputs become a zero-day period.
    pub fn clamped(days: i64) -> Self {
        Self(days.max(0))
    }

    pub fn days(&self) -> i64 {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0.saturating_mul(Self::MS_PER_DAY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub notice_period: NoticePeriod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_notice_period_rejected() {
        assert!(NoticePeriod::from_days(-1).is_err());
        assert_eq!(NoticePeriod::clamped(-4).days(), 0);
        assert_eq!(NoticePeriod::from_days(3).unwrap().as_millis(), 259_200_000);
    }

    #[test]
    fn test_settings_wire_name() {
        let settings = Settings {
            notice_period: NoticePeriod::from_days(2).unwrap(),
        };
        assert_eq!(
            serde_json::to_string(&settings).unwrap(),
            r#"{"noticePeriod":2}"#
        );
    }
}
