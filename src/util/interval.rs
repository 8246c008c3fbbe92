use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// The argument to `agg` is not an interval like `30s` or `1m`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {0:?} (expected a positive integer followed by ms, s, m or h)")]
pub struct InvalidDuration(pub String);

/// Time between two poll cycles. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for PollInterval {
    type Err = InvalidDuration;

    /// Accepts `^(\d+)(ms|s|m|h)$`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDuration(s.to_owned());

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (digits, unit) = s.split_at(split);
        if digits.is_empty() {
            return Err(invalid());
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;

        let millis_per_unit: u64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => return Err(invalid()),
        };
        let millis = value.checked_mul(millis_per_unit).ok_or_else(invalid)?;
        if millis == 0 {
            return Err(invalid());
        }

        Ok(Self(Duration::from_millis(millis)))
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        if millis % 3_600_000 == 0 {
            write!(f, "{}h", millis / 3_600_000)
        } else if millis % 60_000 == 0 {
            write!(f, "{}m", millis / 60_000)
        } else if millis % 1_000 == 0 {
            write!(f, "{}s", millis / 1_000)
        } else {
            write!(f, "{millis}ms")
        }
    }
}
