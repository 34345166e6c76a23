//! Query windows for map and link views

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One of the three fixed aggregation windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeWindow {
    /// Last 24 hours
    #[default]
    #[serde(rename = "24h")]
    Day,
    /// Last 7 days
    #[serde(rename = "7d")]
    Week,
    /// Last 30 days
    #[serde(rename = "30d")]
    Month,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Day, TimeWindow::Week, TimeWindow::Month];

    /// Query-string spelling ("24h", "7d", "30d")
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "24h",
            TimeWindow::Week => "7d",
            TimeWindow::Month => "30d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Day => Duration::hours(24),
            TimeWindow::Week => Duration::days(7),
            TimeWindow::Month => Duration::days(30),
        }
    }

    /// Oldest timestamp still inside the window at `now`
    ///
    /// An event at `t` belongs to the window iff `cutoff(now) <= t <= now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "24h" => Ok(TimeWindow::Day),
            "7d" => Ok(TimeWindow::Week),
            "30d" => Ok(TimeWindow::Month),
            other => Err(Error::InvalidRange(format!(
                "'{}' is not one of 24h, 7d, 30d",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_known_ranges() {
        assert_eq!("24h".parse::<TimeWindow>().unwrap(), TimeWindow::Day);
        assert_eq!("7d".parse::<TimeWindow>().unwrap(), TimeWindow::Week);
        assert_eq!("30d".parse::<TimeWindow>().unwrap(), TimeWindow::Month);
    }

    #[test]
    fn test_parse_unknown_range_is_invalid_range() {
        for bad in ["", "1h", "24H", "week", "90d"] {
            match bad.parse::<TimeWindow>() {
                Err(Error::InvalidRange(_)) => {}
                other => panic!("expected InvalidRange for '{}', got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_cutoff_boundaries() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let at_25h = now - Duration::hours(25);

        assert!(TimeWindow::Day.cutoff(now) > at_25h);
        assert!(TimeWindow::Week.cutoff(now) <= at_25h);
        assert!(TimeWindow::Month.cutoff(now) <= at_25h);
        assert_eq!(TimeWindow::Month.cutoff(now), now - Duration::days(30));
    }

    #[test]
    fn test_serde_uses_query_spelling() {
        assert_eq!(serde_json::to_string(&TimeWindow::Week).unwrap(), "\"7d\"");
        for window in TimeWindow::ALL {
            assert_eq!(window.to_string().parse::<TimeWindow>().unwrap(), window);
        }
    }
}
