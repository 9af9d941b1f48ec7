use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::device::types::LedCommand;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// A wall clock time with minute precision, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    minutes: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTimeOfDay(pub String);

impl fmt::Display for InvalidTimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" is not a time of day (expected HH:MM)", self.0)
    }
}

impl std::error::Error for InvalidTimeOfDay {}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(TimeOfDay { minutes: u16::from(hour) * 60 + u16::from(minute) })
        } else {
            None
        }
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    /// The current time of day of the system clock, shifted by `utc_offset_minutes`.
    pub fn now(utc_offset_minutes: i16) -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        TimeOfDay::from_unix_seconds(seconds, utc_offset_minutes)
    }

    pub fn from_unix_seconds(seconds: u64, utc_offset_minutes: i16) -> Self {
        let day = i64::from(MINUTES_PER_DAY);
        let utc_minutes = ((seconds / 60) % MINUTES_PER_DAY as u64) as i64;
        let minutes = (utc_minutes + i64::from(utc_offset_minutes)).rem_euclid(day);
        TimeOfDay { minutes: minutes as u16 }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeOfDay;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTimeOfDay(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;

        if minute.len() != 2 {
            return Err(invalid());
        }

        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        TimeOfDay::new(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Keeps the lamp on between `from` and `to` every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub enabled: bool,
    pub from: TimeOfDay,
    pub to: TimeOfDay,
    // added to the UTC system clock to get the lamp's wall clock time
    pub utc_offset_minutes: i16,
}

impl TimerConfig {
    pub fn is_within_window(&self, now: TimeOfDay) -> bool {
        if self.from <= self.to {
            self.from <= now && now < self.to
        } else {
            // wraps past midnight
            now >= self.from || now < self.to
        }
    }

    /// What the lamp should be doing at `now`, or `None` when the timer is disabled.
    pub fn desired_state(&self, now: TimeOfDay) -> Option<LedCommand> {
        if !self.enabled {
            return None;
        }

        Some(LedCommand::from_bool(self.is_within_window(now)))
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            enabled: false,
            from: TimeOfDay { minutes: 19 * 60 },
            to: TimeOfDay { minutes: 23 * 60 },
            utc_offset_minutes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_print() {
        assert_eq!(t("07:05").to_string(), "07:05");
        assert_eq!(t("7:05"), TimeOfDay::new(7, 5).unwrap());
        assert_eq!(t(" 23:59 ").to_string(), "23:59");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("12:5".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn unix_seconds_with_offset() {
        // 1970-01-01 00:30 UTC
        assert_eq!(TimeOfDay::from_unix_seconds(30 * 60, 0), t("00:30"));
        assert_eq!(TimeOfDay::from_unix_seconds(30 * 60, 120), t("02:30"));
        assert_eq!(TimeOfDay::from_unix_seconds(30 * 60, -60), t("23:30"));
        assert_eq!(TimeOfDay::from_unix_seconds(86_400 + 60, 0), t("00:01"));
    }

    #[test]
    fn window_same_day() {
        let timer = TimerConfig { enabled: true, from: t("19:00"), to: t("23:00"), utc_offset_minutes: 0 };

        assert_eq!(timer.desired_state(t("18:59")), Some(LedCommand::OFF));
        assert_eq!(timer.desired_state(t("19:00")), Some(LedCommand::ON));
        assert_eq!(timer.desired_state(t("22:59")), Some(LedCommand::ON));
        assert_eq!(timer.desired_state(t("23:00")), Some(LedCommand::OFF));
    }

    #[test]
    fn window_past_midnight() {
        let timer = TimerConfig { enabled: true, from: t("22:00"), to: t("06:30"), utc_offset_minutes: 0 };

        assert!(timer.is_within_window(t("23:15")));
        assert!(timer.is_within_window(t("00:00")));
        assert!(timer.is_within_window(t("06:29")));
        assert!(!timer.is_within_window(t("06:30")));
        assert!(!timer.is_within_window(t("12:00")));
    }

    #[test]
    fn empty_window_and_disabled() {
        let timer = TimerConfig { enabled: true, from: t("08:00"), to: t("08:00"), utc_offset_minutes: 0 };
        assert_eq!(timer.desired_state(t("08:00")), Some(LedCommand::OFF));

        let disabled = TimerConfig { enabled: false, ..timer };
        assert_eq!(disabled.desired_state(t("08:00")), None);
    }

    #[test]
    fn serde_format() {
        let timer = TimerConfig { enabled: true, from: t("22:00"), to: t("06:30"), utc_offset_minutes: 60 };
        let json = serde_json::to_string(&timer).unwrap();
        assert_eq!(json, r#"{"enabled":true,"from":"22:00","to":"06:30","utcOffsetMinutes":60}"#);
        assert_eq!(serde_json::from_str::<TimerConfig>(&json).unwrap(), timer);
        assert!(serde_json::from_str::<TimerConfig>(r#"{"enabled":true,"from":"25:00","to":"06:30","utcOffsetMinutes":0}"#).is_err());
    }
}
