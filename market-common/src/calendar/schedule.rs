//! Session windows and calendar configuration.
//!
//! Windows are defined in exchange-local time using `chrono_tz`; the
//! calendar converts UTC instants before any comparison, so DST
//! transitions are handled by the timezone database.

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One intraday trading window in exchange-local time.
///
/// Both boundary instants belong to the window: an exchange stamps its
/// final trade of the morning at exactly 11:30:00, so the end instant
/// must validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    /// Window name (e.g. "Morning", "Afternoon")
    pub name: String,

    /// Window start (local timezone)
    #[serde(with = "time_serde")]
    pub start: NaiveTime,

    /// Window end (local timezone), inclusive
    #[serde(with = "time_serde")]
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn new(name: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    /// Closed-interval containment check.
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Custom serde module for NaiveTime
mod time_serde {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M:%S").map_err(serde::de::Error::custom)
    }
}

/// Custom serde module for chrono_tz::Tz
mod tz_serde {
    use chrono_tz::Tz;
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Tz, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Tz::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Calendar configuration: exchange timezone, session windows and seed
/// holidays. Deserialized from the service settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSettings {
    /// Exchange timezone (e.g. "Asia/Shanghai")
    #[serde(with = "tz_serde", default = "default_timezone")]
    pub timezone: Tz,

    /// Intraday session windows, exchange-local
    #[serde(default = "default_sessions")]
    pub sessions: Vec<SessionWindow>,

    /// Exchange holidays (non-trading weekdays)
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

fn default_timezone() -> Tz {
    chrono_tz::Asia::Shanghai
}

fn default_sessions() -> Vec<SessionWindow> {
    vec![
        SessionWindow::new(
            "Morning",
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        ),
        SessionWindow::new(
            "Afternoon",
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        ),
    ]
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            sessions: default_sessions(),
            holidays: Vec::new(),
        }
    }
}
