use std::fmt;
use std::str::FromStr;

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// -- Records as stored in the realtime tree --
//
// Field names are the on-wire names; existing data written by other clients
// uses exactly these keys.

/// `sessions/{id}/creator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub uid: String,
}

/// Payload written once when a session is created at `sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub creator: Creator,
}

impl SessionRecord {
    pub fn new(creator_uid: &str) -> Self {
        Self {
            creator: Creator {
                uid: creator_uid.to_string(),
            },
        }
    }
}

/// `sessions/{id}/activities/{key}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub activity: String,
}

/// `sessions/{id}/images/{key}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "downloadURL", default)]
    pub download_url: String,
}

/// `users/{uid}/sessions/{key}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

// -- Records tagged with their push key, as handed to the UI --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub key: String,
    pub time: String,
    pub activity: String,
}

impl ActivityEntry {
    pub fn from_record(key: String, record: ActivityRecord) -> Self {
        Self {
            key,
            time: record.time,
            activity: record.activity,
        }
    }

    /// `None` for records written with an unset or garbled time.
    pub fn parsed_time(&self) -> Option<ActivityTime> {
        self.time.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub key: String,
    pub name: String,
    pub download_url: String,
}

impl ImageEntry {
    pub fn from_record(key: String, record: ImageRecord) -> Self {
        Self {
            key,
            name: record.name,
            download_url: record.download_url,
        }
    }
}

// -- Activity time --

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("time '{0}' is not in HH:MM form")]
    Malformed(String),

    #[error("{hour:02}:{minute:02} is not a valid time of day")]
    OutOfRange { hour: u32, minute: u32 },
}

/// Wall-clock time of an activity, rendered as zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivityTime {
    hour: u8,
    minute: u8,
}

impl ActivityTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, TimeError> {
        if hour > 23 || minute > 59 {
            return Err(TimeError::OutOfRange { hour, minute });
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl From<chrono::NaiveTime> for ActivityTime {
    fn from(t: chrono::NaiveTime) -> Self {
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }
}

impl fmt::Display for ActivityTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ActivityTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TimeError::Malformed(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(malformed)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(malformed());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let hour: u32 = h.parse().map_err(|_| malformed())?;
        let minute: u32 = m.parse().map_err(|_| malformed())?;
        Self::new(hour, minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_zero_padded() {
        let t = ActivityTime::new(9, 5).unwrap();
        assert_eq!(t.to_string(), "09:05");
        assert_eq!("09:05".parse::<ActivityTime>().unwrap(), t);
    }

    #[test]
    fn unset_time_is_rejected() {
        assert!(":".parse::<ActivityTime>().is_err());
        assert!("undefined:undefined".parse::<ActivityTime>().is_err());
        assert!("9:00".parse::<ActivityTime>().is_err());
        assert_eq!(
            "24:00".parse::<ActivityTime>(),
            Err(TimeError::OutOfRange { hour: 24, minute: 0 })
        );
    }

    #[test]
    fn from_picker_time() {
        let picked = chrono::NaiveTime::from_hms_opt(7, 3, 59).unwrap();
        assert_eq!(ActivityTime::from(picked).to_string(), "07:03");
    }

    #[test]
    fn wire_names_match_stored_data() {
        let image = ImageRecord {
            name: "sunset".into(),
            download_url: "http://x/y".into(),
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["downloadURL"], "http://x/y");

        let m: MembershipRecord =
            serde_json::from_value(serde_json::json!({ "sessionId": "camp21" })).unwrap();
        assert_eq!(m.session_id, "camp21");

        let s = serde_json::to_value(SessionRecord::new("u1")).unwrap();
        assert_eq!(s, serde_json::json!({ "creator": { "uid": "u1" } }));
    }

    #[test]
    fn malformed_stored_time_is_kept_raw() {
        let entry = ActivityEntry::from_record(
            "k".into(),
            serde_json::from_value(serde_json::json!({ "time": ":", "activity": "Hike" })).unwrap(),
        );
        assert_eq!(entry.time, ":");
        assert_eq!(entry.parsed_time(), None);
    }
}
