// Core data structures for the simya crawler

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Exhibitor chain whose site/API is crawled (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    #[serde(rename = "CGV")]
    Cgv,
    Megabox,
    Lotte,
    Dtryx,
    TinyTicket,
    #[serde(rename = "KOFA")]
    Kofa,
    Moonhwain,
}

impl Chain {
    /// Get the wire/storage name used by the upstream registry
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cgv => "CGV",
            Self::Megabox => "Megabox",
            Self::Lotte => "Lotte",
            Self::Dtryx => "Dtryx",
            Self::TinyTicket => "TinyTicket",
            Self::Kofa => "KOFA",
            Self::Moonhwain => "Moonhwain",
        }
    }

    /// Get all known chains
    pub fn all() -> Vec<Self> {
        vec![
            Self::Cgv,
            Self::Megabox,
            Self::Lotte,
            Self::Dtryx,
            Self::TinyTicket,
            Self::Kofa,
            Self::Moonhwain,
        ]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cgv" => Ok(Self::Cgv),
            "megabox" => Ok(Self::Megabox),
            "lotte" => Ok(Self::Lotte),
            "dtryx" => Ok(Self::Dtryx),
            "tinyticket" => Ok(Self::TinyTicket),
            "kofa" => Ok(Self::Kofa),
            "moonhwain" => Ok(Self::Moonhwain),
            _ => Err(ParseError::UnknownChain(s.to_string())),
        }
    }
}

/// Validated `HH:MM` wall-clock time anchored to a play-date.
///
/// Hours may exceed 23: a `25:30` slot is an after-midnight showing that
/// still belongs to the previous day's schedule. This is the convention the
/// exhibitor sites themselves use, so it is preserved end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShowTime {
    hour: u8,
    minute: u8,
}

impl ShowTime {
    /// Parse a strict `HH:MM` string (two digits, colon, two digits)
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(ParseError::InvalidTime(s.to_string()));
        }
        if !bytes[0].is_ascii_digit()
            || !bytes[1].is_ascii_digit()
            || !bytes[3].is_ascii_digit()
            || !bytes[4].is_ascii_digit()
        {
            return Err(ParseError::InvalidTime(s.to_string()));
        }
        let hour = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
        let minute = (bytes[3] - b'0') * 10 + (bytes[4] - b'0');
        if minute >= 60 {
            return Err(ParseError::InvalidTime(s.to_string()));
        }
        Ok(Self { hour, minute })
    }

    /// Build from minutes since the play-date's midnight.
    ///
    /// Fails only when the result no longer fits the two-digit hour field.
    pub fn from_minutes(total: u32) -> Result<Self, ParseError> {
        let hour = total / 60;
        if hour > 99 {
            return Err(ParseError::InvalidTime(format!("{hour}:{:02}", total % 60)));
        }
        Ok(Self {
            hour: hour as u8,
            minute: (total % 60) as u8,
        })
    }

    /// Minutes since the play-date's midnight
    pub fn total_minutes(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    /// Advance by a runtime in minutes, preserving the 24+ hour convention
    /// (23:00 plus 90 minutes is 24:30, not 00:30).
    pub fn add_minutes(&self, minutes: u32) -> Result<Self, ParseError> {
        Self::from_minutes(self.total_minutes() + minutes)
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ShowTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ShowTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ShowTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShowTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// One scheduled showing of a film in one screen at one venue.
///
/// Constructed fresh by a source adapter for each observed showing and never
/// mutated afterwards; the store consumes it once via upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screening {
    pub id: String,
    pub provider: Chain,
    pub cinema_name: String,
    pub cinema_code: String,
    pub screen_name: String,
    pub movie_title: String,
    pub play_date: NaiveDate,
    pub start_dt: ShowTime,
    pub end_dt: ShowTime,
    pub crawl_ts: DateTime<Utc>,
    pub url: Option<String>,
    pub remain_seat_cnt: Option<u32>,
    pub total_seat_cnt: Option<u32>,
}

/// Identity tuple for deduplication/upsert: records sharing this key are the
/// same showing observed more than once, and the latest crawl wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScreeningKey<'a> {
    pub provider: Chain,
    pub cinema_code: &'a str,
    pub play_date: NaiveDate,
    pub screen_name: &'a str,
    pub start_dt: ShowTime,
}

impl Screening {
    /// Generate a fresh record id
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// The identity key used by the persistence upsert
    pub fn key(&self) -> ScreeningKey<'_> {
        ScreeningKey {
            provider: self.provider,
            cinema_code: &self.cinema_code,
            play_date: self.play_date,
            screen_name: &self.screen_name,
            start_dt: self.start_dt,
        }
    }
}

/// One physical theater location belonging to a chain.
///
/// Loaded once per run from the venue registry and held read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cinema {
    pub cinema_code: String,
    pub name: String,
    pub chain: Chain,
    pub latitude: f64,
    pub longitude: f64,
    /// Dtryx-specific brand code used to build request URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_cd: Option<String>,
    /// CGV-specific area code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub areacode: Option<String>,
}
