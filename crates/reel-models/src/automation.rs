//! Automation definitions and their posting schedule.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::platform::Platform;

/// How often an automation is allowed to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    EveryOtherDay,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::EveryOtherDay => "every_other_day",
            Frequency::Weekly => "weekly",
        }
    }

    /// Minimum time between two runs of the same automation.
    ///
    /// Each gap is a few hours shorter than the nominal period so a run that
    /// drifted late does not push the next one a whole period out.
    pub fn min_gap(&self) -> Duration {
        match self {
            Frequency::Daily => Duration::hours(20),
            Frequency::EveryOtherDay => Duration::hours(44),
            Frequency::Weekly => Duration::hours(164),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "daily" => Ok(Frequency::Daily),
            "every_other_day" | "alternate" => Ok(Frequency::EveryOtherDay),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(ModelError::UnknownFrequency(other.to_string())),
        }
    }
}

/// A wall-clock time of day (`HH:MM`) in the automation's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FireTime {
    hour: u8,
    minute: u8,
}

impl FireTime {
    pub fn new(hour: u8, minute: u8) -> ModelResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(ModelError::InvalidFireTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn to_naive_time(&self) -> NaiveTime {
        // hour/minute are range-checked on construction
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Parse a comma-joined list such as `"09:00, 18:30"`.
    ///
    /// Entries are sorted and deduplicated. Any invalid entry rejects the
    /// whole list so a typo is surfaced instead of silently dropped.
    pub fn parse_list(s: &str) -> ModelResult<Vec<FireTime>> {
        let mut times = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(FireTime::from_str)
            .collect::<ModelResult<Vec<_>>>()?;

        if times.is_empty() {
            return Err(ModelError::NoFireTimes);
        }

        times.sort();
        times.dedup();
        Ok(times)
    }
}

impl FromStr for FireTime {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidFireTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        FireTime::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for FireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Art style applied to every generated image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtStyle {
    pub name: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

/// Optional per-automation provider choices. `None` means the gateway default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A recurring content automation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Automation {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1))]
    pub user_id: String,

    /// Series the generated videos belong to
    #[validate(length(min = 1))]
    pub series_id: String,

    #[serde(default)]
    pub name: String,

    #[validate(length(min = 1))]
    pub niche: String,

    #[serde(default)]
    pub art_style: ArtStyle,

    pub voice_id: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub tone: String,

    /// Target video length in seconds
    #[validate(range(min = 15, max = 180))]
    pub duration_seconds: u32,

    #[serde(default)]
    pub providers: ProviderOverrides,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,

    #[serde(default)]
    pub target_platforms: Vec<Platform>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub frequency: Frequency,

    /// Comma-joined `HH:MM` fire times
    pub post_times: String,

    /// IANA timezone name
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Automation {
    /// Parsed fire times for this automation.
    pub fn fire_times(&self) -> ModelResult<Vec<FireTime>> {
        FireTime::parse_list(&self.post_times)
    }

    /// Fire times of an automation that passes field validation.
    pub fn schedulable_times(&self) -> ModelResult<Vec<FireTime>> {
        self.validate()
            .map_err(|e| ModelError::InvalidAutomation(e.to_string()))?;
        self.fire_times()
    }
}
