//! Refresh intervals
//!
//! Jobs, workers and per-job history poll on fixed cadences; the runs page
//! lets the user pick one of five [`PollRate`]s, including off.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshInterval {
    Every(Duration),
    /// Fetch on subscribe, refresh and invalidation only
    Manual,
}

impl RefreshInterval {
    /// Zero means manual.
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            RefreshInterval::Manual
        } else {
            RefreshInterval::Every(Duration::from_millis(ms))
        }
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            RefreshInterval::Every(d) => Some(*d),
            RefreshInterval::Manual => None,
        }
    }

    /// The faster of two intervals; anything beats manual.
    pub fn fastest(self, other: Self) -> Self {
        match (self.period(), other.period()) {
            (Some(a), Some(b)) => RefreshInterval::Every(a.min(b)),
            (Some(_), None) => self,
            (None, _) => other,
        }
    }
}

/// Poll rates offered on the runs page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PollRate {
    Spammy,
    Fast,
    #[default]
    Normal,
    Chill,
    Off,
}

impl PollRate {
    pub const ALL: [PollRate; 5] = [
        PollRate::Spammy,
        PollRate::Fast,
        PollRate::Normal,
        PollRate::Chill,
        PollRate::Off,
    ];

    pub fn millis(&self) -> u64 {
        match self {
            PollRate::Spammy => 200,
            PollRate::Fast => 1_000,
            PollRate::Normal => 2_000,
            PollRate::Chill => 10_000,
            PollRate::Off => 0,
        }
    }

    pub fn from_millis(ms: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.millis() == ms)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PollRate::Spammy => "0.2s",
            PollRate::Fast => "1s",
            PollRate::Normal => "2s",
            PollRate::Chill => "10s",
            PollRate::Off => "Off",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PollRate::Spammy => "Spammy",
            PollRate::Fast => "Fast",
            PollRate::Normal => "Normal",
            PollRate::Chill => "Chill",
            PollRate::Off => "I'll do it myself",
        }
    }

    pub fn interval(&self) -> RefreshInterval {
        RefreshInterval::from_millis(self.millis())
    }
}

impl fmt::Display for PollRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown poll rate '{0}' (expected 0.2s, 1s, 2s, 10s or off)")]
pub struct UnknownPollRate(pub String);

impl FromStr for PollRate {
    type Err = UnknownPollRate;

    /// Accepts a label (`0.2s`, `10s`, `off`) or a millisecond count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        if let Ok(ms) = wanted.parse::<u64>() {
            return Self::from_millis(ms).ok_or_else(|| UnknownPollRate(s.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownPollRate(s.to_string()))
    }
}
