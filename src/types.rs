use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cardinality axis a section executes over.
///
/// - `Once`: a single instance for the whole experiment.
/// - `Date`: one instance per start date.
/// - `Member`: one instance per (date, member).
/// - `Chunk`: one instance per (date, member, chunk).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RunningType {
    #[default]
    Once,
    Date,
    Member,
    Chunk,
}

impl RunningType {
    /// The axis an offset such as `SIM-1` walks along for a target of this
    /// running type, if any.
    pub fn offset_axis(self) -> Option<Axis> {
        match self {
            RunningType::Once => None,
            RunningType::Date => Some(Axis::Date),
            RunningType::Member => Some(Axis::Member),
            RunningType::Chunk => Some(Axis::Chunk),
        }
    }
}

impl fmt::Display for RunningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunningType::Once => "once",
            RunningType::Date => "date",
            RunningType::Member => "member",
            RunningType::Chunk => "chunk",
        };
        f.write_str(s)
    }
}

impl FromStr for RunningType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(RunningType::Once),
            "date" | "startdate" => Ok(RunningType::Date),
            "member" => Ok(RunningType::Member),
            "chunk" => Ok(RunningType::Chunk),
            other => Err(format!(
                "invalid running type: {other} (expected once, date, member or chunk)"
            )),
        }
    }
}

/// Axis collapsed by a synchronized chunk section.
///
/// - `Member`: one shared instance per (date, chunk) for all members.
/// - `Date`: one shared instance per chunk for all dates and members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronize {
    Date,
    Member,
}

/// One of the four coordinate axes of a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    Date,
    Member,
    Chunk,
    Split,
}

impl Axis {
    /// Outermost-first order used when evaluating `*_FROM` relationships.
    pub const OUTERMOST_FIRST: [Axis; 4] = [Axis::Date, Axis::Member, Axis::Chunk, Axis::Split];

    pub fn from_key(&self) -> &'static str {
        match self {
            Axis::Date => "DATES_FROM",
            Axis::Member => "MEMBERS_FROM",
            Axis::Chunk => "CHUNKS_FROM",
            Axis::Split => "SPLITS_FROM",
        }
    }

    pub fn to_key(&self) -> &'static str {
        match self {
            Axis::Date => "DATES_TO",
            Axis::Member => "MEMBERS_TO",
            Axis::Chunk => "CHUNKS_TO",
            Axis::Split => "SPLITS_TO",
        }
    }
}

/// Retry delay policy from `delay_retry_time`.
///
/// - `"N"`: fixed delay of N seconds.
/// - `"+N"`: linear, `fail_count * N + N` seconds.
/// - `"*N"`: geometric, N seconds compounded by x10 per retrial
///   (`N * 10^(fail_count - 1)`).
///
/// `"-1"` (or empty) disables the delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RetryDelay {
    Fixed(u64),
    Linear(u64),
    Geometric(u64),
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::Fixed(0)
    }
}

impl RetryDelay {
    /// Seconds to wait before the retrial numbered `fail_count`.
    pub fn delay_secs(&self, fail_count: u32) -> u64 {
        match *self {
            RetryDelay::Fixed(n) => n,
            RetryDelay::Linear(n) => n.saturating_mul(u64::from(fail_count)).saturating_add(n),
            RetryDelay::Geometric(n) => {
                let exp = fail_count.saturating_sub(1);
                10u64
                    .checked_pow(exp)
                    .map(|factor| n.saturating_mul(factor))
                    .unwrap_or(u64::MAX)
            }
        }
    }
}

impl fmt::Display for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDelay::Fixed(n) => write!(f, "{n}"),
            RetryDelay::Linear(n) => write!(f, "+{n}"),
            RetryDelay::Geometric(n) => write!(f, "*{n}"),
        }
    }
}

impl FromStr for RetryDelay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "-1" {
            return Ok(RetryDelay::Fixed(0));
        }

        let parse = |digits: &str| {
            digits
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid delay_retry_time: {s:?}"))
        };

        match s.chars().next() {
            Some('+') => parse(&s[1..]).map(RetryDelay::Linear),
            Some('*') => parse(&s[1..]).map(RetryDelay::Geometric),
            _ => parse(s).map(RetryDelay::Fixed),
        }
    }
}

impl TryFrom<String> for RetryDelay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RetryDelay> for String {
    fn from(value: RetryDelay) -> Self {
        value.to_string()
    }
}
