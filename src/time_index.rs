use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result, Stage};

/// Fixed width of one timestep.
///
/// Parsed from the short pandas-style aliases used in the input data
/// (`15min`, `15T`, `1h`, `1H`, `30s`, `1d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    seconds: i64,
}

impl Frequency {
    pub const QUARTER_HOUR: Frequency = Frequency { seconds: 900 };
    pub const HOUR: Frequency = Frequency { seconds: 3600 };

    pub fn from_seconds(seconds: i64) -> Result<Self> {
        if seconds <= 0 {
            return Err(DispatchError::configuration(
                Stage::TimeIndex,
                format!("frequency must be positive, got {seconds}s"),
            ));
        }
        if Duration::try_seconds(seconds).is_none() {
            return Err(DispatchError::configuration(
                Stage::TimeIndex,
                format!("frequency of {seconds}s is out of range"),
            ));
        }
        Ok(Self { seconds })
    }

    pub fn minutes(minutes: i64) -> Result<Self> {
        let seconds = minutes.checked_mul(60).ok_or_else(|| {
            DispatchError::configuration(
                Stage::TimeIndex,
                format!("frequency of {minutes}min is out of range"),
            )
        })?;
        Self::from_seconds(seconds)
    }

    pub fn as_seconds(&self) -> i64 {
        self.seconds
    }

    pub fn as_duration(&self) -> Duration {
        // range checked on construction
        Duration::try_seconds(self.seconds).unwrap_or(Duration::zero())
    }

    pub fn hours(&self) -> f64 {
        self.seconds as f64 / 3600.0
    }
}

impl FromStr for Frequency {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (count, unit) = s.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| {
                DispatchError::configuration(Stage::TimeIndex, format!("invalid frequency '{s}'"))
            })?
        };

        let unit_seconds = match unit {
            "s" | "S" | "sec" => 1,
            "min" | "T" | "m" => 60,
            "h" | "H" => 3600,
            "d" | "D" => 86_400,
            _ => {
                return Err(DispatchError::configuration(
                    Stage::TimeIndex,
                    format!("unknown frequency unit in '{s}'"),
                ))
            }
        };

        let seconds = count.checked_mul(unit_seconds).ok_or_else(|| {
            DispatchError::configuration(Stage::TimeIndex, format!("frequency '{s}' is out of range"))
        })?;
        Self::from_seconds(seconds)
    }
}

impl TryFrom<String> for Frequency {
    type Error = DispatchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.to_string()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3600 == 0 {
            write!(f, "{}h", s / 3600)
        } else if s % 60 == 0 {
            write!(f, "{}min", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

/// Ordered, equally spaced timestamps of one run.
///
/// Every timestamp up to [`TimeIndex::end`] is representable; construction
/// and deserialization both go through [`TimeIndex::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimeIndexRepr", into = "TimeIndexRepr")]
pub struct TimeIndex {
    start: NaiveDateTime,
    periods: usize,
    freq: Frequency,
    end: NaiveDateTime,
}

#[derive(Serialize, Deserialize)]
struct TimeIndexRepr {
    start: NaiveDateTime,
    periods: usize,
    freq: Frequency,
}

impl TryFrom<TimeIndexRepr> for TimeIndex {
    type Error = DispatchError;

    fn try_from(repr: TimeIndexRepr) -> Result<Self> {
        Self::new(repr.start, repr.periods, repr.freq)
    }
}

impl From<TimeIndex> for TimeIndexRepr {
    fn from(index: TimeIndex) -> Self {
        Self {
            start: index.start,
            periods: index.periods,
            freq: index.freq,
        }
    }
}

impl TimeIndex {
    pub fn new(start: NaiveDateTime, periods: usize, freq: Frequency) -> Result<Self> {
        if periods == 0 {
            return Err(DispatchError::configuration(
                Stage::TimeIndex,
                "time index needs at least one period",
            ));
        }
        let end = offset(start, freq, periods).ok_or_else(|| {
            DispatchError::configuration(
                Stage::TimeIndex,
                format!("{periods} periods of {freq} from {start} run past the supported date range"),
            )
        })?;
        Ok(Self {
            start,
            periods,
            freq,
            end,
        })
    }

    /// Build an index starting at midnight of `start_date` (`YYYY-MM-DD`).
    pub fn from_date(start_date: &str, periods: usize, freq: Frequency) -> Result<Self> {
        let date = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").map_err(|e| {
            DispatchError::configuration(
                Stage::TimeIndex,
                format!("invalid start date '{start_date}': {e}"),
            )
        })?;
        Self::new(date.and_time(chrono::NaiveTime::MIN), periods, freq)
    }

    pub fn len(&self) -> usize {
        self.periods
    }

    pub fn is_empty(&self) -> bool {
        self.periods == 0
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn freq(&self) -> Frequency {
        self.freq
    }

    pub fn get(&self, t: usize) -> Option<NaiveDateTime> {
        if t >= self.periods {
            return None;
        }
        offset(self.start, self.freq, t)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (0..self.periods).filter_map(|t| self.get(t))
    }

    /// End of the last interval; the last interval has the same width as the others.
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn interval_hours(&self) -> f64 {
        self.freq.hours()
    }

    pub fn steps_per_hour(&self) -> f64 {
        1.0 / self.freq.hours()
    }
}

/// `start + steps × freq`, or `None` when it leaves chrono's range
fn offset(start: NaiveDateTime, freq: Frequency, steps: usize) -> Option<NaiveDateTime> {
    let steps = i32::try_from(steps).ok()?;
    let span = freq.as_duration().checked_mul(steps)?;
    start.checked_add_signed(span)
}
