//! Validity intervals and the versioning rules for temporal edges.
//!
//! A temporal edge is true in the real world over a half-open interval
//! `[valid_from, valid_to)`. An absent `valid_to` means the fact is still
//! true and the interval extends to +∞.
//!
//! For one `(source, target, relation_type)` triple the stored intervals are
//! pairwise disjoint and versions run `1, 2, 3, ...` in insertion order.
//! [`plan_temporal_write`] decides how a new interval joins an existing
//! history under a [`ConflictPolicy`]; both storage backends execute the
//! plan inside their write transaction.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use factgraph::models::ValidityInterval;
//!
//! let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
//! let until = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
//! let open = ValidityInterval::open_ended(from);
//! let closed = ValidityInterval::new(from, Some(until)).unwrap();
//!
//! assert!(open.contains(until));
//! assert!(!closed.contains(until)); // end is exclusive
//! assert!(open.overlaps(&closed));
//! ```

use super::EdgeId;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval over which a temporal edge holds, `[valid_from, valid_to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityInterval {
    /// Start of validity (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of validity (exclusive), `None` while still valid.
    pub valid_to: Option<DateTime<Utc>>,
}

impl ValidityInterval {
    /// Creates an interval, truncating both ends to millisecond precision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `valid_to` is not after `valid_from`.
    pub fn new(valid_from: DateTime<Utc>, valid_to: Option<DateTime<Utc>>) -> Result<Self> {
        let valid_from = valid_from.trunc_subsecs(3);
        let valid_to = valid_to.map(|t| t.trunc_subsecs(3));
        if let Some(end) = valid_to
            && end <= valid_from
        {
            return Err(Error::InvalidInput(format!(
                "valid_to ({end}) must be after valid_from ({valid_from})"
            )));
        }
        Ok(Self {
            valid_from,
            valid_to,
        })
    }

    /// Creates an interval that is still valid.
    #[must_use]
    pub fn open_ended(valid_from: DateTime<Utc>) -> Self {
        Self {
            valid_from: valid_from.trunc_subsecs(3),
            valid_to: None,
        }
    }

    /// Returns true if the interval has no end.
    #[must_use]
    pub const fn is_open_ended(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Checks if `at` falls inside the interval.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.valid_from && self.valid_to.is_none_or(|end| at < end)
    }

    /// Checks if two intervals share at least one instant.
    ///
    /// Intervals that merely touch (`a.valid_to == b.valid_from`) do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let starts_before_other_ends = other.valid_to.is_none_or(|end| self.valid_from < end);
        let other_starts_before_end = self.valid_to.is_none_or(|end| other.valid_from < end);
        starts_before_other_ends && other_starts_before_end
    }

    /// Ends this interval at `end`.
    #[must_use]
    pub const fn close_at(self, end: DateTime<Utc>) -> Self {
        Self {
            valid_from: self.valid_from,
            valid_to: Some(end),
        }
    }
}

impl fmt::Display for ValidityInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self.valid_from.to_rfc3339();
        match self.valid_to {
            Some(end) => write!(f, "[{from}, {})", end.to_rfc3339()),
            None => write!(f, "[{from}, ∞)"),
        }
    }
}

/// Temporal metadata carried by a versioned edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalBounds {
    /// Validity interval.
    #[serde(flatten)]
    pub interval: ValidityInterval,
    /// Version within the edge's triple, starting at 1.
    pub version: u32,
}

/// What to do when a new temporal edge overlaps an existing version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Fail with [`Error::TemporalConflict`].
    #[default]
    Reject,
    /// Close the version that started earlier at the new `valid_from`.
    ///
    /// Overlaps with versions starting at or after the new `valid_from`
    /// are still rejected.
    Supersede,
}

impl ConflictPolicy {
    /// Returns the policy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Supersede => "supersede",
        }
    }

    /// Parses a policy name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "supersede" | "close" => Some(Self::Supersede),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            Error::InvalidInput(format!(
                "unknown conflict policy '{s}' (expected reject or supersede)"
            ))
        })
    }
}

/// One stored version of a temporal triple, as seen by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSlot {
    /// Edge holding this version.
    pub edge_id: EdgeId,
    /// Version number.
    pub version: u32,
    /// Stored interval.
    pub interval: ValidityInterval,
}

/// Outcome of planning a temporal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalPlan {
    /// Insert a new version, optionally closing an earlier one first.
    Insert {
        /// Version to assign to the new edge.
        version: u32,
        /// Edge whose `valid_to` must be set before inserting.
        close: Option<(EdgeId, DateTime<Utc>)>,
    },
    /// The write overlaps `version` and must be rejected.
    Conflict {
        /// Lowest overlapping version.
        version: u32,
    },
}

/// Decides how `proposed` joins the `existing` versions of one triple.
///
/// The next version is always `max(existing) + 1`. Under
/// [`ConflictPolicy::Supersede`] an overlapping version is closed only if it
/// starts strictly before `proposed`; since stored intervals are disjoint at
/// most one version can qualify.
#[must_use]
pub fn plan_temporal_write(
    existing: &[VersionSlot],
    proposed: &ValidityInterval,
    policy: ConflictPolicy,
) -> TemporalPlan {
    let version = existing.iter().map(|s| s.version).max().unwrap_or(0) + 1;

    let mut overlapping: Vec<&VersionSlot> = existing
        .iter()
        .filter(|slot| slot.interval.overlaps(proposed))
        .collect();
    overlapping.sort_by_key(|slot| slot.version);

    let Some(first) = overlapping.first() else {
        return TemporalPlan::Insert {
            version,
            close: None,
        };
    };

    match policy {
        ConflictPolicy::Reject => TemporalPlan::Conflict {
            version: first.version,
        },
        ConflictPolicy::Supersede => {
            if let Some(blocking) = overlapping
                .iter()
                .find(|slot| slot.interval.valid_from >= proposed.valid_from)
            {
                return TemporalPlan::Conflict {
                    version: blocking.version,
                };
            }
            TemporalPlan::Insert {
                version,
                close: Some((first.edge_id, proposed.valid_from)),
            }
        },
    }
}

/// Returns the current time at the millisecond precision the stores persist.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Converts stored epoch milliseconds back to a timestamp.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the value is out of range.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| Error::OperationFailed {
        operation: "decode_timestamp".to_string(),
        cause: format!("timestamp out of range: {millis}"),
    })
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (UTC midnight).
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if neither format matches.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "invalid timestamp '{s}' (expected RFC 3339 or YYYY-MM-DD)"
            ))
        })
}
