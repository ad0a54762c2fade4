//! Reporting period types.
//!
//! This module defines [`PeriodKey`], the normalized reporting period attached
//! to every fact, and [`PeriodSelector`], the caller-facing period request.
//!
//! Two facts are period-aligned only when their [`PeriodKey`] *and* filing
//! reference match exactly; a matching fiscal label alone is not enough.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// A normalized reporting period: fiscal year/quarter plus the explicit
/// period end date reported in the filing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodKey {
    /// Fiscal year (e.g. 2024).
    pub fiscal_year: i32,
    /// Fiscal quarter (1-4), `None` for annual periods.
    pub fiscal_quarter: Option<u8>,
    /// End date of the reporting period.
    pub end_date: NaiveDate,
}

impl PeriodKey {
    /// Creates an annual period key.
    #[must_use]
    pub const fn annual(fiscal_year: i32, end_date: NaiveDate) -> Self {
        Self {
            fiscal_year,
            fiscal_quarter: None,
            end_date,
        }
    }

    /// Creates a quarterly period key.
    #[must_use]
    pub const fn quarterly(fiscal_year: i32, quarter: u8, end_date: NaiveDate) -> Self {
        Self {
            fiscal_year,
            fiscal_quarter: Some(quarter),
            end_date,
        }
    }

    /// Returns the fiscal label, e.g. `2024-Q3` or `2024-FY`.
    #[must_use]
    pub fn label(&self) -> String {
        match self.fiscal_quarter {
            Some(q) => format!("{}-Q{q}", self.fiscal_year),
            None => format!("{}-FY", self.fiscal_year),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ended {})", self.label(), self.end_date)
    }
}

/// A caller-facing period request.
///
/// `Latest` prefers the most recent complete filing; `Exact` requires an
/// exact fiscal-period match and never degrades to a near period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodSelector {
    /// The most recent filing that satisfies all required concepts.
    #[default]
    Latest,
    /// An exact fiscal period, e.g. `2024-Q3` or `2024` (annual).
    Exact {
        /// Requested fiscal year.
        fiscal_year: i32,
        /// Requested fiscal quarter, `None` for annual.
        fiscal_quarter: Option<u8>,
    },
}

impl PeriodSelector {
    /// True if the given period key satisfies this selector exactly.
    ///
    /// `Latest` matches any period; recency ordering is the aligner's job.
    #[must_use]
    pub fn matches(&self, key: &PeriodKey) -> bool {
        match self {
            Self::Latest => true,
            Self::Exact {
                fiscal_year,
                fiscal_quarter,
            } => key.fiscal_year == *fiscal_year && key.fiscal_quarter == *fiscal_quarter,
        }
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Exact {
                fiscal_year,
                fiscal_quarter: Some(q),
            } => write!(f, "{fiscal_year}-Q{q}"),
            Self::Exact { fiscal_year, .. } => write!(f, "{fiscal_year}"),
        }
    }
}

impl FromStr for PeriodSelector {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }

        let invalid = || EngineError::InvalidPeriod(s.to_string());

        match s.split_once(['-', 'q', 'Q']) {
            // "YYYY-Qn" or "YYYY-n"
            Some((year, quarter)) => {
                let fiscal_year: i32 = year.parse().map_err(|_| invalid())?;
                let quarter = quarter.trim_start_matches(['q', 'Q']);
                let fiscal_quarter: u8 = quarter.parse().map_err(|_| invalid())?;
                if !(1..=4).contains(&fiscal_quarter) {
                    return Err(invalid());
                }
                Ok(Self::Exact {
                    fiscal_year,
                    fiscal_quarter: Some(fiscal_quarter),
                })
            }
            // "YYYY" selects the annual filing
            None => {
                let fiscal_year: i32 = s.parse().map_err(|_| invalid())?;
                if !(1900..=2200).contains(&fiscal_year) {
                    return Err(invalid());
                }
                Ok(Self::Exact {
                    fiscal_year,
                    fiscal_quarter: None,
                })
            }
        }
    }
}
