use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive calendar range used to bound every series query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The lower bound used when the caller gives no start date.
    pub fn earliest() -> NaiveDate {
        DateTime::<Utc>::UNIX_EPOCH.date_naive()
    }

    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Fills in missing bounds: 1970-01-01 for the start, today's local date for the end.
    ///
    /// A range whose start is after its end is kept as-is; it simply matches nothing.
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start: start.unwrap_or_else(Self::earliest),
            end: end.unwrap_or_else(|| Local::now().date_naive()),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
