//! Two-month publication windows: Jan-Feb, Mar-Apr, ... from 2009 on

use chrono::{Datelike, Months, NaiveDate, Utc};
use commonscount_core::{Plan, WorkItem};

pub const FIRST_YEAR: i32 = 2009;

/// `extra` keys on YouTube work items
pub const PUBLISHED_AFTER_KEY: &str = "published_after";
pub const PUBLISHED_BEFORE_KEY: &str = "published_before";
pub const INTERVAL_KEY: &str = "interval";

/// Inclusive date range of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Interval {
    /// Window starting on the first of `month`; `None` for invalid dates
    pub fn starting(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let end = start.checked_add_months(Months::new(2))?.pred_opt()?;
        Some(Self { start, end })
    }

    /// `2009-1` style label of the starting month
    pub fn label(&self) -> String {
        format!("{}-{}", self.start.year(), self.start.month())
    }

    /// RFC 3339 lower bound
    pub fn published_after(&self) -> String {
        format!("{}T00:00:00Z", self.start)
    }

    /// RFC 3339 upper bound, last second of the window
    pub fn published_before(&self) -> String {
        format!("{}T23:59:59Z", self.end)
    }
}

/// Every window starting in or before the month of `today`
pub fn intervals_until(today: NaiveDate) -> Vec<Interval> {
    let mut intervals = Vec::new();
    let (mut year, mut month) = (FIRST_YEAR, 1);
    while (year, month) <= (today.year(), today.month()) {
        let Some(interval) = Interval::starting(year, month) else {
            break;
        };
        intervals.push(interval);
        month += 2;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    intervals
}

/// One work item per window, all labelled with `license_type`
pub fn interval_plan(license_type: &str, today: NaiveDate) -> Plan {
    Plan::new(
        intervals_until(today)
            .into_iter()
            .map(|interval| {
                WorkItem::new(license_type)
                    .with_extra(INTERVAL_KEY, interval.label())
                    .with_extra(PUBLISHED_AFTER_KEY, interval.published_after())
                    .with_extra(PUBLISHED_BEFORE_KEY, interval.published_before())
            })
            .collect(),
    )
}

/// [`interval_plan`] up to the current UTC month
pub fn current_interval_plan(license_type: &str) -> Plan {
    interval_plan(license_type, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn february_end_tracks_leap_years() {
        assert_eq!(Interval::starting(2012, 1).unwrap().end, date(2012, 2, 29));
        assert_eq!(Interval::starting(2013, 1).unwrap().end, date(2013, 2, 28));
        assert_eq!(Interval::starting(2013, 11).unwrap().end, date(2013, 12, 31));
    }

    #[test]
    fn bounds_are_rfc3339() {
        let interval = Interval::starting(2009, 3).unwrap();
        assert_eq!(interval.published_after(), "2009-03-01T00:00:00Z");
        assert_eq!(interval.published_before(), "2009-04-30T23:59:59Z");
        assert_eq!(interval.label(), "2009-3");
    }

    #[test]
    fn windows_up_to_current_month() {
        // 2009: 6 windows, 2010 up to March: Jan and Mar
        let intervals = intervals_until(date(2010, 3, 15));
        assert_eq!(intervals.len(), 8);
        assert_eq!(intervals.last().unwrap().start, date(2010, 3, 1));

        // A window starting next month is not included yet
        assert_eq!(intervals_until(date(2010, 2, 28)).len(), 7);
    }

    #[test]
    fn nothing_before_first_year() {
        assert!(intervals_until(date(2008, 12, 31)).is_empty());
    }

    #[test]
    fn plan_items_carry_window() {
        let plan = interval_plan("licenses/by/3.0", date(2009, 4, 1));
        assert_eq!(plan.len(), 2);
        let second = plan.get(2).unwrap();
        assert_eq!(second.identifier, "licenses/by/3.0");
        assert_eq!(second.extra(INTERVAL_KEY), Some("2009-3"));
        assert_eq!(second.extra(PUBLISHED_BEFORE_KEY), Some("2009-04-30T23:59:59Z"));
    }
}
