//! Read-side aggregation over attendance rows. Everything here is pure:
//! callers fetch the rows, these functions bucket and fold them. Summaries
//! are recomputed on every query and never cached.

use crate::model::attendance::AttendanceRecord;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;
use uuid::Uuid;

/// Workday window: arrivals after 09:15 are late, departures before 17:00
/// are early.
const WORK_START_HOUR: u32 = 9;
const LATE_GRACE_MINUTES: u32 = 15;
const WORK_END_HOUR: u32 = 17;

/// Daily durations are capped so one forgotten check-out cannot inflate a
/// month.
const MAX_DAY_HOURS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum DayStatus {
    Present,
    Late,
    Absent,
    Incomplete,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: DayStatus,
    pub work_duration_hours: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub month: u32,
    pub year: i32,
    pub total_days: u32,
    pub working_days: u32,
    pub present_days: u32,
    pub absent_days: i64,
    pub late_days: u32,
    pub early_departures: u32,
    pub total_work_hours: f64,
    pub attendance_rate: u32,
    pub daily_summary: Vec<DailySummary>,
}

/// Minimal user row the statistics need.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatsUser {
    pub id: Uuid,
    pub name: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub present_days: u32,
    pub absent_days: i64,
    pub late_days: u32,
    pub attendance_rate: u32,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStats {
    pub total_users: u32,
    pub present_days: u32,
    pub absent_days: i64,
    pub late_days: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub working_days: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_users: u32,
    pub attendance_rate: u32,
    pub present_days: u32,
    pub absent_days: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub period: PeriodStats,
    pub overall: OverallStats,
    // BTreeMap keeps department ordering stable across identical calls
    pub departments: BTreeMap<String, DepartmentStats>,
    pub users: Vec<UserStats>,
}

/// First and last calendar day of the target month, using the actual
/// days-in-month rather than a fixed approximation.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next_month.pred_opt()?))
}

/// Count of weekdays (Monday through Friday) in the inclusive range.
pub fn working_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    let mut working_days = 0;
    for day in start.iter_days() {
        if day > end {
            break;
        }
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            working_days += 1;
        }
    }
    working_days
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn rate(present: u32, working: u32) -> u32 {
    if working == 0 {
        return 0;
    }
    ((present as f64 / working as f64) * 100.0).round() as u32
}

fn is_late(check_in: DateTime<Utc>) -> bool {
    let t = check_in.time();
    t.hour() > WORK_START_HOUR
        || (t.hour() == WORK_START_HOUR && t.minute() > LATE_GRACE_MINUTES)
}

fn is_early_departure(check_out: DateTime<Utc>) -> bool {
    check_out.time().hour() < WORK_END_HOUR
}

/// Per-day and per-month summary for a single user's records, which must be
/// ordered by timestamp ascending.
pub fn monthly_summary(
    records: &[AttendanceRecord],
    year: i32,
    month: u32,
) -> Option<MonthlySummary> {
    let (start, end) = month_bounds(year, month)?;

    let mut by_day: HashMap<NaiveDate, Vec<&AttendanceRecord>> = HashMap::new();
    for record in records {
        by_day
            .entry(record.timestamp.date_naive())
            .or_default()
            .push(record);
    }

    let working_days = working_days_between(start, end);
    let mut present_days = 0u32;
    let mut late_days = 0u32;
    let mut early_departures = 0u32;
    let mut total_work_hours = 0.0f64;
    let mut daily_summary = Vec::with_capacity(end.day() as usize);

    for day in start.iter_days() {
        if day > end {
            break;
        }

        let day_records = by_day.get(&day).map(Vec::as_slice).unwrap_or(&[]);
        let first_check_in = day_records
            .iter()
            .find(|r| r.is_check_in())
            .map(|r| r.timestamp);
        let last_check_out = day_records
            .iter()
            .rev()
            .find(|r| r.is_check_out())
            .map(|r| r.timestamp);

        let mut work_duration_hours = 0.0;
        let status = match (first_check_in, last_check_out) {
            (Some(check_in), Some(check_out)) => {
                present_days += 1;

                let late = is_late(check_in);
                if late {
                    late_days += 1;
                }
                if is_early_departure(check_out) {
                    early_departures += 1;
                }

                let hours = (check_out - check_in).num_seconds() as f64 / 3600.0;
                let capped = hours.min(MAX_DAY_HOURS);
                total_work_hours += capped;
                work_duration_hours = round1(capped);

                if late { DayStatus::Late } else { DayStatus::Present }
            }
            (None, None) => DayStatus::Absent,
            _ => DayStatus::Incomplete,
        };

        daily_summary.push(DailySummary {
            date: day,
            check_in: first_check_in,
            check_out: last_check_out,
            status,
            work_duration_hours,
        });
    }

    Some(MonthlySummary {
        month,
        year,
        total_days: end.day(),
        working_days,
        present_days,
        absent_days: working_days as i64 - present_days as i64,
        late_days,
        early_departures,
        total_work_hours: round1(total_work_hours),
        attendance_rate: rate(present_days, working_days),
        daily_summary,
    })
}

/// Period statistics across all supplied users. A user counts as present on
/// any day with at least one record; late on any day whose first check-in is
/// past the grace window. Records must be ordered by timestamp ascending.
pub fn period_stats(
    users: &[StatsUser],
    records: &[AttendanceRecord],
    start: NaiveDate,
    end: NaiveDate,
) -> StatsReport {
    let working_days = working_days_between(start, end);

    let mut by_user: HashMap<Uuid, BTreeMap<NaiveDate, Vec<&AttendanceRecord>>> = HashMap::new();
    for record in records {
        by_user
            .entry(record.user_id)
            .or_default()
            .entry(record.timestamp.date_naive())
            .or_default()
            .push(record);
    }

    let empty = BTreeMap::new();
    let user_stats: Vec<UserStats> = users
        .iter()
        .map(|user| {
            let days = by_user.get(&user.id).unwrap_or(&empty);

            let present_days = days.len() as u32;
            let late_days = days
                .values()
                .filter(|day_records| {
                    day_records
                        .iter()
                        .find(|r| r.is_check_in())
                        .is_some_and(|r| is_late(r.timestamp))
                })
                .count() as u32;

            UserStats {
                user_id: user.id,
                name: user.name.clone(),
                department: user.department.clone(),
                present_days,
                absent_days: working_days as i64 - present_days as i64,
                late_days,
                attendance_rate: rate(present_days, working_days),
            }
        })
        .collect();

    let mut departments: BTreeMap<String, DepartmentStats> = BTreeMap::new();
    for stat in &user_stats {
        let dept = stat
            .department
            .clone()
            .unwrap_or_else(|| "Unassigned".to_string());
        let entry = departments.entry(dept).or_default();
        entry.total_users += 1;
        entry.present_days += stat.present_days;
        entry.absent_days += stat.absent_days;
        entry.late_days += stat.late_days;
    }

    let total_users = users.len() as u32;
    let total_present: u32 = user_stats.iter().map(|s| s.present_days).sum();
    let total_working = total_users * working_days;

    StatsReport {
        period: PeriodStats {
            start_date: start,
            end_date: end,
            working_days,
        },
        overall: OverallStats {
            total_users,
            attendance_rate: rate(total_present, total_working),
            present_days: total_present,
            absent_days: total_working as i64 - total_present as i64,
        },
        departments,
        users: user_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::STATUS_VALID;

    fn record(user_id: Uuid, kind: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.to_string(),
            timestamp: ts.parse().unwrap(),
            qr_id: "a3f9c2e1d4b5a6978877665544332211".to_string(),
            location: None,
            ip_address: None,
            device_info: None,
            status: STATUS_VALID.to_string(),
            notes: None,
        }
    }

    #[test]
    fn month_bounds_use_real_calendar() {
        let (start, end) = month_bounds(2024, 6).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());

        // leap February
        let (_, feb_end) = month_bounds(2024, 2).unwrap();
        assert_eq!(feb_end.day(), 29);

        // December wraps the year
        let (_, dec_end) = month_bounds(2023, 12).unwrap();
        assert_eq!(dec_end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());

        assert!(month_bounds(2024, 13).is_none());
    }

    #[test]
    fn june_2024_has_twenty_working_days() {
        let (start, end) = month_bounds(2024, 6).unwrap();
        assert_eq!(working_days_between(start, end), 20);
    }

    #[test]
    fn weekend_only_range_has_zero_working_days() {
        // Sat 2024-06-01 through Sun 2024-06-02
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(working_days_between(start, end), 0);
    }

    #[test]
    fn late_arrival_and_early_departure_are_flagged() {
        let user = Uuid::new_v4();
        let records = vec![
            record(user, "check-in", "2024-06-10T09:20:00Z"),
            record(user, "check-out", "2024-06-10T16:30:00Z"),
        ];

        let summary = monthly_summary(&records, 2024, 6).unwrap();
        assert_eq!(summary.present_days, 1);
        assert_eq!(summary.late_days, 1);
        assert_eq!(summary.early_departures, 1);
        assert_eq!(summary.absent_days, 19);
        assert_eq!(summary.attendance_rate, 5);
        // 7h10m, under the 8h cap, rounded to one decimal
        assert_eq!(summary.total_work_hours, 7.2);

        let day = &summary.daily_summary[9]; // June 10th
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(day.status, DayStatus::Late);
        assert_eq!(day.work_duration_hours, 7.2);
    }

    #[test]
    fn grace_window_boundary_is_not_late() {
        let user = Uuid::new_v4();
        let records = vec![
            record(user, "check-in", "2024-06-10T09:15:00Z"),
            record(user, "check-out", "2024-06-10T17:00:00Z"),
        ];

        let summary = monthly_summary(&records, 2024, 6).unwrap();
        assert_eq!(summary.late_days, 0);
        assert_eq!(summary.early_departures, 0);
        assert_eq!(summary.daily_summary[9].status, DayStatus::Present);
    }

    #[test]
    fn long_day_is_capped_at_eight_hours() {
        let user = Uuid::new_v4();
        let records = vec![
            record(user, "check-in", "2024-06-11T08:00:00Z"),
            record(user, "check-out", "2024-06-11T20:00:00Z"),
        ];

        let summary = monthly_summary(&records, 2024, 6).unwrap();
        assert_eq!(summary.total_work_hours, 8.0);
        assert_eq!(summary.daily_summary[10].work_duration_hours, 8.0);
    }

    #[test]
    fn check_in_without_check_out_is_incomplete() {
        let user = Uuid::new_v4();
        let records = vec![record(user, "check-in", "2024-06-12T09:00:00Z")];

        let summary = monthly_summary(&records, 2024, 6).unwrap();
        assert_eq!(summary.present_days, 0);
        assert_eq!(summary.daily_summary[11].status, DayStatus::Incomplete);
        assert_eq!(summary.daily_summary[11].work_duration_hours, 0.0);
    }

    #[test]
    fn empty_month_is_all_absent() {
        let summary = monthly_summary(&[], 2024, 6).unwrap();
        assert_eq!(summary.total_days, 30);
        assert_eq!(summary.working_days, 20);
        assert_eq!(summary.present_days, 0);
        assert_eq!(summary.absent_days, 20);
        assert_eq!(summary.attendance_rate, 0);
        assert_eq!(summary.daily_summary.len(), 30);
        assert!(
            summary
                .daily_summary
                .iter()
                .all(|d| d.status == DayStatus::Absent)
        );
    }

    #[test]
    fn multiple_records_use_first_in_and_last_out() {
        let user = Uuid::new_v4();
        let records = vec![
            record(user, "check-in", "2024-06-13T08:30:00Z"),
            record(user, "check-out", "2024-06-13T12:00:00Z"),
            record(user, "check-in", "2024-06-13T13:00:00Z"),
            record(user, "check-out", "2024-06-13T16:00:00Z"),
        ];

        let summary = monthly_summary(&records, 2024, 6).unwrap();
        let day = &summary.daily_summary[12];
        assert_eq!(day.check_in.unwrap().to_rfc3339(), "2024-06-13T08:30:00+00:00");
        assert_eq!(day.check_out.unwrap().to_rfc3339(), "2024-06-13T16:00:00+00:00");
        // 08:30 to 16:00 is 7.5 h
        assert_eq!(day.work_duration_hours, 7.5);
    }

    #[test]
    fn period_stats_groups_users_and_departments() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let users = vec![
            StatsUser {
                id: a,
                name: "Alice".to_string(),
                department: Some("Engineering".to_string()),
            },
            StatsUser {
                id: b,
                name: "Bob".to_string(),
                department: None,
            },
        ];

        // Mon 2024-06-03 through Fri 2024-06-07: 5 working days
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();

        let records = vec![
            record(a, "check-in", "2024-06-03T09:00:00Z"),
            record(a, "check-out", "2024-06-03T17:30:00Z"),
            record(a, "check-in", "2024-06-04T09:45:00Z"), // late
            record(a, "check-out", "2024-06-04T18:00:00Z"),
        ];

        let report = period_stats(&users, &records, start, end);
        assert_eq!(report.period.working_days, 5);

        // user rows come back in the order the caller supplied them
        let names: Vec<_> = report.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        let alice = &report.users[0];
        assert_eq!(alice.present_days, 2);
        assert_eq!(alice.late_days, 1);
        assert_eq!(alice.absent_days, 3);
        assert_eq!(alice.attendance_rate, 40);

        let bob = &report.users[1];
        assert_eq!(bob.present_days, 0);
        assert_eq!(bob.absent_days, 5);
        assert_eq!(bob.attendance_rate, 0);

        assert_eq!(report.departments["Engineering"].present_days, 2);
        assert_eq!(report.departments["Unassigned"].total_users, 1);

        assert_eq!(report.overall.total_users, 2);
        assert_eq!(report.overall.present_days, 2);
        assert_eq!(report.overall.absent_days, 8);
        assert_eq!(report.overall.attendance_rate, 20);
    }

    #[test]
    fn period_stats_with_no_users_has_zero_rate() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let report = period_stats(&[], &[], start, start);
        assert_eq!(report.overall.total_users, 0);
        assert_eq!(report.overall.attendance_rate, 0);
    }
}
