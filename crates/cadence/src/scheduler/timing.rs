/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Fire-time arithmetic for [`ScheduleSpec`]s.
//!
//! Used by the in-memory scheduler to answer `describe` the way a real
//! scheduler would. Calendar and cron rules are evaluated in the schedule's
//! timezone; intervals are anchored at the unix epoch plus their offset.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use croner::Cron;
use tracing::warn;

use super::spec::{CalendarSpec, IntervalSpec, ScheduleRange, ScheduleSpec};

/// Days scanned forward when a calendar rule does not pin the year.
const CALENDAR_HORIZON_DAYS: i64 = 5 * 366;

/// Returns up to `limit` fire times strictly after `after`, earliest first,
/// honouring the schedule's start and end bounds.
pub fn upcoming_fire_times(
    spec: &ScheduleSpec,
    after: DateTime<Utc>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    let tz: Tz = spec.time_zone_name.parse().unwrap_or(Tz::UTC);
    let cursor = match spec.start_at {
        Some(start) if start > after => start - Duration::nanoseconds(1),
        _ => after,
    };
    let end = spec.end_at;

    let mut times = Vec::new();
    for calendar in &spec.calendars {
        times.extend(calendar_times(calendar, &tz, cursor, end, limit));
    }
    for interval in &spec.intervals {
        times.extend(interval_times(interval, cursor, end, limit));
    }
    for expr in &spec.cron_expressions {
        times.extend(cron_times(expr, &tz, cursor, end, limit));
    }

    times.sort();
    times.dedup();
    times.truncate(limit);
    times
}

fn within_end(t: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
    end.map_or(true, |end| t <= end)
}

fn interval_times(
    interval: &IntervalSpec,
    cursor: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    let every = interval.every.as_secs() as i64;
    if every <= 0 {
        return Vec::new();
    }
    let offset = interval.offset.as_secs() as i64;
    let k = (cursor.timestamp() - offset).div_euclid(every) + 1;
    let mut out = Vec::new();
    let mut next = k * every + offset;
    while out.len() < limit {
        let Some(t) = DateTime::from_timestamp(next, 0) else {
            break;
        };
        if !within_end(t, end) {
            break;
        }
        out.push(t);
        next += every;
    }
    out
}

fn cron_times(
    expr: &str,
    tz: &Tz,
    cursor: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    let cron = match Cron::new(expr).with_seconds_optional().parse() {
        Ok(cron) => cron,
        Err(e) => {
            warn!(expr, error = %e, "Ignoring unparsable cron expression");
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    let mut local = cursor.with_timezone(tz);
    while out.len() < limit {
        let Ok(next) = cron.find_next_occurrence(&local, false) else {
            break;
        };
        let t = next.with_timezone(&Utc);
        if !within_end(t, end) {
            break;
        }
        out.push(t);
        local = next;
    }
    out
}

/// Expands range lists into sorted, de-duplicated values within `lo..=hi`.
/// An empty list yields `default`.
fn expand(ranges: &[ScheduleRange], default: &[i32], lo: i32, hi: i32) -> Vec<i32> {
    if ranges.is_empty() {
        return default.to_vec();
    }
    (lo..=hi).filter(|v| matches_any(ranges, *v)).collect()
}

fn matches_any(ranges: &[ScheduleRange], value: i32) -> bool {
    ranges.is_empty() || ranges.iter().any(|r| r.contains(value))
}

fn calendar_times(
    calendar: &CalendarSpec,
    tz: &Tz,
    cursor: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<DateTime<Utc>> {
    let seconds = expand(&calendar.second, &[0], 0, 59);
    let minutes = expand(&calendar.minute, &[0], 0, 59);
    let hours = expand(&calendar.hour, &[0], 0, 23);
    if seconds.is_empty() || minutes.is_empty() || hours.is_empty() {
        return Vec::new();
    }
    let last_year = calendar.year.iter().map(|r| r.end).max();

    let start_day: NaiveDate = cursor.with_timezone(tz).date_naive();
    let mut out = Vec::new();
    for offset in 0..CALENDAR_HORIZON_DAYS {
        let Some(day) = start_day.checked_add_signed(Duration::days(offset)) else {
            break;
        };
        if last_year.is_some_and(|y| day.year() > y) {
            break;
        }
        if !matches_any(&calendar.year, day.year())
            || !matches_any(&calendar.month, day.month() as i32)
            || !matches_any(&calendar.day_of_month, day.day() as i32)
            || !matches_any(
                &calendar.day_of_week,
                day.weekday().num_days_from_sunday() as i32,
            )
        {
            continue;
        }
        for &h in &hours {
            for &m in &minutes {
                for &s in &seconds {
                    let Some(naive) = day.and_hms_opt(h as u32, m as u32, s as u32) else {
                        continue;
                    };
                    // Wall-clock times skipped by a DST transition never fire.
                    let Some(local) = tz.from_local_datetime(&naive).earliest() else {
                        continue;
                    };
                    let t = local.with_timezone(&Utc);
                    if t <= cursor {
                        continue;
                    }
                    if !within_end(t, end) {
                        return out;
                    }
                    out.push(t);
                    if out.len() >= limit {
                        return out;
                    }
                }
            }
        }
    }
    out
}
