//! Utilization rollups over canonical records.
//!
//! Every table is keyed through a `BTreeMap`, so output order depends only on
//! the keys and never on the order records arrive in. Utilization is always
//! computed from summed booked/capacity counts; the day-of-week and season
//! tables additionally carry the mean of their days' utilizations.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::record::{CanonicalRecord, DayOfWeek, Season, Utilization};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    capacity: u64,
    booked: u64,
    members: usize,
}

impl Counts {
    fn add(&mut self, capacity: u64, booked: u64) {
        self.capacity += capacity;
        self.booked += booked;
        self.members += 1;
    }

    fn utilization(&self) -> Utilization {
        Utilization::from_counts(self.booked, self.capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourSlotRollup {
    pub location: String,
    pub start: DateTime<Tz>,
    pub bay_hours_offered: u64,
    pub bay_hours_sold: u64,
    pub records: usize,
    pub utilization: Utilization,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRollup {
    pub location: String,
    pub date: NaiveDate,
    pub day_of_week: DayOfWeek,
    pub bay_hours_offered: u64,
    pub bay_hours_sold: u64,
    pub slots: usize,
    pub utilization: Utilization,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowAverage {
    pub location: String,
    pub day_of_week: DayOfWeek,
    pub days: usize,
    pub avg_utilization: Utilization,
    pub bay_hours_offered: u64,
    pub bay_hours_sold: u64,
    pub utilization: Utilization,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonRollup {
    pub location: String,
    pub season: Season,
    pub days: usize,
    pub bay_hours_offered: u64,
    pub bay_hours_sold: u64,
    pub utilization: Utilization,
    pub avg_daily_utilization: Utilization,
}

/// One point of the daily utilization chart input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalityPoint {
    pub location: String,
    pub date: NaiveDate,
    pub utilization: Utilization,
    pub season: Season,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rollups {
    pub hours: Vec<HourSlotRollup>,
    pub days: Vec<DayRollup>,
    pub day_of_week: Vec<DowAverage>,
    pub seasons: Vec<SeasonRollup>,
}

impl Rollups {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalRecord>,
    {
        let mut by_slot: BTreeMap<(String, DateTime<Tz>), Counts> = BTreeMap::new();
        for record in records {
            by_slot
                .entry((record.location.clone(), record.timestamp))
                .or_default()
                .add(u64::from(record.capacity), u64::from(record.booked));
        }

        let hours: Vec<HourSlotRollup> = by_slot
            .into_iter()
            .map(|((location, start), counts)| HourSlotRollup {
                location,
                start,
                bay_hours_offered: counts.capacity,
                bay_hours_sold: counts.booked,
                records: counts.members,
                utilization: counts.utilization(),
            })
            .collect();

        let days = roll_up_days(&hours);
        let day_of_week = roll_up_day_of_week(&days);
        let seasons = roll_up_seasons(&days);

        Self {
            hours,
            days,
            day_of_week,
            seasons,
        }
    }

    pub fn seasonality_series(&self) -> Vec<SeasonalityPoint> {
        self.days
            .iter()
            .map(|day| SeasonalityPoint {
                location: day.location.clone(),
                date: day.date,
                utilization: day.utilization,
                season: Season::of_date(day.date),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }
}

fn roll_up_days(hours: &[HourSlotRollup]) -> Vec<DayRollup> {
    let mut by_day: BTreeMap<(&str, NaiveDate), Counts> = BTreeMap::new();
    for hour in hours {
        by_day
            .entry((hour.location.as_str(), hour.start.date_naive()))
            .or_default()
            .add(hour.bay_hours_offered, hour.bay_hours_sold);
    }

    by_day
        .into_iter()
        .map(|((location, date), counts)| DayRollup {
            location: location.to_string(),
            date,
            day_of_week: DayOfWeek::of_date(date),
            bay_hours_offered: counts.capacity,
            bay_hours_sold: counts.booked,
            slots: counts.members,
            utilization: counts.utilization(),
        })
        .collect()
}

/// Day-level groups: summed counts plus each member day's utilization.
type DayGroups<'a, K> = BTreeMap<(&'a str, K), (Counts, Vec<Utilization>)>;

fn group_days<'a, K, F>(days: &'a [DayRollup], key: F) -> DayGroups<'a, K>
where
    K: Ord,
    F: Fn(&DayRollup) -> K,
{
    let mut groups: DayGroups<'a, K> = BTreeMap::new();
    for day in days {
        let (counts, utilizations) = groups
            .entry((day.location.as_str(), key(day)))
            .or_default();
        counts.add(day.bay_hours_offered, day.bay_hours_sold);
        utilizations.push(day.utilization);
    }
    groups
}

fn roll_up_day_of_week(days: &[DayRollup]) -> Vec<DowAverage> {
    group_days(days, |day| day.day_of_week)
        .into_iter()
        .map(|((location, day_of_week), (counts, utilizations))| DowAverage {
            location: location.to_string(),
            day_of_week,
            days: counts.members,
            avg_utilization: Utilization::mean(utilizations),
            bay_hours_offered: counts.capacity,
            bay_hours_sold: counts.booked,
            utilization: counts.utilization(),
        })
        .collect()
}

fn roll_up_seasons(days: &[DayRollup]) -> Vec<SeasonRollup> {
    group_days(days, |day| Season::of_date(day.date))
        .into_iter()
        .map(|((location, season), (counts, utilizations))| SeasonRollup {
            location: location.to_string(),
            season,
            days: counts.members,
            bay_hours_offered: counts.capacity,
            bay_hours_sold: counts.booked,
            utilization: counts.utilization(),
            avg_daily_utilization: Utilization::mean(utilizations),
        })
        .collect()
}
