//! The five collision statistics: per-dataset partials, their reduction across
//! workers, and the final answer lines.

use std::cmp::Reverse;
use std::fmt;

use crate::codec::{Date, Gender, Unit};
use crate::config::TALLY_YEARS;
use crate::dataset::Dataset;
use crate::error::{CollisionError, Result};

/// Number of location buckets, codes 0 through 12.
pub const LOCATIONS: usize = 13;

/// Months in the tally grid.
pub const MONTHS: usize = 12;

/// Vehicle years at or below this are treated as unknown.
const PLAUSIBLE_VEHICLE_YEAR: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Worst month for fatal and nonfatal collisions
    MonthSeverity,
    /// Men and women killed
    GenderFatalities,
    /// Collision with the most vehicles
    MostVehicles,
    /// Vehicles as new as the crash year, and average vehicle age
    NewWrecks,
    /// Collisions per location code
    Locations,
}

impl Query {
    pub const ALL: [Query; 5] = [
        Self::MonthSeverity,
        Self::GenderFatalities,
        Self::MostVehicles,
        Self::NewWrecks,
        Self::Locations,
    ];

    /// Query number as used on the command line and in output tags.
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Self::MonthSeverity => 1,
            Self::GenderFatalities => 2,
            Self::MostVehicles => 3,
            Self::NewWrecks => 4,
            Self::Locations => 5,
        }
    }
}

impl TryFrom<u8> for Query {
    type Error = CollisionError;

    fn try_from(id: u8) -> Result<Self> {
        let query = Self::ALL.into_iter().find(|q| q.id() == id);
        query.ok_or_else(|| {
            let reason = format!("unknown query id {id}, expected 1-5");
            CollisionError::invalid_parameter("query", reason)
        })
    }
}

/// Fatal and nonfatal collision counts for one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub fatal: u64,
    pub nonfatal: u64,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.fatal += other.fatal;
        self.nonfatal += other.nonfatal;
    }
}

/// Collision counts by year offset and month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTally {
    pub first_year: u16,
    pub cells: [[Tally; MONTHS]; TALLY_YEARS],
}

impl MonthTally {
    #[must_use]
    pub fn new(first_year: u16) -> Self {
        Self {
            first_year,
            cells: [[Tally::default(); MONTHS]; TALLY_YEARS],
        }
    }

    /// Adds to the cell for `year`/`month` (1-based); dates outside the grid are ignored.
    pub fn add(&mut self, year: u16, month: u8, tally: Tally) {
        if let Some(cell) = self.cell_mut(year, month) {
            cell.add(tally);
        }
    }

    /// Every cell as `(year, month, tally)` in calendar order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u8, Tally)> + '_ {
        let first_year = self.first_year;
        self.cells.iter().enumerate().flat_map(move |(y, months)| {
            let year = first_year.saturating_add(y as u16);
            (1u8..).zip(months).map(move |(m, &t)| (year, m, t))
        })
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, _, t)| t.fatal + t.nonfatal).sum()
    }

    fn cell_mut(&mut self, year: u16, month: u8) -> Option<&mut Tally> {
        let y = usize::from(year.checked_sub(self.first_year)?);
        if y >= TALLY_YEARS || !(1..=MONTHS as u8).contains(&month) {
            return None;
        }
        Some(&mut self.cells[y][usize::from(month - 1)])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenderDeaths {
    pub men: u64,
    pub women: u64,
}

/// The collision with the most vehicles seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargestCollision {
    pub vehicles: u8,
    pub date: Date,
    pub location: u8,
    pub units: usize,
    /// Offset of the group's first unit within its dataset
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewWrecks {
    /// Units whose vehicle is as new as the crash year or newer
    pub new: u64,
    /// Sum of vehicle ages in years, counting the crash year itself
    pub age_sum: i64,
    /// Units with a known vehicle year
    pub aged: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocationCounts(pub [u64; LOCATIONS]);

/// One worker's contribution to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Partial {
    MonthSeverity(MonthTally),
    GenderFatalities(GenderDeaths),
    MostVehicles(Option<LargestCollision>),
    NewWrecks(NewWrecks),
    Locations(LocationCounts),
}

/// Runs `query` over one dataset.
#[must_use]
pub fn execute(query: Query, dataset: &Dataset, first_year: u16) -> Partial {
    match query {
        Query::MonthSeverity => Partial::MonthSeverity(month_tally(dataset, first_year)),
        Query::GenderFatalities => Partial::GenderFatalities(gender_fatalities(dataset)),
        Query::MostVehicles => Partial::MostVehicles(most_vehicles(dataset)),
        Query::NewWrecks => Partial::NewWrecks(new_wrecks(dataset)),
        Query::Locations => Partial::Locations(locations(dataset)),
    }
}

#[must_use]
pub fn month_tally(dataset: &Dataset, first_year: u16) -> MonthTally {
    let mut tally = MonthTally::new(first_year);
    for group in dataset.groups() {
        let date = group[0].date;
        let mut cell = Tally::default();
        if group.iter().any(|u| u.collision_fatal || u.killed) {
            cell.fatal = 1;
        } else {
            cell.nonfatal = 1;
        }
        tally.add(date.year, date.month, cell);
    }
    tally
}

#[must_use]
pub fn gender_fatalities(dataset: &Dataset) -> GenderDeaths {
    let mut deaths = GenderDeaths::default();
    for unit in dataset.units().iter().filter(|u| u.killed) {
        match unit.gender {
            Gender::Male => deaths.men += 1,
            Gender::Female => deaths.women += 1,
            Gender::Other => {}
        }
    }
    deaths
}

#[must_use]
pub fn most_vehicles(dataset: &Dataset) -> Option<LargestCollision> {
    let mut best: Option<LargestCollision> = None;
    for (i, group) in dataset.groups().enumerate() {
        let head: &Unit = &group[0];
        if best.is_some_and(|b| b.vehicles >= head.vehicle_count) {
            continue;
        }
        best = Some(LargestCollision {
            vehicles: head.vehicle_count,
            date: head.date,
            location: head.location,
            units: group.len(),
            offset: dataset.group_index()[i],
        });
    }
    best
}

#[must_use]
pub fn new_wrecks(dataset: &Dataset) -> NewWrecks {
    let mut stats = NewWrecks::default();
    for unit in dataset.units() {
        if unit.vehicle_year != 0 && unit.vehicle_year >= unit.date.year {
            stats.new += 1;
        }
        if unit.vehicle_year > PLAUSIBLE_VEHICLE_YEAR {
            let age = i64::from(unit.date.year) - i64::from(unit.vehicle_year) + 1;
            stats.age_sum += age;
            stats.aged += 1;
        }
    }
    stats
}

#[must_use]
pub fn locations(dataset: &Dataset) -> LocationCounts {
    let mut counts = LocationCounts::default();
    for group in dataset.groups() {
        let code = usize::from(group[0].location);
        counts.0[if code < LOCATIONS { code } else { 0 }] += 1;
    }
    counts
}

/// Order-independent accumulator for one query's partials.
#[derive(Debug, Clone)]
pub enum Reducer {
    MonthSeverity(MonthTally),
    GenderFatalities(GenderDeaths),
    /// Best collision so far, keyed by the worker that found it
    MostVehicles(Option<(usize, LargestCollision)>),
    NewWrecks(NewWrecks),
    Locations(LocationCounts),
}

impl Reducer {
    #[must_use]
    pub fn new(query: Query, first_year: u16) -> Self {
        match query {
            Query::MonthSeverity => Self::MonthSeverity(MonthTally::new(first_year)),
            Query::GenderFatalities => Self::GenderFatalities(GenderDeaths::default()),
            Query::MostVehicles => Self::MostVehicles(None),
            Query::NewWrecks => Self::NewWrecks(NewWrecks::default()),
            Query::Locations => Self::Locations(LocationCounts::default()),
        }
    }

    /// Folds one month cell streamed by a worker.
    pub fn add_cell(&mut self, year: u16, month: u8, tally: Tally) -> Result<()> {
        match self {
            Self::MonthSeverity(acc) => {
                acc.add(year, month, tally);
                Ok(())
            }
            _ => {
                let reason = "month cell for a non-tally query";
                Err(CollisionError::invalid_parameter("reply", reason))
            }
        }
    }

    /// Folds a partial produced by worker `worker`.
    pub fn add(&mut self, worker: usize, partial: Partial) -> Result<()> {
        match (self, partial) {
            (Self::MonthSeverity(acc), Partial::MonthSeverity(p)) => {
                for (year, month, tally) in p.iter() {
                    acc.add(year, month, tally);
                }
            }
            (Self::GenderFatalities(acc), Partial::GenderFatalities(p)) => {
                acc.men += p.men;
                acc.women += p.women;
            }
            (Self::MostVehicles(acc), Partial::MostVehicles(Some(p))) => {
                // Most vehicles first, then the earliest in file order.
                let rank = |w: usize, c: &LargestCollision| (Reverse(c.vehicles), w, c.offset);
                if acc.is_none_or(|(w, best)| rank(worker, &p) < rank(w, &best)) {
                    *acc = Some((worker, p));
                }
            }
            (Self::MostVehicles(_), Partial::MostVehicles(None)) => {}
            (Self::NewWrecks(acc), Partial::NewWrecks(p)) => {
                acc.new += p.new;
                acc.age_sum += p.age_sum;
                acc.aged += p.aged;
            }
            (Self::Locations(acc), Partial::Locations(p)) => {
                for (a, b) in acc.0.iter_mut().zip(p.0) {
                    *a += b;
                }
            }
            _ => {
                let reason = "partial does not match the running query";
                return Err(CollisionError::invalid_parameter("reply", reason));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn finish(self) -> Answer {
        match self {
            Self::MonthSeverity(tally) => {
                let mut worst_fatal: Option<(u16, u8, u64)> = None;
                let mut worst_injury: Option<(u16, u8, u64)> = None;
                for (year, month, t) in tally.iter() {
                    if t.fatal > 0 && worst_fatal.is_none_or(|(_, _, n)| t.fatal > n) {
                        worst_fatal = Some((year, month, t.fatal));
                    }
                    if t.nonfatal > 0 && worst_injury.is_none_or(|(_, _, n)| t.nonfatal > n) {
                        worst_injury = Some((year, month, t.nonfatal));
                    }
                }
                Answer::MonthSeverity {
                    fatal: worst_fatal.unwrap_or_default(),
                    injury: worst_injury.unwrap_or_default(),
                }
            }
            Self::GenderFatalities(d) => Answer::GenderFatalities(d),
            Self::MostVehicles(best) => Answer::MostVehicles(best.map(|(_, b)| b)),
            Self::NewWrecks(w) => Answer::NewWrecks(w),
            Self::Locations(c) => Answer::Locations(c),
        }
    }
}

/// Final, reduced result of one query. Displays as its output line.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// `(year, month, count)` of the worst fatal and worst nonfatal months
    MonthSeverity {
        fatal: (u16, u8, u64),
        injury: (u16, u8, u64),
    },
    GenderFatalities(GenderDeaths),
    MostVehicles(Option<LargestCollision>),
    NewWrecks(NewWrecks),
    Locations(LocationCounts),
}

impl GenderDeaths {
    /// Share of deaths that were men and women; both zero when nobody died.
    #[must_use]
    pub fn ratios(&self) -> (f64, f64) {
        let total = self.men + self.women;
        if total == 0 {
            return (0.0, 0.0);
        }
        (self.men as f64 / total as f64, self.women as f64 / total as f64)
    }
}

impl NewWrecks {
    #[must_use]
    pub fn new_rate(&self) -> f64 {
        if self.aged == 0 {
            0.0
        } else {
            self.new as f64 / self.aged as f64
        }
    }

    #[must_use]
    pub fn average_age(&self) -> f64 {
        if self.aged == 0 {
            0.0
        } else {
            self.age_sum as f64 / self.aged as f64
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MonthSeverity { fatal, injury } => write!(
                f,
                "$Q1,{},{},{},{},{},{}",
                fatal.0, fatal.1, fatal.2, injury.0, injury.1, injury.2
            ),
            Self::GenderFatalities(d) => {
                let (men, women) = d.ratios();
                write!(f, "$Q2,{},{},{men:.4},{women:.4}", d.men, d.women)
            }
            Self::MostVehicles(Some(c)) => write!(
                f,
                "$Q3,{},{},{},{},{}",
                c.vehicles, c.date.year, c.date.month, c.date.weekday, c.location
            ),
            Self::MostVehicles(None) => write!(f, "$Q3,0,0,0,0,0"),
            Self::NewWrecks(w) => {
                let (rate, age) = (w.new_rate(), w.average_age());
                write!(f, "$Q4,{},{rate:.4},{age:.2}", w.new)
            }
            Self::Locations(c) => {
                write!(f, "$Q5")?;
                for n in c.0 {
                    write!(f, ",{n}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::record;
    use crate::config::Layout;
    use crate::dataset::build;
    use rstest::rstest;
    use std::io::Cursor;

    /// Builds a dataset from record fixtures.
    fn dataset(lines: &[&str]) -> Dataset {
        let layout = Layout::default();
        let mut bytes = vec![b'H'; layout.header_len];
        bytes.extend_from_slice(b"\r\n");
        for fields in lines {
            bytes.extend_from_slice(record(fields).as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        let range = layout.data_start()..bytes.len() as u64;
        build(&mut Cursor::new(bytes), range, &layout).unwrap()
    }

    /// Two collisions in 2003-07 (one fatal), one in 2005-01, one with an unknown month.
    fn sample() -> Dataset {
        dataset(&[
            "2003,07,1,02,03,01,06,2003,01,M,3",
            "2003,07,1,02,03,01,06,2003,02,F,2",
            "2003,07,1,02,03,02,01,1990,01,F,3",
            "2003,07,2,01,05,01,06,1995,01,M,1",
            "2005,01,2,04,12,01,14,NNNN,01,M,2",
            "2005,01,2,04,12,02,06,2006,01,F,2",
            "2006,UU,2,04,QQ,01,06,2000,01,U,3",
        ])
    }

    fn cell(fatal: u64, nonfatal: u64) -> Tally {
        Tally { fatal, nonfatal }
    }

    #[rstest]
    #[case(1, Query::MonthSeverity)]
    #[case(3, Query::MostVehicles)]
    #[case(5, Query::Locations)]
    fn test_query_ids(#[case] id: u8, #[case] query: Query) {
        assert_eq!(Query::try_from(id).unwrap(), query);
        assert_eq!(query.id(), id);
    }

    #[test]
    fn test_unknown_query_id() {
        let result = Query::try_from(6);
        assert!(matches!(
            result,
            Err(CollisionError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_sample_groups() {
        assert_eq!(sample().group_count(), 4);
    }

    #[test]
    fn test_month_tally_counts_groups_with_known_months() {
        let ds = sample();
        let tally = month_tally(&ds, 1999);
        assert_eq!(tally.cells[4][6], cell(1, 1));
        assert_eq!(tally.cells[6][0], cell(0, 1));
        let known = ds
            .groups()
            .filter(|g| (1..=12).contains(&g[0].date.month))
            .count();
        assert_eq!(tally.total(), known as u64);
    }

    #[test]
    fn test_month_tally_ignores_years_outside_grid() {
        let ds = dataset(&["1998,05,2,01,01,01,06,1990,01,M,2"]);
        assert_eq!(month_tally(&ds, 1999).total(), 0);
    }

    #[test]
    fn test_month_tally_near_the_end_of_the_year_range() {
        let first_year = u16::MAX - 13;
        let tally = MonthTally::new(first_year);
        let (last_year, month, _) = tally.iter().last().unwrap();
        assert_eq!((last_year, month), (u16::MAX, 12));
        assert_eq!(tally.iter().count(), TALLY_YEARS * MONTHS);
    }

    #[test]
    fn test_gender_fatalities() {
        let ds = sample();
        let deaths = gender_fatalities(&ds);
        assert_eq!(deaths, GenderDeaths { men: 1, women: 1 });
        let killed = ds.units().iter().filter(|u| u.killed).count() as u64;
        assert!(deaths.men + deaths.women <= killed);
        let (m, w) = deaths.ratios();
        assert!((m + w - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_most_vehicles_prefers_first_on_tie() {
        let ds = sample();
        let best = most_vehicles(&ds).unwrap();
        assert_eq!(best.vehicles, 4);
        assert_eq!(best.date.year, 2005);
        assert_eq!(best.offset, 4);
        assert_eq!(best.units, 2);
    }

    #[test]
    fn test_new_wrecks() {
        let w = new_wrecks(&sample());
        // 2003 vehicle in 2003, 2006 vehicle in 2005
        assert_eq!(w.new, 3);
        // ages: 1, 1, 14, 9, 0, 7
        assert_eq!(w.aged, 6);
        assert_eq!(w.age_sum, 32);
    }

    #[test]
    fn test_locations_sum_to_group_count() {
        let ds = sample();
        let counts = locations(&ds);
        assert_eq!(counts.0[3], 1);
        assert_eq!(counts.0[5], 1);
        assert_eq!(counts.0[12], 1);
        assert_eq!(counts.0[0], 1);
        assert_eq!(counts.0.iter().sum::<u64>(), ds.group_count() as u64);
    }

    #[test]
    fn test_most_vehicles_reduction_is_order_independent() {
        let a = LargestCollision {
            vehicles: 7,
            date: Date::default(),
            location: 1,
            units: 3,
            offset: 10,
        };
        let b = LargestCollision { offset: 2, ..a };
        let mut forward = Reducer::new(Query::MostVehicles, 1999);
        forward.add(0, Partial::MostVehicles(Some(a))).unwrap();
        forward.add(1, Partial::MostVehicles(Some(b))).unwrap();
        let mut backward = Reducer::new(Query::MostVehicles, 1999);
        backward.add(1, Partial::MostVehicles(Some(b))).unwrap();
        backward.add(0, Partial::MostVehicles(None)).unwrap();
        backward.add(0, Partial::MostVehicles(Some(a))).unwrap();
        assert_eq!(forward.finish(), Answer::MostVehicles(Some(a)));
        assert_eq!(backward.finish(), Answer::MostVehicles(Some(a)));
    }

    #[test]
    fn test_mismatched_partial_rejected() {
        let mut reducer = Reducer::new(Query::Locations, 1999);
        let partial = Partial::NewWrecks(NewWrecks::default());
        assert!(reducer.add(0, partial).is_err());
        assert!(reducer.add_cell(2000, 1, Tally::default()).is_err());
    }

    #[test]
    fn test_month_answer_picks_earliest_worst_month() {
        let mut reducer = Reducer::new(Query::MonthSeverity, 1999);
        reducer.add_cell(2001, 3, cell(2, 5)).unwrap();
        reducer.add_cell(2000, 8, cell(2, 1)).unwrap();
        reducer.add_cell(2004, 2, cell(1, 9)).unwrap();
        let answer = reducer.finish();
        assert_eq!(answer.to_string(), "$Q1,2000,8,2,2004,2,9");
    }

    #[test]
    fn test_answer_lines() {
        let q2 = Answer::GenderFatalities(GenderDeaths { men: 3, women: 1 });
        assert_eq!(q2.to_string(), "$Q2,3,1,0.7500,0.2500");
        let q4 = Answer::NewWrecks(NewWrecks {
            new: 1,
            age_sum: 9,
            aged: 4,
        });
        assert_eq!(q4.to_string(), "$Q4,1,0.2500,2.25");
        assert_eq!(Answer::MostVehicles(None).to_string(), "$Q3,0,0,0,0,0");
        let mut counts = [0u64; LOCATIONS];
        counts[2] = 4;
        let q5 = Answer::Locations(LocationCounts(counts));
        assert_eq!(q5.to_string(), "$Q5,0,0,4,0,0,0,0,0,0,0,0,0,0");
        let empty = Reducer::new(Query::MonthSeverity, 1999).finish();
        assert_eq!(empty.to_string(), "$Q1,0,0,0,0,0,0");
    }
}
