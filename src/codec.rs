//! Decoding of fixed-width collision records.
//!
//! A record is 22 comma-separated columns of fixed width. Columns are pulled out
//! in order; numeric columns that hold placeholder codes (`UU`, `XX`, `QQ`, `NN`)
//! decode to zero.

use memchr::memchr_iter;

use crate::config::RECORD_LEN;

/// Number of columns in a record.
pub const COLUMN_COUNT: usize = 22;

const COL_YEAR: usize = 0;
const COL_MONTH: usize = 1;
const COL_WEEKDAY: usize = 2;
const COL_SEVERITY: usize = 4;
const COL_VEHICLES: usize = 5;
const COL_LOCATION: usize = 7;
const COL_VEHICLE_ID: usize = 12;
const COL_VEHICLE_YEAR: usize = 14;
const COL_PERSON_ID: usize = 15;
const COL_SEX: usize = 16;
const COL_INJURY: usize = 19;

/// Vehicle sequence number used for pedestrians.
const PEDESTRIAN_VEHICLE: u8 = 99;

/// Date of a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    /// 1-12, 0 when unknown
    pub month: u8,
    /// 1-7, 0 when unknown
    pub weekday: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    fn from_code(code: &[u8]) -> Self {
        match code.first() {
            Some(b'M') => Self::Male,
            Some(b'F') => Self::Female,
            _ => Self::Other,
        }
    }
}

/// One decoded record: a person or vehicle involved in a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub date: Date,
    /// Road configuration code 1-12, 0 when not coded
    pub location: u8,
    pub gender: Gender,
    /// Vehicle model year, 0 when absent
    pub vehicle_year: u16,
    /// Vehicle sequence number within the collision, 0 when absent
    pub vehicle_seq: u8,
    /// Vehicles involved in the whole collision, 0 when unknown
    pub vehicle_count: u8,
    pub involves_vehicle: bool,
    pub involves_person: bool,
    /// The collision produced at least one fatality
    pub collision_fatal: bool,
    /// This person was killed
    pub killed: bool,
}

/// Decodes one record. `line` must be exactly [`RECORD_LEN`] bytes with the
/// terminator stripped.
#[must_use]
pub fn decode(line: &[u8]) -> Unit {
    debug_assert_eq!(line.len(), RECORD_LEN, "record width mismatch");

    let mut cols: [&[u8]; COLUMN_COUNT] = [&[]; COLUMN_COUNT];
    let mut start = 0;
    let mut col = 0;
    for comma in memchr_iter(b',', line) {
        if col == COLUMN_COUNT - 1 {
            break;
        }
        cols[col] = &line[start..comma];
        start = comma + 1;
        col += 1;
    }
    cols[col] = &line[start..];

    let vehicle_id = parse::<u8>(cols[COL_VEHICLE_ID]);
    Unit {
        date: Date {
            year: parse(cols[COL_YEAR]).unwrap_or(0),
            month: parse(cols[COL_MONTH]).unwrap_or(0),
            weekday: parse(cols[COL_WEEKDAY]).unwrap_or(0),
        },
        location: parse(cols[COL_LOCATION]).unwrap_or(0),
        gender: Gender::from_code(cols[COL_SEX]),
        vehicle_year: parse(cols[COL_VEHICLE_YEAR]).unwrap_or(0),
        vehicle_seq: vehicle_id.unwrap_or(0),
        vehicle_count: parse(cols[COL_VEHICLES]).unwrap_or(0),
        involves_vehicle: vehicle_id.is_some_and(|id| id != PEDESTRIAN_VEHICLE),
        involves_person: parse::<u8>(cols[COL_PERSON_ID]).is_some(),
        collision_fatal: cols[COL_SEVERITY] == b"1",
        killed: cols[COL_INJURY] == b"3",
    }
}

fn parse<T: lexical_core::FromLexical>(field: &[u8]) -> Option<T> {
    lexical_core::parse(field).ok()
}
