//! Detection of collision group boundaries between adjacent raw records.
//!
//! The format carries no explicit collision id. Consecutive records belong to the
//! same collision when they share the collision-level prefix, unless the vehicle
//! columns show that a new single-vehicle collision has started with identical
//! collision-level fields.

use std::ops::Range;

/// Bytes holding the collision-level columns (C_YEAR through C_TRAF).
pub const LENGTH_COLL: usize = 32;

const VEHICLE_ID: Range<usize> = 33..35;
const VEHICLE_TYPE: Range<usize> = 36..38;
const VEHICLE_YEAR: Range<usize> = 39..43;

const FIRST_VEHICLE: &[u8] = b"01";

/// Returns true when `cur` continues the collision that `prev` belongs to.
///
/// A new group starts when any of the following holds:
/// 1. the collision-level prefix differs,
/// 2. the vehicle sequence resets to `01` from anything else,
/// 3. both records are vehicle `01` but the vehicle type or model year changed.
#[must_use]
pub fn same_group(prev: &[u8], cur: &[u8]) -> bool {
    if !prefix_only_same_group(prev, cur) {
        return false;
    }
    let prev_first = &prev[VEHICLE_ID] == FIRST_VEHICLE;
    let cur_first = &cur[VEHICLE_ID] == FIRST_VEHICLE;
    if !prev_first && cur_first {
        return false;
    }
    if prev_first
        && cur_first
        && (prev[VEHICLE_TYPE] != cur[VEHICLE_TYPE] || prev[VEHICLE_YEAR] != cur[VEHICLE_YEAR])
    {
        return false;
    }
    true
}

/// Prefix comparison alone. Under-segments back-to-back single-vehicle collisions.
#[must_use]
pub fn prefix_only_same_group(prev: &[u8], cur: &[u8]) -> bool {
    prev[..LENGTH_COLL] == cur[..LENGTH_COLL]
}
