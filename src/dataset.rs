//! A worker's decoded records and the index of where each collision starts.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;

use crate::boundary::same_group;
use crate::codec::{decode, Unit};
use crate::config::Layout;
use crate::error::{CollisionError, Result};

/// Units of one byte range in file order, plus the offset of each group's first unit.
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    units: Vec<Unit>,
    groups: Vec<usize>,
}

impl Dataset {
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// First-unit offsets, strictly increasing.
    #[must_use]
    pub fn group_index(&self) -> &[usize] {
        &self.groups
    }

    /// Units of group `i`.
    #[must_use]
    pub fn group(&self, i: usize) -> &[Unit] {
        let start = self.groups[i];
        let end = self.groups.get(i + 1).copied().unwrap_or(self.units.len());
        &self.units[start..end]
    }

    /// Iterates groups in file order; every yielded slice is non-empty.
    pub fn groups(&self) -> impl Iterator<Item = &[Unit]> + '_ {
        (0..self.groups.len()).map(move |i| self.group(i))
    }
}

/// Reads every record in `range` from `source` and indexes its collision groups.
///
/// The first record of the range always opens a group; partitions are planned so
/// that this is never a mid-collision record.
pub fn build<R>(source: &mut R, range: Range<u64>, layout: &Layout) -> Result<Dataset>
where
    R: Read + Seek,
{
    layout.check_record_len()?;
    let at_start = |e: io::Error| seek_error(range.start, &e);
    let source_len = source.seek(SeekFrom::End(0)).map_err(at_start)?;
    if range.end > source_len || range.start > range.end {
        return Err(CollisionError::Seek {
            offset: range.start,
            reason: format!("range ends past a {source_len}-byte source"),
        });
    }
    source.seek(SeekFrom::Start(range.start)).map_err(at_start)?;

    let stride = layout.stride() as usize;
    let count = ((range.end - range.start) / layout.stride()) as usize;
    let mut dataset = Dataset {
        units: Vec::with_capacity(count),
        groups: Vec::new(),
    };
    let mut prev = vec![0u8; stride];
    let mut line = vec![0u8; stride];

    for i in 0..count {
        source.read_exact(&mut line).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                seek_error(range.start + (i * stride) as u64, &e)
            } else {
                CollisionError::Io(e)
            }
        })?;
        let record = &line[..layout.record_len];
        if i == 0 || !same_group(&prev[..layout.record_len], record) {
            dataset.groups.push(i);
        }
        dataset.units.push(decode(record));
        std::mem::swap(&mut prev, &mut line);
    }
    Ok(dataset)
}

fn seek_error(offset: u64, e: &io::Error) -> CollisionError {
    CollisionError::Seek {
        offset,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::prefix_only_same_group;
    use crate::codec::tests::record;
    use crate::partition::tests::synthetic_file;
    use std::io::Cursor;

    fn whole(bytes: &[u8]) -> Range<u64> {
        Layout::default().data_start()..bytes.len() as u64
    }

    #[test]
    fn test_build_indexes_groups() {
        let bytes = synthetic_file(&[2, 1, 3]);
        let layout = Layout::default();
        let dataset = build(&mut Cursor::new(&bytes), whole(&bytes), &layout).unwrap();
        assert_eq!(dataset.unit_count(), 6);
        assert_eq!(dataset.group_count(), 3);
        assert_eq!(dataset.group_index(), &[0, 2, 3]);
        let sizes: Vec<usize> = dataset.groups().map(<[Unit]>::len).collect();
        assert_eq!(sizes, vec![2, 1, 3]);
    }

    #[test]
    fn test_collisions_sharing_a_prefix_are_split() {
        // One prefix for all five lines: a two-vehicle collision, a second one whose
        // sequence restarts at 01, then a single-vehicle collision with another vehicle.
        let lines = [
            "2004,03,2,02,01,01,06,1999,01,M,2",
            "2004,03,2,02,01,01,06,1999,02,F,2",
            "2004,03,2,02,01,02,01,2002,01,M,2",
            "2004,03,2,02,01,01,14,2003,01,M,2",
            "2004,03,2,02,01,01,01,2010,01,M,2",
        ];
        let layout = Layout::default();
        let mut bytes = vec![b'H'; layout.header_len];
        bytes.extend_from_slice(b"\r\n");
        for fields in lines {
            bytes.extend_from_slice(record(fields).as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        let records: Vec<&[u8]> = bytes[layout.data_start() as usize..]
            .chunks(layout.stride() as usize)
            .map(|l| &l[..layout.record_len])
            .collect();
        let shared = |w: &[&[u8]]| prefix_only_same_group(w[0], w[1]);
        assert!(records.windows(2).all(shared));

        let dataset = build(&mut Cursor::new(&bytes), whole(&bytes), &layout).unwrap();
        assert_eq!(dataset.group_index(), &[0, 3, 4]);
        assert_eq!(dataset.group(1)[0].vehicle_year, 2003);
        assert_eq!(dataset.group(2)[0].vehicle_year, 2010);
    }

    #[test]
    fn test_build_sub_range() {
        let bytes = synthetic_file(&[2, 1, 3]);
        let layout = Layout::default();
        let start = layout.data_start() + 3 * layout.stride();
        let range = start..bytes.len() as u64;
        let dataset = build(&mut Cursor::new(&bytes), range, &layout).unwrap();
        assert_eq!(dataset.unit_count(), 3);
        assert_eq!(dataset.group_index(), &[0]);
        assert_eq!(dataset.group(0)[2].vehicle_seq, 3);
    }

    #[test]
    fn test_group_count_matches_boundary_transitions() {
        let sizes = [1, 3, 2, 2, 5, 1, 1, 4];
        let bytes = synthetic_file(&sizes);
        let layout = Layout::default();
        let dataset = build(&mut Cursor::new(&bytes), whole(&bytes), &layout).unwrap();

        let lines: Vec<&[u8]> = bytes[layout.data_start() as usize..]
            .chunks(layout.stride() as usize)
            .map(|l| &l[..layout.record_len])
            .collect();
        let transitions = lines.windows(2).filter(|w| !same_group(w[0], w[1])).count();
        assert_eq!(dataset.group_count(), transitions + 1);
        assert_eq!(dataset.group_count(), sizes.len());
        assert!(dataset.group_index().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_range() {
        let bytes = synthetic_file(&[1]);
        let layout = Layout::default();
        let dataset = build(&mut Cursor::new(&bytes), 147..147, &layout).unwrap();
        assert_eq!(dataset.unit_count(), 0);
        assert_eq!(dataset.group_count(), 0);
        assert_eq!(dataset.groups().count(), 0);
    }

    #[test]
    fn test_range_past_end_is_seek_error() {
        let bytes = synthetic_file(&[2]);
        let end = bytes.len() as u64 + 63;
        let result = build(&mut Cursor::new(&bytes), 147..end, &Layout::default());
        assert!(matches!(
            result,
            Err(CollisionError::Seek { offset: 147, .. })
        ));
    }

    #[test]
    fn test_foreign_record_width_rejected() {
        let bytes = synthetic_file(&[2]);
        let layout = Layout {
            record_len: 60,
            ..Layout::default()
        };
        let result = build(&mut Cursor::new(&bytes), whole(&bytes), &layout);
        assert!(matches!(
            result,
            Err(CollisionError::InvalidParameter { .. })
        ));
    }
}
