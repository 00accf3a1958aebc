//! Splitting the record area of a file into group-aligned worker ranges.

use std::ops::Range;

use log::{debug, info, warn};

use crate::boundary::same_group;
use crate::config::Layout;
use crate::error::{CollisionError, Result};

/// Records skipped past an approximate cut before the planner complains.
const LONG_SCAN: u64 = 64;

/// Computes one absolute start offset per worker.
///
/// Worker 0 starts right after the header. Every later worker gets an even share of
/// what is left, rounded up to a record boundary and then pushed forward past the
/// rest of whatever collision group the cut landed in.
pub fn plan(bytes: &[u8], layout: &Layout, workers: usize) -> Result<Vec<u64>> {
    if workers == 0 {
        return Err(CollisionError::invalid_parameter("workers", "must be > 0"));
    }
    let total_len = bytes.len() as u64;
    layout.validate(total_len)?;

    let data_start = layout.data_start();
    let stride = layout.stride();
    let mut starts = Vec::with_capacity(workers);
    starts.push(data_start);

    for i in 1..workers {
        let prev = starts[i - 1];
        let share = (total_len - prev) / (workers - i + 1) as u64;
        let aligned = share.div_ceil(stride).max(1) * stride;
        let approx = prev + aligned;

        let mut cut = approx;
        loop {
            if cut >= total_len {
                return Err(CollisionError::Seek {
                    offset: cut,
                    reason: format!("partition for worker {i} runs past end of data"),
                });
            }
            let prev_record = record_at(bytes, layout, cut - stride);
            if !same_group(prev_record, record_at(bytes, layout, cut)) {
                break;
            }
            cut += stride;
        }

        let skipped = (cut - approx) / stride;
        if skipped > LONG_SCAN {
            warn!("worker {i}: cut moved {skipped} records past its approximate offset {approx}");
        }
        debug!("worker {i}: approximate offset {approx}, start {cut}, {skipped} skipped");
        starts.push(cut);
    }

    let records = layout.record_count(total_len);
    info!("planned {workers} partitions over {records} records");
    Ok(starts)
}

/// Turns start offsets into half-open byte ranges ending at the next start or EOF.
#[must_use]
pub fn ranges(starts: &[u64], total_len: u64) -> Vec<Range<u64>> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| start..range_end(starts, i, total_len))
        .collect()
}

/// End of worker `index`'s range, derived from its neighbour.
#[must_use]
pub fn range_end(starts: &[u64], index: usize, total_len: u64) -> u64 {
    starts.get(index + 1).copied().unwrap_or(total_len)
}

fn record_at<'a>(bytes: &'a [u8], layout: &Layout, offset: u64) -> &'a [u8] {
    let start = offset as usize;
    &bytes[start..start + layout.record_len]
}
