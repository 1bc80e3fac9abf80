/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use crate::count_table::RawCountTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupportFilterStats {
    /// molecules zeroed by this pass
    pub n_removed: usize,
    /// leaves visited, including those already at 0
    pub n_total: usize,
}

/// Zero out every molecule supported by fewer than `min_support_reads`
/// reads.  Molecules are never removed from the table, only set to 0,
/// and only molecules that go from a positive count to 0 are counted
/// as removed, so running the filter twice removes nothing the second
/// time.  A `min_support_reads` of 0 or less keeps everything.
pub fn filter_by_support(
    mut table: RawCountTable,
    min_support_reads: i64,
) -> (RawCountTable, SupportFilterStats) {
    let mut stats = SupportFilterStats::default();
    for g in table.groups_mut() {
        for m in g.molecules.iter_mut() {
            stats.n_total += 1;
            if min_support_reads > 0 && m.reads > 0 && m.reads < min_support_reads as u64 {
                m.reads = 0;
                stats.n_removed += 1;
            }
        }
    }
    (table, stats)
}
