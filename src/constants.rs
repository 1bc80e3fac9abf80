/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

/// version of the filter.json metadata layout
pub const FILTER_META_VER: u64 = 1;

pub const DEFAULT_MIN_SUPPORT_READS: &str = "2";
pub const DEFAULT_THRESHOLD_METHOD: &str = "auto";
pub const DEFAULT_HARD_THRESHOLD: &str = "1";

/// a lower-support UMI is only merged into a higher-support
/// neighbor if low / high does not exceed this ratio.
pub const UMI_CORRECTION_RATIO: f64 = 0.1;

/// `auto`: the top 1% of barcodes are taken as confidently real,
/// and the bar is set at a tenth of the weakest of them.
pub const AUTO_PERCENTILE_DIVISOR: usize = 100;
pub const AUTO_THRESHOLD_DIVISOR: u64 = 10;

/// `otsu`: histogram resolution in log2 space (bin width 0.2).
pub const OTSU_BINS_PER_OCTAVE: f64 = 5.0;
pub const OTSU_EPSILON: f64 = 1e-9;

/// the smallest threshold ever applied to a reference.
pub const MIN_UMI_THRESHOLD: u64 = 1;

pub const SUM_COLUMN: &str = "sum_UMI";

pub const CORRECTED_COUNT_SUFFIX: &str = "corrected_UMI_count.json";
pub const FILTERED_TABLE_SUFFIX: &str = "filtered_UMI_tsne.csv";
pub const FILTERED_MTX_SUFFIX: &str = "filtered_counts.mtx";
pub const FILTERED_BARCODES_SUFFIX: &str = "filtered_barcodes.txt";
pub const FILTERED_REFS_SUFFIX: &str = "filtered_references.txt";
pub const METRICS_SUFFIX: &str = "metrics.json";
pub const OTSU_PLOT_SUFFIX: &str = "otsu.html";
pub const FILTER_META_FILE: &str = "filter.json";
