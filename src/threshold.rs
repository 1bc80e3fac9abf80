/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use crate::aggregate::RefBarcodeCounts;
use crate::constants as cfconst;
use crate::error::{FilterError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// How the per-reference UMI threshold is chosen.  The method is a
/// run-wide setting; the threshold it yields differs per reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThresholdMethod {
    // a tenth of the count found at the 99th
    // percentile of the reference's barcodes
    Auto,
    // the Otsu split of the log2 count
    // histogram of the reference's barcodes
    Otsu,
    // a fixed, user-provided value
    Hard(u64),
}

impl ThresholdMethod {
    /// Resolve a method name (`auto`, `otsu` or `hard`) into a method.
    /// `hard_threshold` is only used by `hard`.
    pub fn from_config(method: &str, hard_threshold: u64) -> Result<Self> {
        match method.to_ascii_lowercase().as_str() {
            "auto" => Ok(ThresholdMethod::Auto),
            "otsu" => Ok(ThresholdMethod::Otsu),
            "hard" => Ok(ThresholdMethod::Hard(hard_threshold)),
            _ => Err(FilterError::Configuration(format!(
                "unsupported UMI threshold method `{}`; expected one of otsu, auto, hard",
                method
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMethod::Auto => "auto",
            ThresholdMethod::Otsu => "otsu",
            ThresholdMethod::Hard(_) => "hard",
        }
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The log2-count histogram used by the `otsu` method, along with
/// the split that was chosen on it.
#[derive(Debug, Clone, PartialEq)]
pub struct OtsuHistogram {
    /// number of barcodes per bin; bin `i` covers log2 counts in
    /// `[i / bins_per_octave, (i + 1) / bins_per_octave)`
    pub bins: Vec<u64>,
    pub bins_per_octave: f64,
    /// index of the first bin of the high (signal) class
    pub split_bin: usize,
}

impl OtsuHistogram {
    /// the split expressed in log2 units
    pub fn split(&self) -> f64 {
        self.split_bin as f64 / self.bins_per_octave
    }

    /// lower edge of bin `i` in log2 units
    pub fn bin_edge(&self, i: usize) -> f64 {
        i as f64 / self.bins_per_octave
    }
}

/// The outcome of selecting a threshold for one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSelection {
    /// the value computed by the method, before clamping
    pub raw: u64,
    /// the value that is applied, never below 1
    pub threshold: u64,
    pub otsu: Option<OtsuHistogram>,
}

fn log2_bin(count: u64) -> usize {
    ((count as f64).log2() * cfconst::OTSU_BINS_PER_OCTAVE + cfconst::OTSU_EPSILON).floor()
        as usize
}

/// Histogram of log2(count) over the positive entries of `counts`,
/// with bins spanning `[0, log2(max)]`.
pub fn log2_histogram(counts: &[u64]) -> Vec<u64> {
    let max = match counts.iter().filter(|c| **c > 0).max() {
        Some(m) => *m,
        None => return Vec::new(),
    };
    let mut bins = vec![0u64; log2_bin(max) + 1];
    for c in counts.iter().filter(|c| **c > 0) {
        bins[log2_bin(*c)] += 1;
    }
    bins
}

/// Otsu's method on a histogram: pick the split maximizing the
/// between-class variance `w1 * w2 * (m1 - m2)^2`, using the bin
/// index as the bin value.  Returns the index of the first bin of the
/// upper class, or 0 if no split separates anything.
pub fn otsu_split(bins: &[u64]) -> usize {
    if bins.len() < 2 {
        return 0;
    }
    let total: f64 = bins.iter().map(|h| *h as f64).sum();
    let total_mass: f64 = bins
        .iter()
        .enumerate()
        .map(|(i, h)| i as f64 * *h as f64)
        .sum();

    let mut w1 = 0.0f64;
    let mut s1 = 0.0f64;
    let mut best_var = 0.0f64;
    let mut best = 0usize;
    for (t, h) in bins[..bins.len() - 1].iter().enumerate() {
        w1 += *h as f64;
        s1 += t as f64 * *h as f64;
        let w2 = total - w1;
        if w1 == 0.0 || w2 == 0.0 {
            continue;
        }
        let m1 = s1 / w1;
        let m2 = (total_mass - s1) / w2;
        let var = w1 * w2 * (m1 - m2).powi(2);
        if var > best_var {
            best_var = var;
            best = t + 1;
        }
    }
    best
}

fn auto_threshold(counts: &[u64]) -> u64 {
    if counts.is_empty() {
        return 0;
    }
    let mut sorted = counts.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let k = sorted.len() / cfconst::AUTO_PERCENTILE_DIVISOR;
    sorted[k] / cfconst::AUTO_THRESHOLD_DIVISOR
}

fn otsu_threshold(counts: &[u64]) -> (u64, OtsuHistogram) {
    let bins = log2_histogram(counts);
    let split_bin = otsu_split(&bins);
    let hist = OtsuHistogram {
        bins,
        bins_per_octave: cfconst::OTSU_BINS_PER_OCTAVE,
        split_bin,
    };
    // 2^split truncated to an integer count
    let t = (2f64.powf(hist.split()) + cfconst::OTSU_EPSILON).floor() as u64;
    (t, hist)
}

/// Select the threshold for one reference from the per-barcode counts
/// of that reference.  Zero counts are not part of the distribution.
pub fn fit_threshold(counts: &[u64], method: &ThresholdMethod) -> ThresholdSelection {
    let positive: Vec<u64> = counts.iter().copied().filter(|c| *c > 0).collect();
    let (raw, otsu) = match method {
        ThresholdMethod::Auto => (auto_threshold(&positive), None),
        ThresholdMethod::Otsu => {
            let (t, h) = otsu_threshold(&positive);
            (t, Some(h))
        }
        ThresholdMethod::Hard(t) => (*t, None),
    };
    ThresholdSelection {
        raw,
        threshold: raw.max(cfconst::MIN_UMI_THRESHOLD),
        otsu,
    }
}

/// The clamped threshold for one reference.
pub fn select_threshold(counts: &[u64], method: &ThresholdMethod) -> u64 {
    fit_threshold(counts, method).threshold
}

/// The threshold selected for a single reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceThreshold {
    pub reference: String,
    /// number of barcodes in the distribution the threshold came from
    pub num_barcodes: usize,
    pub selection: ThresholdSelection,
}

/// reference -> threshold, in the order references were first seen
#[derive(Debug, Clone, Default)]
pub struct ThresholdMap {
    entries: Vec<ReferenceThreshold>,
    index: HashMap<String, usize, ahash::RandomState>,
}

impl ThresholdMap {
    pub fn insert(&mut self, rt: ReferenceThreshold) {
        match self.index.get(&rt.reference) {
            Some(&i) => self.entries[i] = rt,
            None => {
                self.index.insert(rt.reference.clone(), self.entries.len());
                self.entries.push(rt);
            }
        }
    }

    pub fn get(&self, reference: &str) -> Option<u64> {
        self.index
            .get(reference)
            .map(|&i| self.entries[i].selection.threshold)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceThreshold> {
        self.entries.iter()
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.reference.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Select a threshold for every reference of `counts`.  All thresholds
/// are computed from the unthresholded counts.
pub fn select_thresholds(counts: &RefBarcodeCounts, method: &ThresholdMethod) -> ThresholdMap {
    let mut tmap = ThresholdMap::default();
    for (rid, reference) in counts.references().iter().enumerate() {
        let dist = counts.distribution(rid as u32);
        let selection = fit_threshold(&dist, method);
        tmap.insert(ReferenceThreshold {
            reference: reference.to_string(),
            num_barcodes: dist.len(),
            selection,
        });
    }
    tmap
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// barcode / reference entries set to 0
    pub n_zeroed: usize,
    /// entries at or above their threshold
    pub n_kept: usize,
}

/// Set every count strictly below its reference's threshold to 0.
/// References without a threshold are left untouched.
pub fn apply_thresholds(
    mut counts: RefBarcodeCounts,
    thresholds: &ThresholdMap,
) -> (RefBarcodeCounts, ApplyStats) {
    let mut stats = ApplyStats::default();
    for rt in thresholds.iter() {
        let rid = match counts.references().id(&rt.reference) {
            Some(rid) => rid,
            None => continue,
        };
        let thresh = rt.selection.threshold;
        for e in counts.row_mut(rid).iter_mut() {
            if e.1 < thresh {
                if e.1 > 0 {
                    stats.n_zeroed += 1;
                }
                e.1 = 0;
            } else {
                stats.n_kept += 1;
            }
        }
    }
    (counts, stats)
}
