/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use crate::threshold::{OtsuHistogram, ReferenceThreshold, ThresholdMethod, ThresholdMap};
use anyhow::Context;
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::{Bar, Layout, Plot, Scatter};
use slog::warn;
use std::io::Write;
use std::path::Path;

/// A distribution of 0 or 1 barcodes says nothing about where noise
/// ends and signal begins; data-driven methods still produce a value
/// for it, but it should not be trusted.
pub(crate) fn is_degenerate(rt: &ReferenceThreshold, method: &ThresholdMethod) -> bool {
    match method {
        ThresholdMethod::Hard(_) => false,
        ThresholdMethod::Auto | ThresholdMethod::Otsu => rt.num_barcodes <= 1,
    }
}

/// Warn about every reference whose threshold was derived from a
/// degenerate distribution.  Returns how many there were.
pub(crate) fn report_degenerate(
    tmap: &ThresholdMap,
    method: &ThresholdMethod,
    log: &slog::Logger,
) -> usize {
    let mut n = 0usize;
    for rt in tmap.iter().filter(|rt| is_degenerate(rt, method)) {
        warn!(
            log,
            "reference {} has {} barcode(s) with UMIs; the {} threshold ({}, computed {}) is statistically weak",
            rt.reference,
            rt.num_barcodes,
            method,
            rt.selection.threshold,
            rt.selection.raw
        );
        n += 1;
    }
    n
}

/// Render the log2 UMI histogram of a reference, with the chosen
/// split marked, as a standalone HTML page.
pub fn otsu_plot_html(reference: &str, hist: &OtsuHistogram, threshold: u64) -> String {
    let x: Vec<f64> = (0..hist.bins.len()).map(|i| hist.bin_edge(i)).collect();
    let y: Vec<u64> = hist.bins.clone();
    let ymax = hist.bins.iter().copied().max().unwrap_or(0);

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(x, y).name(reference));
    plot.add_trace(
        Scatter::new(vec![hist.split(), hist.split()], vec![0, ymax])
            .mode(Mode::Lines)
            .name(&format!("threshold = {} UMI", threshold)),
    );
    plot.set_layout(
        Layout::new()
            .x_axis(Axis::new().title("log2(UMI count)"))
            .y_axis(Axis::new().title("Number of barcodes")),
    );
    plot.to_html()
}

pub fn write_otsu_plot(
    path: &Path,
    reference: &str,
    hist: &OtsuHistogram,
    threshold: u64,
) -> anyhow::Result<()> {
    let html = otsu_plot_html(reference, hist, threshold);
    let mut f = std::fs::File::create(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    f.write_all(html.as_bytes())
        .with_context(|| format!("cannot write to {}", path.display()))?;
    Ok(())
}
