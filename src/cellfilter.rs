/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use anyhow::Context;
use slog::{info, warn};

use crate::aggregate::{aggregate, RefBarcodeCounts};
use crate::cell_table::{merge, CellTable};
use crate::constants as cfconst;
use crate::correct::{correct_table, HammingCorrector};
use crate::count_table::RawCountTable;
use crate::diagnostics;
use crate::metrics::{JsonMetricsSink, Metric, Metrics, MetricsSink};
use crate::prog_opts::FilterOpts;
use crate::support_filter::filter_by_support;
use crate::threshold::{apply_thresholds, select_thresholds, ThresholdMap};
use crate::utils as cfutils;
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Headline numbers of a finished single-sample run.
#[derive(Debug, Clone, Serialize)]
pub struct FilterSummary {
    pub sample: String,
    pub n_raw_umi: usize,
    pub n_filtered_umi: usize,
    pub n_references: usize,
    pub n_cells: usize,
    pub n_positive_cells: usize,
}

/// Write the thresholded reference x barcode counts as a MatrixMarket
/// file along with the row (reference) and column (barcode) labels.
fn write_filtered_matrix(
    counts: &RefBarcodeCounts,
    output_dir: &Path,
    prefix: &str,
) -> anyhow::Result<usize> {
    let nrows = counts.references().len();
    let ncols = counts.barcodes().len();
    let nnz = counts.num_nonzero();
    let mut trimat = sprs::TriMatI::<u64, u32>::with_capacity((nrows, ncols), nnz);
    for rid in 0..nrows as u32 {
        for (bid, c) in counts.row(rid) {
            if *c > 0 {
                trimat.add_triplet(rid as usize, *bid as usize, *c);
            }
        }
    }

    let mtx_path = cfutils::prefixed_path(output_dir, prefix, cfconst::FILTERED_MTX_SUFFIX);
    sprs::io::write_matrix_market(&mtx_path, &trimat)
        .with_context(|| format!("could not write {}", mtx_path.display()))?;

    let labels = [
        (cfconst::FILTERED_REFS_SUFFIX, counts.references()),
        (cfconst::FILTERED_BARCODES_SUFFIX, counts.barcodes()),
    ];
    for (suffix, names) in labels {
        let p = cfutils::prefixed_path(output_dir, prefix, suffix);
        let f = File::create(&p).with_context(|| format!("could not create {}", p.display()))?;
        let mut w = BufWriter::new(f);
        for n in names.iter() {
            writeln!(w, "{}", n).with_context(|| format!("cannot write to {}", p.display()))?;
        }
        w.flush()
            .with_context(|| format!("cannot write to {}", p.display()))?;
    }
    Ok(nnz)
}

fn write_otsu_plots(tmap: &ThresholdMap, output_dir: &Path, prefix: &str) -> anyhow::Result<()> {
    for rt in tmap.iter() {
        if let Some(hist) = &rt.selection.otsu {
            let suffix = format!(
                "{}_{}",
                cfutils::sanitize_file_component(&rt.reference),
                cfconst::OTSU_PLOT_SUFFIX
            );
            let p = cfutils::prefixed_path(output_dir, prefix, &suffix);
            diagnostics::write_otsu_plot(&p, &rt.reference, hist, rt.selection.threshold)?;
        }
    }
    Ok(())
}

/// Run the whole filter for one sample: correct UMIs, drop weakly
/// supported molecules, count molecules per (barcode, reference),
/// pick and apply a per-reference UMI threshold, and merge the result
/// into the sample's cell table.  Nothing is written to the output
/// directory unless every stage succeeds.
pub fn run_filter(opts: &FilterOpts) -> anyhow::Result<FilterSummary> {
    let log = &opts.log;
    let start = Instant::now();
    let config = &opts.config;
    let mut metrics = Metrics::new();

    let raw = RawCountTable::from_path(&opts.count_file)?;
    info!(
        log,
        "read {} molecules ({} reads) in {} barcode / reference pairs",
        raw.num_molecules().to_formatted_string(&Locale::en),
        raw.num_reads().to_formatted_string(&Locale::en),
        raw.groups().len().to_formatted_string(&Locale::en)
    );
    let cell_table = CellTable::from_path(&opts.cell_table)?;
    info!(
        log,
        "read {} barcodes from the cell table",
        cell_table.num_rows().to_formatted_string(&Locale::en)
    );

    // UMI correction
    let (corrected, cstats) = correct_table(raw, &HammingCorrector::default());
    let n_raw = cstats.n_raw_umi as u64;
    metrics.add(Metric::new("Number of Raw UMI", n_raw).with_help("number of total raw UMI"));
    metrics.add(
        Metric::new("Number of Corrected UMI", cstats.n_corrected_umi as u64)
            .with_total(n_raw)
            .with_help("correct sequencing errors in the UMI sequences"),
    );
    info!(
        log,
        "corrected {} of {} UMIs ({} reads reassigned)",
        cstats.n_corrected_umi.to_formatted_string(&Locale::en),
        cstats.n_raw_umi.to_formatted_string(&Locale::en),
        cstats.n_corrected_read.to_formatted_string(&Locale::en)
    );
    let corrected_out = corrected.clone();

    // read support
    let (filtered, fstats) = filter_by_support(corrected, config.min_support_reads);
    metrics.add(
        Metric::new(
            "Minimum Number of Reads to Support a UMI",
            config.min_support_reads,
        )
        .with_help("filter UMI with less than this number of reads"),
    );
    metrics.add(
        Metric::new("Number of Filtered UMI", fstats.n_removed as u64)
            .with_total(n_raw)
            .with_help("filter UMI according to min_support_read"),
    );
    info!(
        log,
        "removed {} of {} UMIs supported by fewer than {} reads",
        fstats.n_removed.to_formatted_string(&Locale::en),
        fstats.n_total.to_formatted_string(&Locale::en),
        config.min_support_reads
    );

    let (by_barcode, by_reference) = aggregate(&filtered);
    info!(
        log,
        "{} barcodes carry molecules of {} references",
        by_barcode.barcodes().len().to_formatted_string(&Locale::en),
        by_barcode.references().len().to_formatted_string(&Locale::en)
    );

    // per-reference thresholds, all taken from the unthresholded counts
    let tmap = select_thresholds(&by_reference, &config.method);
    metrics.add(Metric::new("UMI Threshold Method", config.method.name()));
    for rt in tmap.iter() {
        metrics.add(Metric::new(
            format!("{} UMI Threshold", rt.reference),
            rt.selection.threshold,
        ));
        info!(
            log,
            "{} UMI threshold for {} = {}", config.method, rt.reference, rt.selection.threshold
        );
    }
    diagnostics::report_degenerate(&tmap, &config.method, log);

    let (by_reference, astats) = apply_thresholds(by_reference, &tmap);
    info!(
        log,
        "kept {} barcode / reference counts, zeroed {}",
        astats.n_kept.to_formatted_string(&Locale::en),
        astats.n_zeroed.to_formatted_string(&Locale::en)
    );

    let (table, mstats) = merge(cell_table, &by_reference, tmap.references())?;
    for col in mstats.replaced.iter() {
        warn!(
            log,
            "reference {} has the name of an existing cell table column; that column was overwritten",
            col
        );
    }
    if mstats.n_unmatched > 0 {
        info!(
            log,
            "{} positive barcode / reference counts belong to barcodes absent from the cell table",
            mstats.n_unmatched.to_formatted_string(&Locale::en)
        );
    }
    metrics.add(
        Metric::new(
            "Number of Positive Cells after Filtering",
            mstats.n_positive as u64,
        )
        .with_total(mstats.n_cells as u64),
    );
    if mstats.n_positive == 0 {
        warn!(log, "no cell has a positive UMI count after filtering; please check the input.");
    }

    // every stage succeeded, write the outputs
    let output_dir = &opts.output_dir;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("could not create output directory {}", output_dir.display()))?;
    let prefix = cfutils::sanitize_file_component(&opts.sample);

    corrected_out.write_json(&cfutils::prefixed_path(
        output_dir,
        &prefix,
        cfconst::CORRECTED_COUNT_SUFFIX,
    ))?;
    table.write_csv(&cfutils::prefixed_path(
        output_dir,
        &prefix,
        cfconst::FILTERED_TABLE_SUFFIX,
    ))?;
    let nnz = write_filtered_matrix(&by_reference, output_dir, &prefix)?;
    write_otsu_plots(&tmap, output_dir, &prefix)?;
    JsonMetricsSink::new(cfutils::prefixed_path(
        output_dir,
        &prefix,
        cfconst::METRICS_SUFFIX,
    ))
    .emit(&metrics)?;

    let thresholds: serde_json::Map<String, serde_json::Value> = tmap
        .iter()
        .map(|rt| (rt.reference.clone(), json!(rt.selection.threshold)))
        .collect();
    let meta_info = json!({
    "meta_version" : cfconst::FILTER_META_VER,
    "version_str" : opts.version,
    "cmd" : opts.cmdline,
    "threshold_method" : config.method.name(),
    "umi_thresholds" : thresholds,
    "num_barcodes" : by_reference.barcodes().len(),
    "num_nonzero" : nnz,
    "num_positive_cells" : mstats.n_positive,
    "filter_options" : opts
    });
    cfutils::write_json_pretty(&output_dir.join(cfconst::FILTER_META_FILE), &meta_info)?;

    info!(
        log,
        "{} of {} cells have a positive UMI count; finished in {:?}",
        mstats.n_positive.to_formatted_string(&Locale::en),
        mstats.n_cells.to_formatted_string(&Locale::en),
        start.elapsed()
    );

    Ok(FilterSummary {
        sample: opts.sample.clone(),
        n_raw_umi: cstats.n_raw_umi,
        n_filtered_umi: fstats.n_removed,
        n_references: tmap.len(),
        n_cells: mstats.n_cells,
        n_positive_cells: mstats.n_positive,
    })
}
