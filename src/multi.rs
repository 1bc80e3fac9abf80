/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

//! Run the filter over several samples at once, each in its own
//! worker thread with its own inputs, outputs and logger.

use anyhow::{bail, Context};
use itertools::Itertools;
use slog::{crit, info, o};

use crate::cellfilter::{run_filter, FilterSummary};
use crate::cmd_parse_utils::sample_name_validator;
use crate::prog_opts::{FilterOpts, MultiOpts};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub sample: String,
    pub count_file: PathBuf,
    pub cell_table: PathBuf,
}

/// Parse a map file of `sample<TAB>count_json<TAB>cell_table` rows.
/// Lines starting with `#` and blank lines are skipped.
pub fn parse_mapfile_from<R: Read>(r: R) -> anyhow::Result<Vec<SampleEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(r);

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for result in rdr.records() {
        let record = result.context("could not read map file record")?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != 3 {
            bail!(
                "map file line {}: expected 3 tab-separated columns (sample, count file, cell table), found {}",
                line,
                record.len()
            );
        }
        let sample = sample_name_validator(record[0].trim())
            .map_err(|e| anyhow::anyhow!("map file line {}: {}", line, e))?;
        if !seen.insert(sample.clone()) {
            bail!("map file line {}: sample {} is listed more than once", line, sample);
        }
        entries.push(SampleEntry {
            sample,
            count_file: PathBuf::from(record[1].trim()),
            cell_table: PathBuf::from(record[2].trim()),
        });
    }
    Ok(entries)
}

pub fn parse_mapfile(p: &Path) -> anyhow::Result<Vec<SampleEntry>> {
    let f = File::open(p).with_context(|| format!("couldn't open map file {}", p.display()))?;
    parse_mapfile_from(f).with_context(|| format!("could not parse map file {}", p.display()))
}

/// Filter every sample of the map file in parallel, one worker per
/// sample, writing each into `<output_dir>/<sample>/`.  All workers
/// are waited for; if any of them failed, the error names every
/// failed sample.
pub fn run_multi(opts: &MultiOpts) -> anyhow::Result<Vec<FilterSummary>> {
    let log = opts.log;
    let samples = parse_mapfile(opts.mapfile)?;
    if samples.is_empty() {
        bail!("the map file {} lists no samples", opts.mapfile.display());
    }
    let n_workers = samples.len();
    info!(log, "filtering {} samples with {} workers", samples.len(), n_workers);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut thread_handles: Vec<(String, thread::JoinHandle<()>)> = Vec::with_capacity(n_workers);

    for (idx, s) in samples.into_iter().enumerate() {
        let fopts = FilterOpts::builder()
            .sample(s.sample.clone())
            .count_file(s.count_file)
            .cell_table(s.cell_table)
            .output_dir(opts.output_dir.join(&s.sample))
            .config(opts.config)
            .cmdline(opts.cmdline.to_string())
            .version(opts.version.to_string())
            .log(log.new(o!("sample" => s.sample.clone())))
            .build();
        let tx = tx.clone();
        let handle = thread::spawn(move || {
            let res = run_filter(&fopts);
            // the receiver is alive until every worker has been joined
            let _ = tx.send((idx, fopts.sample.clone(), res));
        });
        thread_handles.push((s.sample, handle));
    }
    drop(tx);

    let mut failed: Vec<String> = Vec::new();
    for (sample, h) in thread_handles.drain(0..) {
        if h.join().is_err() {
            crit!(log, "the worker for sample {} panicked", sample);
            failed.push(sample);
        }
    }

    let mut summaries = Vec::with_capacity(n_workers);
    for (idx, sample, res) in rx.iter() {
        match res {
            Ok(summary) => summaries.push((idx, summary)),
            Err(e) => {
                crit!(log, "sample {} failed: {:#}", sample, e);
                failed.push(sample);
            }
        }
    }

    if !failed.is_empty() {
        bail!(
            "{} of {} samples failed: {}",
            failed.len(),
            n_workers,
            failed.iter().sorted().join(", ")
        );
    }
    summaries.sort_by_key(|(idx, _)| *idx);
    info!(log, "all {} samples finished", n_workers);
    Ok(summaries.into_iter().map(|(_, s)| s).collect())
}

#[cfg(test)]
mod tests {
    use crate::multi::{parse_mapfile_from, run_multi};
    use crate::prog_opts::{FilterConfig, MultiOpts};
    use slog::o;
    use std::path::PathBuf;

    #[test]
    fn test_parse_mapfile() {
        let m = "# sample\tcounts\tcells\n\
                 S1\ta.json\ta.tsv\n\
                 \n\
                 S2\tb.json.gz\tb.csv\n";
        let entries = parse_mapfile_from(m.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sample, "S1");
        assert_eq!(entries[1].count_file, PathBuf::from("b.json.gz"));
        assert_eq!(entries[1].cell_table, PathBuf::from("b.csv"));
    }

    #[test]
    fn test_parse_mapfile_rejects_bad_rows() {
        let dup = "S1\ta.json\ta.tsv\nS1\tb.json\tb.tsv\n";
        assert!(parse_mapfile_from(dup.as_bytes()).is_err());
        let short = "S1\ta.json\n";
        assert!(parse_mapfile_from(short.as_bytes()).is_err());
        let escape = "../S1\ta.json\ta.tsv\n";
        assert!(parse_mapfile_from(escape.as_bytes()).is_err());
    }

    #[test]
    fn test_run_multi_reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        std::fs::write(d.join("good.json"), r#"{"BC1": {"ref1": {"ACGT": 3}}}"#).unwrap();
        std::fs::write(d.join("bad.json"), r#"{"BC1": ["ACGT"]}"#).unwrap();
        std::fs::write(d.join("cells.tsv"), "barcode\tcluster\nBC1\t1\n").unwrap();
        let p = |f: &str| d.join(f).display().to_string();
        let map = format!(
            "S1\t{}\t{}\nS2\t{}\t{}\nS3\t{}\t{}\n",
            p("good.json"),
            p("cells.tsv"),
            p("bad.json"),
            p("cells.tsv"),
            p("missing.json"),
            p("cells.tsv")
        );
        let mapfile = d.join("samples.tsv");
        std::fs::write(&mapfile, map).unwrap();
        let outdir = d.join("out");
        let log = slog::Logger::root(slog::Discard, o!());

        let opts = MultiOpts::builder()
            .mapfile(&mapfile)
            .output_dir(&outdir)
            .config(FilterConfig::parse("2", "auto", "1").unwrap())
            .cmdline("capture-filter multi")
            .version("0.1.0")
            .log(&log)
            .build();
        let err = run_multi(&opts).unwrap_err().to_string();
        assert!(err.contains("S2"));
        assert!(err.contains("S3"));
        assert!(!err.contains("S1"));
        // the good sample still ran to completion
        assert!(outdir.join("S1").join("S1_metrics.json").exists());
    }

    #[test]
    fn test_run_multi_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        std::fs::write(d.join("a.json"), r#"{"BC1": {"ref1": {"ACGT": 3}}}"#).unwrap();
        std::fs::write(d.join("b.json"), r#"{"BC2": {"ref2": {"TTTT": 5}}}"#).unwrap();
        std::fs::write(d.join("cells.tsv"), "barcode\tcluster\nBC1\t1\nBC2\t2\n").unwrap();
        let map = format!(
            "A\t{}\t{}\nB\t{}\t{}\n",
            d.join("a.json").display(),
            d.join("cells.tsv").display(),
            d.join("b.json").display(),
            d.join("cells.tsv").display()
        );
        let mapfile = d.join("samples.tsv");
        std::fs::write(&mapfile, map).unwrap();
        let outdir = d.join("out");
        let log = slog::Logger::root(slog::Discard, o!());
        let opts = MultiOpts::builder()
            .mapfile(&mapfile)
            .output_dir(&outdir)
            .config(FilterConfig::parse("2", "auto", "1").unwrap())
            .cmdline("capture-filter multi")
            .version("0.1.0")
            .log(&log)
            .build();
        let summaries = run_multi(&opts).unwrap();
        assert_eq!(
            summaries.iter().map(|s| s.sample.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert!(summaries.iter().all(|s| s.n_positive_cells == 1));
        assert!(outdir.join("B").join("filter.json").exists());
    }
}
