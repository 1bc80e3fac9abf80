/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use mimalloc::MiMalloc;
use slog::{crit, o, warn, Drain};
use std::path::PathBuf;

use capture_filter::cellfilter::run_filter;
use capture_filter::cmd_parse_utils::{
    pathbuf_file_exists_validator, sample_name_validator, MethodArg,
};
use capture_filter::constants as cfconst;
use capture_filter::multi::run_multi;
use capture_filter::prog_opts::{FilterConfig, FilterOpts, MultiOpts};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn threshold_args() -> Vec<Arg> {
    vec![
        Arg::new("min-support-reads")
            .long("min-support-reads")
            .help("minimum number of reads supporting a UMI; 0 or less keeps every UMI")
            .allow_hyphen_values(true)
            .default_value(cfconst::DEFAULT_MIN_SUPPORT_READS),
        Arg::new("umi-threshold-method")
            .long("umi-threshold-method")
            .help("how the per-reference UMI threshold is chosen")
            .ignore_case(true)
            .value_parser(value_parser!(MethodArg))
            .default_value(cfconst::DEFAULT_THRESHOLD_METHOD),
        Arg::new("umi-hard-threshold")
            .long("umi-hard-threshold")
            .help("the UMI threshold used by the hard method; values below 1 act as 1")
            .allow_hyphen_values(true)
            .default_value(cfconst::DEFAULT_HARD_THRESHOLD),
        Arg::new("quiet")
            .long("quiet")
            .short('q')
            .help("only log warnings and errors")
            .action(ArgAction::SetTrue),
    ]
}

fn filter_config(t: &ArgMatches) -> anyhow::Result<FilterConfig> {
    let min_support: &String = t
        .get_one("min-support-reads")
        .ok_or_else(|| anyhow::anyhow!("--min-support-reads has no value"))?;
    let method: &MethodArg = t
        .get_one("umi-threshold-method")
        .ok_or_else(|| anyhow::anyhow!("--umi-threshold-method has no value"))?;
    let hard: &String = t
        .get_one("umi-hard-threshold")
        .ok_or_else(|| anyhow::anyhow!("--umi-hard-threshold has no value"))?;
    Ok(FilterConfig::parse(min_support, method.as_str(), hard)?)
}

fn run(opts: &ArgMatches, version: &str, cmdline: &str, log: &slog::Logger) -> anyhow::Result<()> {
    if let Some(t) = opts.subcommand_matches("filter") {
        let config = filter_config(t)?;
        let sample: &String = t.get_one("sample").expect("sample is required");
        let count_file: &PathBuf = t.get_one("count-file").expect("count file is required");
        let cell_table: &PathBuf = t.get_one("cell-table").expect("cell table is required");
        let output_dir: &PathBuf = t.get_one("outdir").expect("output directory is required");

        let filter_opts = FilterOpts::builder()
            .sample(sample.clone())
            .count_file(count_file.clone())
            .cell_table(cell_table.clone())
            .output_dir(output_dir.clone())
            .config(config)
            .cmdline(cmdline.to_string())
            .version(version.to_string())
            .log(log.new(o!("sample" => sample.clone())))
            .build();

        let summary = run_filter(&filter_opts)?;
        if summary.n_positive_cells == 0 {
            warn!(log, "found 0 positive cells; please check the input.");
        }
    }

    if let Some(t) = opts.subcommand_matches("multi") {
        let config = filter_config(t)?;
        let mapfile: &PathBuf = t.get_one("mapfile").expect("map file is required");
        let output_dir: &PathBuf = t.get_one("outdir").expect("output directory is required");

        let multi_opts = MultiOpts::builder()
            .mapfile(mapfile)
            .output_dir(output_dir)
            .config(config)
            .cmdline(cmdline)
            .version(version)
            .log(log)
            .build();
        run_multi(&multi_opts)?;
    }
    Ok(())
}

fn main() {
    let crate_authors = crate_authors!("\n");
    let version = crate_version!();
    let cmdline = std::env::args().collect::<Vec<String>>().join(" ");

    let filter_app = Command::new("filter")
        .about("Call cells per reference from the captured-target UMI counts of one sample")
        .version(version)
        .author(crate_authors)
        .arg(
            Arg::new("sample")
                .long("sample")
                .short('s')
                .required(true)
                .help("sample name, used as the prefix of every output file")
                .value_parser(sample_name_validator),
        )
        .arg(
            Arg::new("count-file")
                .long("count-file")
                .short('c')
                .required(true)
                .help("barcode -> reference -> UMI -> read count JSON file (optionally gzipped)")
                .value_parser(pathbuf_file_exists_validator),
        )
        .arg(
            Arg::new("cell-table")
                .long("cell-table")
                .short('t')
                .required(true)
                .help("per-barcode table (e.g. tSNE coordinates) to add the filtered counts to")
                .value_parser(pathbuf_file_exists_validator),
        )
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .required(true)
                .help("output directory")
                .value_parser(value_parser!(PathBuf)),
        )
        .args(threshold_args());

    let multi_app = Command::new("multi")
        .about("Filter every sample listed in a map file, one worker per sample")
        .version(version)
        .author(crate_authors)
        .arg(
            Arg::new("mapfile")
                .long("mapfile")
                .short('m')
                .required(true)
                .help("tab-separated rows of sample name, count file and cell table")
                .value_parser(pathbuf_file_exists_validator),
        )
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .required(true)
                .help("output directory; each sample is written to <outdir>/<sample>")
                .value_parser(value_parser!(PathBuf)),
        )
        .args(threshold_args());

    let opts = Command::new("capture-filter")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .version(version)
        .author(crate_authors)
        .about("Adaptive per-reference cell calling for captured-target UMI counts")
        .subcommand(filter_app)
        .subcommand(multi_app)
        .get_matches();

    let quiet = opts
        .subcommand()
        .map(|(_, t)| t.get_flag("quiet"))
        .unwrap_or(false);
    let min_level = if quiet {
        slog::Level::Warning
    } else {
        slog::Level::Info
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator)
        .use_custom_timestamp(|out: &mut dyn std::io::Write| {
            write!(out, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
            Ok(())
        })
        .build()
        .fuse();
    let drain = slog::LevelFilter::new(drain, min_level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    let log = slog::Logger::root(drain, o!());

    if let Err(e) = run(&opts, version, &cmdline, &log) {
        crit!(log, "{:#}", e);
        // let the async drain flush before exiting
        drop(log);
        std::process::exit(1);
    }
}
