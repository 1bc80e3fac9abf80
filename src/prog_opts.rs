/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use crate::error::{FilterError, Result};
use crate::threshold::ThresholdMethod;
use serde::Serialize;
use slog;
use std::path::PathBuf;
use typed_builder::TypedBuilder;

/// The validated threshold settings of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterConfig {
    /// molecules with fewer reads are zeroed; 0 or less disables this
    pub min_support_reads: i64,
    pub method: ThresholdMethod,
}

fn parse_int<T: std::str::FromStr>(name: &str, v: &str) -> Result<T> {
    v.trim().parse::<T>().map_err(|_| {
        FilterError::Configuration(format!("{} must be an integer, got `{}`", name, v))
    })
}

impl FilterConfig {
    /// Validate the string-valued options in one place.  The hard
    /// threshold is checked even when another method is selected; a
    /// negative one is accepted and ends up clamped to 1 like any other
    /// threshold below 1.
    pub fn parse(min_support_reads: &str, method: &str, hard_threshold: &str) -> Result<Self> {
        let min_support_reads = parse_int::<i64>("min_support_reads", min_support_reads)?;
        let hard = parse_int::<i64>("umi_hard_threshold", hard_threshold)?;
        let method = ThresholdMethod::from_config(method, hard.max(0) as u64)?;
        Ok(Self {
            min_support_reads,
            method,
        })
    }
}

#[derive(TypedBuilder, Debug, Clone, Serialize)]
pub struct FilterOpts {
    /// sample name, also the prefix of every per-sample output file
    pub sample: String,
    pub count_file: PathBuf,
    pub cell_table: PathBuf,
    pub output_dir: PathBuf,
    pub config: FilterConfig,
    pub cmdline: String,
    pub version: String,
    #[serde(skip_serializing)]
    pub log: slog::Logger,
}

#[derive(TypedBuilder, Debug, Serialize)]
pub struct MultiOpts<'a, 'b, 'c, 'd, 'e> {
    pub mapfile: &'a PathBuf,
    pub output_dir: &'b PathBuf,
    pub config: FilterConfig,
    pub cmdline: &'c str,
    pub version: &'d str,
    #[serde(skip_serializing)]
    pub log: &'e slog::Logger,
}
