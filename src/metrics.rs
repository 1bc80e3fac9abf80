/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use crate::utils as cfutils;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// A single named summary value, optionally reported against a total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Metric {
    pub fn new<N: Into<String>, V: Into<Value>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            total: None,
            fraction: None,
            help: None,
        }
    }

    /// report this (numeric) metric as a fraction of `total`
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self.fraction = match self.value.as_f64() {
            Some(v) if total > 0 => Some(v / total as f64),
            _ => None,
        };
        self
    }

    pub fn with_help<H: Into<String>>(mut self, help: H) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Append-only, ordered log of the metrics produced by a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Metrics {
    entries: Vec<Metric>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, m: Metric) {
        self.entries.push(m);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.entries.iter()
    }
}

/// Where the metrics of a finished run are delivered.
pub trait MetricsSink {
    fn emit(&mut self, metrics: &Metrics) -> anyhow::Result<()>;
}

/// Writes the metrics as a JSON array of
/// `{name, value, total?, fraction?, help?}` objects.
pub struct JsonMetricsSink {
    path: PathBuf,
}

impl JsonMetricsSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSink for JsonMetricsSink {
    fn emit(&mut self, metrics: &Metrics) -> anyhow::Result<()> {
        cfutils::write_json_pretty(&self.path, metrics)
    }
}
