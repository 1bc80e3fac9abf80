/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use thiserror::Error;

/// Errors raised by the filter stages.  All of them are fatal for
/// the sample being processed; nothing is retried inside the crate.
#[derive(Error, Debug)]
pub enum FilterError {
    /// bad option values, detected before any data is read
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// the upstream count table is not a barcode -> reference -> UMI -> reads mapping
    #[error("count table does not match the expected schema at `{path}`: {reason}")]
    InputSchema { path: String, reason: String },

    #[error("malformed cell table: {0}")]
    CellTable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FilterError {
    pub(crate) fn schema<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        FilterError::InputSchema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
