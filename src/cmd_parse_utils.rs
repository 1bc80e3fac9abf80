/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use clap;
use std::path::{Path, PathBuf};

/// The `--umi-threshold-method` choices as seen on the command line;
/// the hard threshold value travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    Auto,
    Otsu,
    Hard,
}

impl MethodArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Otsu => "otsu",
            Self::Hard => "hard",
        }
    }
}

impl clap::ValueEnum for MethodArg {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Otsu, Self::Auto, Self::Hard]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Auto => Some(
                clap::builder::PossibleValue::new("auto")
                    .help("a tenth of the UMI count at the 99th percentile"),
            ),
            Self::Otsu => Some(
                clap::builder::PossibleValue::new("otsu")
                    .help("Otsu split of the log2 UMI count histogram"),
            ),
            Self::Hard => Some(
                clap::builder::PossibleValue::new("hard")
                    .help("the value of --umi-hard-threshold"),
            ),
        }
    }
}

/// Checks if the path pointed to by v exists.  It can be
/// any valid entity (e.g. disk file, FIFO, directory, etc.).
/// If there is any issue with permissions or failure to properly
/// resolve symlinks, or if the path is wrong, it returns
/// an Err(String), else Ok(PathBuf).
pub fn pathbuf_file_exists_validator(v: &str) -> Result<PathBuf, String> {
    // NOTE: we explicitly *do not* check `is_file()` here
    // since we want to return true even if the path is to
    // a FIFO/named pipe.
    if !Path::new(v).exists() {
        Err(String::from("No valid file was found at this path."))
    } else {
        Ok(PathBuf::from(v))
    }
}

/// Sample names end up in output file names; refuse the ones that
/// could escape the output directory.
pub fn sample_name_validator(v: &str) -> Result<String, String> {
    if v.is_empty() || v == "." || v == ".." || v.contains('/') || v.contains('\\') {
        Err(format!("{:?} is not usable as a sample name.", v))
    } else {
        Ok(v.to_string())
    }
}
