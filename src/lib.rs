/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

pub mod aggregate;
pub mod cell_table;
pub mod cellfilter;
pub mod cmd_parse_utils;
pub mod constants;
pub mod correct;
pub mod count_table;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod multi;
pub mod prog_opts;
pub mod support_filter;
pub mod threshold;
pub mod utils;
