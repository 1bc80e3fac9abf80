/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */
use anyhow::Context;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// count the Hamming distance between 2 sequences of equal length.
/// Returns `None` if the lengths differ, since the distance is then
/// not defined.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<usize> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b.iter()).filter(|(x, y)| x != y).count())
}

/// Opens `p` for buffered reading, transparently decompressing it
/// if the file name ends in `.gz`.
pub fn open_maybe_gz(p: &Path) -> anyhow::Result<Box<dyn Read>> {
    let f = File::open(p).with_context(|| format!("couldn't open file {}", p.display()))?;
    let is_gz = p
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    if is_gz {
        Ok(Box::new(BufReader::new(flate2::read::GzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Replace every character that would be awkward in a file name
/// (path separators, whitespace, shell metacharacters) with `_`.
pub fn sanitize_file_component(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() {
        String::from("_")
    } else {
        s
    }
}

/// `<outdir>/<prefix>_<suffix>`
pub fn prefixed_path(output_dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    output_dir.join(format!("{}_{}", prefix, suffix))
}

/// serialize `v` as pretty JSON into the file at `p`.
pub fn write_json_pretty<T: serde::Serialize>(p: &Path, v: &T) -> anyhow::Result<()> {
    let f = File::create(p).with_context(|| format!("could not create {}", p.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, v).context("could not format json.")?;
    w.flush()
        .with_context(|| format!("cannot write to {}", p.display()))?;
    Ok(())
}
