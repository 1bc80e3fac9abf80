/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

//! The raw barcode -> reference -> UMI -> read-count table produced
//! upstream.  On disk this is a three-level JSON object; in memory it
//! is a flat list of typed (barcode, reference) groups, each holding
//! its molecules.

use crate::error::{FilterError, Result};
use crate::utils as cfutils;
use anyhow::Context;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;

/// One UMI observed for a (barcode, reference) pair, with the number
/// of reads supporting it.  A count of 0 means the molecule was seen
/// but has since been filtered out or merged into a neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Molecule {
    pub umi: String,
    pub reads: u64,
}

impl Molecule {
    pub fn new<S: Into<String>>(umi: S, reads: u64) -> Self {
        Self {
            umi: umi.into(),
            reads,
        }
    }
}

/// All molecules observed for a single (barcode, reference) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoleculeGroup {
    pub barcode: String,
    pub reference: String,
    pub molecules: Vec<Molecule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCountTable {
    groups: Vec<MoleculeGroup>,
}

impl RawCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the molecules of one (barcode, reference) pair.  Each
    /// pair is expected to be pushed at most once.
    pub fn push<B: Into<String>, R: Into<String>>(
        &mut self,
        barcode: B,
        reference: R,
        molecules: Vec<Molecule>,
    ) {
        self.groups.push(MoleculeGroup {
            barcode: barcode.into(),
            reference: reference.into(),
            molecules,
        });
    }

    pub fn groups(&self) -> &[MoleculeGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [MoleculeGroup] {
        &mut self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// number of (barcode, reference, UMI) leaves, zeroed ones included
    pub fn num_molecules(&self) -> usize {
        self.groups.iter().map(|g| g.molecules.len()).sum()
    }

    /// total number of supporting reads over all leaves
    pub fn num_reads(&self) -> u64 {
        self.groups
            .iter()
            .flat_map(|g| g.molecules.iter())
            .map(|m| m.reads)
            .sum()
    }

    /// Build a table from an already parsed JSON document, checking that
    /// it has exactly the barcode -> reference -> UMI -> count shape.
    pub fn from_value(v: &Value) -> Result<Self> {
        let barcodes = v
            .as_object()
            .ok_or_else(|| FilterError::schema("/", "top level must be an object keyed by barcode"))?;

        let mut table = RawCountTable::new();
        for (barcode, refs) in barcodes {
            let refs = refs.as_object().ok_or_else(|| {
                FilterError::schema(barcode.as_str(), "must be an object keyed by reference")
            })?;
            for (reference, umis) in refs {
                let umis = umis.as_object().ok_or_else(|| {
                    FilterError::schema(
                        format!("{}/{}", barcode, reference),
                        "must be an object keyed by UMI",
                    )
                })?;
                let mut molecules = Vec::with_capacity(umis.len());
                for (umi, reads) in umis {
                    let reads = reads.as_u64().ok_or_else(|| {
                        FilterError::schema(
                            format!("{}/{}/{}", barcode, reference, umi),
                            format!("read count must be a non-negative integer, found {}", reads),
                        )
                    })?;
                    molecules.push(Molecule::new(umi.as_str(), reads));
                }
                table.push(barcode.as_str(), reference.as_str(), molecules);
            }
        }
        Ok(table)
    }

    pub fn from_reader<R: Read>(r: R) -> Result<Self> {
        let v: Value = serde_json::from_reader(r)?;
        Self::from_value(&v)
    }

    /// Load the table from a (possibly gzipped) JSON file.
    pub fn from_path(p: &Path) -> anyhow::Result<Self> {
        let rdr = cfutils::open_maybe_gz(p)?;
        Self::from_reader(rdr)
            .with_context(|| format!("could not load the UMI count table {}", p.display()))
    }

    /// The inverse of [`RawCountTable::from_value`].
    pub fn to_value(&self) -> Value {
        let mut barcodes = Map::new();
        for g in &self.groups {
            let refs = barcodes
                .entry(g.barcode.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(refs) = refs {
                let umis: Map<String, Value> = g
                    .molecules
                    .iter()
                    .map(|m| (m.umi.clone(), Value::from(m.reads)))
                    .collect();
                refs.insert(g.reference.clone(), Value::Object(umis));
            }
        }
        Value::Object(barcodes)
    }

    pub fn write_json(&self, p: &Path) -> anyhow::Result<()> {
        cfutils::write_json_pretty(p, &self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use crate::count_table::{Molecule, RawCountTable};
    use crate::error::FilterError;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let v = json!({
            "BC1": {"ref1": {"umiA": 5, "umiB": 1}, "ref2": {"umiC": 0}},
            "BC2": {"ref1": {"umiD": 3}}
        });
        let t = RawCountTable::from_value(&v).unwrap();
        assert_eq!(t.groups().len(), 3);
        assert_eq!(t.num_molecules(), 4);
        assert_eq!(t.num_reads(), 9);

        let g = &t.groups()[0];
        assert_eq!(g.barcode, "BC1");
        assert_eq!(g.reference, "ref1");
        assert_eq!(
            g.molecules,
            vec![Molecule::new("umiA", 5), Molecule::new("umiB", 1)]
        );
        assert_eq!(t.to_value(), v);
    }

    #[test]
    fn test_keeps_file_order() {
        let s = r#"{"BC2":{"zeta":{"U2":4,"U1":2},"alpha":{"U3":1}},"BC1":{"beta":{"U4":7}}}"#;
        let t = RawCountTable::from_reader(s.as_bytes()).unwrap();
        let keys: Vec<(&str, &str)> = t
            .groups()
            .iter()
            .map(|g| (g.barcode.as_str(), g.reference.as_str()))
            .collect();
        assert_eq!(keys, vec![("BC2", "zeta"), ("BC2", "alpha"), ("BC1", "beta")]);
        assert_eq!(t.groups()[0].molecules[0], Molecule::new("U2", 4));
        assert_eq!(serde_json::to_string(&t.to_value()).unwrap(), s);
    }

    #[test]
    fn test_schema_errors() {
        let bad = [
            json!([1, 2, 3]),
            json!({"BC1": 4}),
            json!({"BC1": {"ref1": [1]}}),
            json!({"BC1": {"ref1": {"umiA": -1}}}),
            json!({"BC1": {"ref1": {"umiA": 1.5}}}),
            json!({"BC1": {"ref1": {"umiA": "3"}}}),
        ];
        for v in bad.iter() {
            match RawCountTable::from_value(v) {
                Err(FilterError::InputSchema { .. }) => {}
                other => panic!("expected a schema error for {}, got {:?}", v, other),
            }
        }
    }

    #[test]
    fn test_schema_error_path() {
        let v = json!({"BC1": {"ref1": {"umiA": -1}}});
        match RawCountTable::from_value(&v) {
            Err(FilterError::InputSchema { path, .. }) => assert_eq!(path, "BC1/ref1/umiA"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("counts.json");
        let mut t = RawCountTable::new();
        t.push("BC1", "ref1", vec![Molecule::new("AAAA", 3)]);
        t.write_json(&p).unwrap();
        assert_eq!(RawCountTable::from_path(&p).unwrap(), t);
    }
}
