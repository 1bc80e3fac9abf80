/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

//! Bipartite barcode x reference molecule counts.
//!
//! Both views share the same label sets; barcodes and references are
//! given dense `u32` ids in the order they are first seen, and each
//! view stores, per outer id, the list of (inner id, count) pairs with
//! a positive count.  Absent entries mean a count of 0.

use crate::count_table::RawCountTable;
use std::collections::HashMap;
use std::sync::Arc;

/// A set of names with dense ids assigned in insertion order.
#[derive(Debug, Clone)]
pub struct Labels {
    names: Vec<String>,
    index: HashMap<String, u32, ahash::RandomState>,
}

impl Default for Labels {
    fn default() -> Self {
        let s = ahash::RandomState::with_seeds(2u64, 7u64, 1u64, 8u64);
        Self {
            names: Vec::new(),
            index: HashMap::with_hasher(s),
        }
    }
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// return the id of `name`, assigning the next free id if it has
    /// not been seen before.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: u32) -> &str {
        &self.names[id as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }
}

/// barcode -> reference -> number of surviving molecules
#[derive(Debug, Clone)]
pub struct BarcodeRefCounts {
    barcodes: Arc<Labels>,
    references: Arc<Labels>,
    rows: Vec<Vec<(u32, u64)>>,
}

/// reference -> barcode -> number of surviving molecules
#[derive(Debug, Clone)]
pub struct RefBarcodeCounts {
    barcodes: Arc<Labels>,
    references: Arc<Labels>,
    rows: Vec<Vec<(u32, u64)>>,
}

fn lookup(rows: &[Vec<(u32, u64)>], outer: Option<u32>, inner: Option<u32>) -> u64 {
    match (outer, inner) {
        (Some(o), Some(i)) => rows[o as usize]
            .iter()
            .find(|(id, _)| *id == i)
            .map(|(_, c)| *c)
            .unwrap_or(0),
        _ => 0,
    }
}

impl BarcodeRefCounts {
    pub fn barcodes(&self) -> &Labels {
        &self.barcodes
    }

    pub fn references(&self) -> &Labels {
        &self.references
    }

    pub fn get(&self, barcode: &str, reference: &str) -> u64 {
        lookup(
            &self.rows,
            self.barcodes.id(barcode),
            self.references.id(reference),
        )
    }

    /// all stored (barcode, reference, count) entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, u64)> + '_ {
        self.rows.iter().enumerate().flat_map(move |(b, row)| {
            row.iter().map(move |(r, c)| {
                (
                    self.barcodes.name(b as u32),
                    self.references.name(*r),
                    *c,
                )
            })
        })
    }
}

impl RefBarcodeCounts {
    pub fn barcodes(&self) -> &Labels {
        &self.barcodes
    }

    pub fn references(&self) -> &Labels {
        &self.references
    }

    pub fn get(&self, reference: &str, barcode: &str) -> u64 {
        lookup(
            &self.rows,
            self.references.id(reference),
            self.barcodes.id(barcode),
        )
    }

    /// the (barcode id, count) entries stored for reference `ref_id`
    pub fn row(&self, ref_id: u32) -> &[(u32, u64)] {
        &self.rows[ref_id as usize]
    }

    pub(crate) fn row_mut(&mut self, ref_id: u32) -> &mut [(u32, u64)] {
        &mut self.rows[ref_id as usize]
    }

    /// The positive per-barcode counts of one reference, in barcode id
    /// order.  This is the distribution thresholds are selected from;
    /// zero entries are never part of it.
    pub fn distribution(&self, ref_id: u32) -> Vec<u64> {
        self.rows[ref_id as usize]
            .iter()
            .map(|(_, c)| *c)
            .filter(|c| *c > 0)
            .collect()
    }

    /// number of entries with a positive count
    pub fn num_nonzero(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|(_, c)| *c > 0).count())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, u64)> + '_ {
        self.rows.iter().enumerate().flat_map(move |(r, row)| {
            row.iter().map(move |(b, c)| {
                (
                    self.references.name(r as u32),
                    self.barcodes.name(*b),
                    *c,
                )
            })
        })
    }
}

/// Count, for every (barcode, reference) pair, the molecules whose
/// read count is still positive, and build both the barcode-major view
/// and its transpose.  Pairs without any surviving molecule are left
/// out of both views.
pub fn aggregate(table: &RawCountTable) -> (BarcodeRefCounts, RefBarcodeCounts) {
    let mut barcodes = Labels::new();
    let mut references = Labels::new();
    let mut by_barcode: Vec<Vec<(u32, u64)>> = Vec::new();

    for g in table.groups() {
        let n = g.molecules.iter().filter(|m| m.reads > 0).count() as u64;
        if n == 0 {
            continue;
        }
        let b = barcodes.intern(&g.barcode);
        let r = references.intern(&g.reference);
        if b as usize == by_barcode.len() {
            by_barcode.push(Vec::new());
        }
        let row = &mut by_barcode[b as usize];
        match row.iter_mut().find(|(id, _)| *id == r) {
            Some(e) => e.1 += n,
            None => row.push((r, n)),
        }
    }

    // a single pass over the barcode-major view fills the transpose
    let mut by_reference: Vec<Vec<(u32, u64)>> = vec![Vec::new(); references.len()];
    for (b, row) in by_barcode.iter().enumerate() {
        for (r, c) in row {
            by_reference[*r as usize].push((b as u32, *c));
        }
    }

    let barcodes = Arc::new(barcodes);
    let references = Arc::new(references);
    (
        BarcodeRefCounts {
            barcodes: barcodes.clone(),
            references: references.clone(),
            rows: by_barcode,
        },
        RefBarcodeCounts {
            barcodes,
            references,
            rows: by_reference,
        },
    )
}

#[cfg(test)]
mod tests {
    use crate::aggregate::{aggregate, Labels};
    use crate::count_table::RawCountTable;
    use crate::support_filter::filter_by_support;
    use serde_json::json;

    #[test]
    fn test_labels() {
        let mut l = Labels::new();
        assert_eq!(l.intern("b"), 0);
        assert_eq!(l.intern("a"), 1);
        assert_eq!(l.intern("b"), 0);
        assert_eq!(l.len(), 2);
        assert_eq!(l.id("a"), Some(1));
        assert_eq!(l.id("c"), None);
        assert_eq!(l.name(1), "a");
        assert_eq!(l.iter().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn test_single_molecule_survives() {
        let t = RawCountTable::from_value(&json!({
            "BC1": {"ref1": {"umiA": 5, "umiB": 1}}
        }))
        .unwrap();
        let (t, stats) = filter_by_support(t, 2);
        assert_eq!(stats.n_removed, 1);
        let (br, rb) = aggregate(&t);
        assert_eq!(br.get("BC1", "ref1"), 1);
        assert_eq!(rb.get("ref1", "BC1"), 1);
    }

    #[test]
    fn test_counts_molecules_not_reads() {
        let t = RawCountTable::from_value(&json!({
            "BC1": {"ref1": {"A": 100, "B": 3, "C": 0}, "ref2": {"D": 0}},
            "BC2": {"ref2": {"E": 1, "F": 1}},
            "BC3": {"ref1": {"G": 0}}
        }))
        .unwrap();
        let (br, rb) = aggregate(&t);
        assert_eq!(br.get("BC1", "ref1"), 2);
        assert_eq!(br.get("BC1", "ref2"), 0);
        assert_eq!(br.get("BC2", "ref2"), 2);
        // BC3 has nothing left and is not stored at all
        assert_eq!(br.barcodes().id("BC3"), None);
        assert_eq!(rb.num_nonzero(), 2);
        assert_eq!(rb.distribution(rb.references().id("ref1").unwrap()), vec![2]);
    }

    #[test]
    fn test_references_in_file_order() {
        let s = r#"{"BC2": {"zeta": {"A": 3}, "alpha": {"B": 3}}, "BC1": {"alpha": {"C": 3}}}"#;
        let t = RawCountTable::from_reader(s.as_bytes()).unwrap();
        let (br, rb) = aggregate(&t);
        assert_eq!(rb.references().iter().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(br.barcodes().iter().collect::<Vec<_>>(), vec!["BC2", "BC1"]);
    }

    #[test]
    fn test_transpose_consistency() {
        let t = RawCountTable::from_value(&json!({
            "BC1": {"ref1": {"A": 1, "B": 2}, "ref2": {"C": 4}},
            "BC2": {"ref2": {"D": 1}, "ref3": {"E": 9, "F": 9, "G": 9}},
            "BC3": {"ref1": {"H": 7}, "ref3": {"I": 0}}
        }))
        .unwrap();
        let (br, rb) = aggregate(&t);
        let mut n = 0;
        for (b, r, c) in br.iter() {
            assert_eq!(rb.get(r, b), c);
            n += 1;
        }
        for (r, b, c) in rb.iter() {
            assert_eq!(br.get(b, r), c);
            n -= 1;
        }
        assert_eq!(n, 0);
    }
}
