/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

//! The per-barcode cell table (e.g. embedding coordinates and cluster
//! labels) that filtered reference counts are merged into.

use crate::aggregate::RefBarcodeCounts;
use crate::constants as cfconst;
use crate::error::{FilterError, Result};
use anyhow::Context;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    // columns carried over from the input, kept verbatim
    Text(Vec<String>),
    // columns added by the filter
    Count(Vec<u64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    fn cell(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Text(v) => v[row].clone(),
            ColumnData::Count(v) => v[row].to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CellTable {
    index_name: String,
    barcodes: Vec<String>,
    row_of: HashMap<String, usize, ahash::RandomState>,
    columns: Vec<Column>,
}

/// `,` for `.csv` files, tab for anything else
pub fn delimiter_for(p: &Path) -> u8 {
    match p.extension().and_then(|e| e.to_str()) {
        Some(e) if e.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

impl CellTable {
    /// Read a delimited table with a header line, whose first column
    /// holds the barcodes.  At least one other column is required.
    pub fn from_reader<R: Read>(r: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .from_reader(r);

        let headers = rdr.headers()?.clone();
        if headers.len() < 2 {
            return Err(FilterError::CellTable(format!(
                "expected a barcode column and at least one more column, found {} column(s)",
                headers.len()
            )));
        }
        let index_name = headers.get(0).unwrap_or("").to_string();
        let mut text: Vec<Vec<String>> = vec![Vec::new(); headers.len() - 1];

        let s = ahash::RandomState::with_seeds(2u64, 7u64, 1u64, 8u64);
        let mut row_of = HashMap::with_hasher(s);
        let mut barcodes = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let bc = record.get(0).unwrap_or("").to_string();
            if row_of.insert(bc.clone(), barcodes.len()).is_some() {
                return Err(FilterError::CellTable(format!(
                    "barcode {} appears more than once",
                    bc
                )));
            }
            barcodes.push(bc);
            for (i, col) in text.iter_mut().enumerate() {
                col.push(record.get(i + 1).unwrap_or("").to_string());
            }
        }

        let columns = headers
            .iter()
            .skip(1)
            .zip(text)
            .map(|(name, data)| Column {
                name: name.to_string(),
                data: ColumnData::Text(data),
            })
            .collect();

        Ok(Self {
            index_name,
            barcodes,
            row_of,
            columns,
        })
    }

    pub fn from_path(p: &Path) -> anyhow::Result<Self> {
        let f = File::open(p).with_context(|| format!("couldn't open cell table {}", p.display()))?;
        Self::from_reader(f, delimiter_for(p))
            .with_context(|| format!("could not parse cell table {}", p.display()))
    }

    pub fn num_rows(&self) -> usize {
        self.barcodes.len()
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn row_of(&self, barcode: &str) -> Option<usize> {
        self.row_of.get(barcode).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn count_column(&self, name: &str) -> Option<&[u64]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Count(v)) => Some(v),
            _ => None,
        }
    }

    /// Set the column `name` to `values`.  An existing column of the
    /// same name is overwritten in place and `true` is returned;
    /// otherwise the column is appended.
    pub fn set_count_column(&mut self, name: &str, values: Vec<u64>) -> Result<bool> {
        if values.len() != self.num_rows() {
            return Err(FilterError::CellTable(format!(
                "column {} has {} values for {} rows",
                name,
                values.len(),
                self.num_rows()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(c) => {
                c.data = ColumnData::Count(values);
                Ok(true)
            }
            None => {
                self.columns.push(Column {
                    name: name.to_string(),
                    data: ColumnData::Count(values),
                });
                Ok(false)
            }
        }
    }

    pub fn write_delimited<W: Write>(&self, w: W, delimiter: u8) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_writer(w);
        let mut header = vec![self.index_name.clone()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        wtr.write_record(&header)?;
        for (row, bc) in self.barcodes.iter().enumerate() {
            let mut rec = Vec::with_capacity(self.columns.len() + 1);
            rec.push(bc.clone());
            rec.extend(self.columns.iter().map(|c| c.cell(row)));
            wtr.write_record(&rec)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, p: &Path) -> anyhow::Result<()> {
        let f = File::create(p).with_context(|| format!("could not create {}", p.display()))?;
        self.write_delimited(f, b',')
            .with_context(|| format!("cannot write to {}", p.display()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// rows of the cell table
    pub n_cells: usize,
    /// rows whose summed reference counts are positive
    pub n_positive: usize,
    /// positive (reference, barcode) entries whose barcode is not in the table
    pub n_unmatched: usize,
    /// pre-existing columns overwritten by a reference column
    pub replaced: Vec<String>,
}

/// Add one column per reference in `references`, holding the filtered
/// count of each barcode (0 where there is none), followed by the
/// row-wise sum over exactly those columns.
pub fn merge<'a, I>(
    mut table: CellTable,
    counts: &RefBarcodeCounts,
    references: I,
) -> Result<(CellTable, MergeStats)>
where
    I: IntoIterator<Item = &'a str>,
{
    let n = table.num_rows();
    let mut stats = MergeStats {
        n_cells: n,
        ..Default::default()
    };
    let mut sums = vec![0u64; n];

    for reference in references {
        let mut values = vec![0u64; n];
        if let Some(rid) = counts.references().id(reference) {
            for (bid, c) in counts.row(rid) {
                match table.row_of(counts.barcodes().name(*bid)) {
                    Some(row) => values[row] = *c,
                    None if *c > 0 => stats.n_unmatched += 1,
                    None => {}
                }
            }
        }
        for (s, v) in sums.iter_mut().zip(values.iter()) {
            *s += *v;
        }
        if table.set_count_column(reference, values)? {
            stats.replaced.push(reference.to_string());
        }
    }

    stats.n_positive = sums.iter().filter(|s| **s > 0).count();
    table.set_count_column(cfconst::SUM_COLUMN, sums)?;
    Ok((table, stats))
}

#[cfg(test)]
mod tests {
    use crate::aggregate::aggregate;
    use crate::cell_table::{delimiter_for, merge, CellTable};
    use crate::constants as cfconst;
    use crate::count_table::RawCountTable;
    use crate::error::FilterError;
    use crate::threshold::{apply_thresholds, select_thresholds, ThresholdMethod};
    use serde_json::json;
    use std::path::Path;

    const TSNE: &str = "barcode\ttSNE_1\ttSNE_2\tcluster\n\
                        BC1\t0.5\t-1.25\t1\n\
                        BC2\t3.0\t2.0\t2\n\
                        BC3\t-4.5\t0.0\t1\n";

    fn tsne() -> CellTable {
        CellTable::from_reader(TSNE.as_bytes(), b'\t').unwrap()
    }

    #[test]
    fn test_read_cell_table() {
        let t = tsne();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.row_of("BC2"), Some(1));
        assert_eq!(
            t.column_names().collect::<Vec<_>>(),
            vec!["tSNE_1", "tSNE_2", "cluster"]
        );
        assert_eq!(delimiter_for(Path::new("x.csv")), b',');
        assert_eq!(delimiter_for(Path::new("x.tsv")), b'\t');
    }

    #[test]
    fn test_bad_cell_tables() {
        let dup = "barcode\tx\nBC1\t1\nBC1\t2\n";
        assert!(matches!(
            CellTable::from_reader(dup.as_bytes(), b'\t'),
            Err(FilterError::CellTable(_))
        ));
        let narrow = "barcode\nBC1\n";
        assert!(matches!(
            CellTable::from_reader(narrow.as_bytes(), b'\t'),
            Err(FilterError::CellTable(_))
        ));
        let ragged = "barcode\tx\nBC1\t1\t2\n";
        assert!(matches!(
            CellTable::from_reader(ragged.as_bytes(), b'\t'),
            Err(FilterError::Csv(_))
        ));
    }

    #[test]
    fn test_merge_and_sum() {
        let raw = RawCountTable::from_value(&json!({
            "BC1": {"ref1": {"A": 2, "B": 2, "C": 2}, "ref2": {"D": 2}},
            "BC2": {"ref2": {"E": 2, "F": 2}},
            "BC9": {"ref1": {"G": 2, "H": 2}}
        }))
        .unwrap();
        let (_, rb) = aggregate(&raw);
        let tmap = select_thresholds(&rb, &ThresholdMethod::Hard(2));
        let (rb, _) = apply_thresholds(rb, &tmap);

        let (t, stats) = merge(tsne(), &rb, tmap.references()).unwrap();
        assert_eq!(t.count_column("ref1").unwrap(), &[3, 0, 0]);
        // BC1 has a single ref2 molecule, below the threshold of 2
        assert_eq!(t.count_column("ref2").unwrap(), &[0, 2, 0]);
        assert_eq!(t.count_column(cfconst::SUM_COLUMN).unwrap(), &[3, 2, 0]);
        assert_eq!(stats.n_cells, 3);
        assert_eq!(stats.n_positive, 2);
        assert_eq!(stats.n_unmatched, 1);
        assert!(stats.replaced.is_empty());

        // the sum matches the reference columns exactly, row by row
        let r1 = t.count_column("ref1").unwrap();
        let r2 = t.count_column("ref2").unwrap();
        let s = t.count_column(cfconst::SUM_COLUMN).unwrap();
        for i in 0..t.num_rows() {
            assert_eq!(s[i], r1[i] + r2[i]);
        }
    }

    #[test]
    fn test_merge_overwrites_same_named_column() {
        let raw = RawCountTable::from_value(&json!({"BC3": {"cluster": {"A": 5}}})).unwrap();
        let (_, rb) = aggregate(&raw);
        let (t, stats) = merge(tsne(), &rb, vec!["cluster"]).unwrap();
        assert_eq!(stats.replaced, vec![String::from("cluster")]);
        assert_eq!(
            t.column_names().collect::<Vec<_>>(),
            vec!["tSNE_1", "tSNE_2", "cluster", cfconst::SUM_COLUMN]
        );
        assert_eq!(t.count_column("cluster").unwrap(), &[0, 0, 1]);
    }

    #[test]
    fn test_write_csv() {
        let raw = RawCountTable::from_value(&json!({"BC2": {"ref1": {"A": 5}}})).unwrap();
        let (_, rb) = aggregate(&raw);
        let (t, _) = merge(tsne(), &rb, vec!["ref1"]).unwrap();
        let mut out = Vec::new();
        t.write_delimited(&mut out, b',').unwrap();
        let s = String::from_utf8(out).unwrap();
        assert_eq!(
            s,
            "barcode,tSNE_1,tSNE_2,cluster,ref1,sum_UMI\n\
             BC1,0.5,-1.25,1,0,0\n\
             BC2,3.0,2.0,2,1,1\n\
             BC3,-4.5,0.0,1,0,0\n"
        );
    }
}
