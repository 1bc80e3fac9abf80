/*
 * Copyright (c) 2020-2024 COMBINE-lab.
 *
 * This file is part of capture-filter
 * (see https://www.github.com/COMBINE-lab/capture-filter).
 *
 * License: 3-clause BSD, see https://opensource.org/licenses/BSD-3-Clause
 */

use crate::constants as cfconst;
use crate::count_table::{Molecule, RawCountTable};
use crate::utils as cfutils;
use std::cmp::Ordering;

/// The result of collapsing near-duplicate UMIs for one
/// (barcode, reference) pair.  `molecules` has the same length and
/// order as the input; absorbed UMIs remain with a count of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedMolecules {
    pub molecules: Vec<Molecule>,
    /// number of UMIs merged into a neighbor
    pub n_corrected_umi: usize,
    /// number of reads moved along with them
    pub n_corrected_read: u64,
}

/// Anything able to collapse sequencing-error UMIs into their
/// canonical molecule.  Implementations must be deterministic and
/// must not depend on anything other than their input.
pub trait MoleculeCorrector {
    fn correct(&self, molecules: &[Molecule]) -> CorrectedMolecules;
}

/// Merges a UMI into a higher-support UMI at Hamming distance 1, as
/// long as the lower one carries at most `max_ratio` times the reads
/// of the higher one.
#[derive(Debug, Clone, Copy)]
pub struct HammingCorrector {
    pub max_ratio: f64,
}

impl Default for HammingCorrector {
    fn default() -> Self {
        Self {
            max_ratio: cfconst::UMI_CORRECTION_RATIO,
        }
    }
}

impl MoleculeCorrector for HammingCorrector {
    fn correct(&self, molecules: &[Molecule]) -> CorrectedMolecules {
        let mut out = molecules.to_vec();
        let mut n_corrected_umi = 0usize;
        let mut n_corrected_read = 0u64;

        // indices ordered from highest to lowest support; ties broken
        // on the UMI sequence so the result is independent of input order
        let mut order: Vec<usize> = (0..molecules.len()).collect();
        order.sort_by(|&a, &b| {
            let (ma, mb) = (&molecules[a], &molecules[b]);
            match mb.reads.cmp(&ma.reads) {
                Ordering::Equal => mb.umi.cmp(&ma.umi),
                o => o,
            }
        });

        // the ratio test uses the support each UMI had before
        // any merging took place
        while order.len() > 1 {
            let low = match order.pop() {
                Some(i) => i,
                None => break,
            };
            let low_reads = molecules[low].reads;
            if low_reads == 0 {
                continue;
            }
            for &high in order.iter() {
                let high_reads = molecules[high].reads;
                if (low_reads as f64 / high_reads as f64) > self.max_ratio {
                    break;
                }
                let d = cfutils::hamming_distance(
                    molecules[low].umi.as_bytes(),
                    molecules[high].umi.as_bytes(),
                );
                if d == Some(1) {
                    let moved = out[low].reads;
                    out[high].reads += moved;
                    out[low].reads = 0;
                    n_corrected_umi += 1;
                    n_corrected_read += moved;
                    break;
                }
            }
        }

        CorrectedMolecules {
            molecules: out,
            n_corrected_umi,
            n_corrected_read,
        }
    }
}

/// Summary of correcting a whole table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionStats {
    /// number of (barcode, reference, UMI) leaves in the table
    pub n_raw_umi: usize,
    pub n_corrected_umi: usize,
    pub n_corrected_read: u64,
}

/// Run `corrector` over every (barcode, reference) pair of `table`,
/// replacing each group's molecules with the corrected ones.
pub fn correct_table<C: MoleculeCorrector + ?Sized>(
    mut table: RawCountTable,
    corrector: &C,
) -> (RawCountTable, CorrectionStats) {
    let mut stats = CorrectionStats::default();
    for g in table.groups_mut() {
        let corrected = corrector.correct(&g.molecules);
        stats.n_raw_umi += g.molecules.len();
        stats.n_corrected_umi += corrected.n_corrected_umi;
        stats.n_corrected_read += corrected.n_corrected_read;
        g.molecules = corrected.molecules;
    }
    (table, stats)
}

#[cfg(test)]
mod tests {
    use crate::correct::{correct_table, HammingCorrector, MoleculeCorrector};
    use crate::count_table::{Molecule, RawCountTable};

    #[test]
    fn test_merge_one_off_neighbor() {
        let mols = vec![
            Molecule::new("AAAA", 20),
            Molecule::new("AAAT", 2),
            Molecule::new("CCCC", 8),
        ];
        let c = HammingCorrector::default().correct(&mols);
        assert_eq!(c.n_corrected_umi, 1);
        assert_eq!(c.n_corrected_read, 2);
        assert_eq!(
            c.molecules,
            vec![
                Molecule::new("AAAA", 22),
                Molecule::new("AAAT", 0),
                Molecule::new("CCCC", 8),
            ]
        );
    }

    #[test]
    fn test_ratio_blocks_merge() {
        // 5 / 20 > 0.1, so the neighbor is treated as a distinct molecule
        let mols = vec![Molecule::new("AAAA", 20), Molecule::new("AAAT", 5)];
        let c = HammingCorrector::default().correct(&mols);
        assert_eq!(c.n_corrected_umi, 0);
        assert_eq!(c.molecules, mols);
    }

    #[test]
    fn test_degenerate_inputs() {
        let c = HammingCorrector::default().correct(&[]);
        assert!(c.molecules.is_empty());
        assert_eq!(c.n_corrected_umi, 0);

        let mols = vec![Molecule::new("AAAA", 0), Molecule::new("AAAT", 0)];
        let c = HammingCorrector::default().correct(&mols);
        assert_eq!(c.n_corrected_umi, 0);
        assert_eq!(c.molecules, mols);
    }

    #[test]
    fn test_input_order_independent() {
        let a = vec![
            Molecule::new("AAAA", 30),
            Molecule::new("AAAC", 30),
            Molecule::new("AAAG", 1),
        ];
        let mut b = a.clone();
        b.reverse();
        let ca = HammingCorrector::default().correct(&a);
        let cb = HammingCorrector::default().correct(&b);
        assert_eq!(ca.n_corrected_umi, 1);
        // AAAC sorts above AAAA on the tie, so it absorbs AAAG
        let absorbed: Vec<_> = ca.molecules.iter().filter(|m| m.reads == 31).collect();
        assert_eq!(absorbed, vec![&Molecule::new("AAAC", 31)]);
        let mut sa = ca.molecules.clone();
        let mut sb = cb.molecules.clone();
        sa.sort_by(|x, y| x.umi.cmp(&y.umi));
        sb.sort_by(|x, y| x.umi.cmp(&y.umi));
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_correct_table_keeps_leaves() {
        let mut t = RawCountTable::new();
        t.push(
            "BC1",
            "ref1",
            vec![Molecule::new("AAAA", 40), Molecule::new("AAAT", 1)],
        );
        t.push("BC2", "ref1", vec![Molecule::new("GGGG", 3)]);
        let (t, stats) = correct_table(t, &HammingCorrector::default());
        assert_eq!(stats.n_raw_umi, 3);
        assert_eq!(stats.n_corrected_umi, 1);
        assert_eq!(stats.n_corrected_read, 1);
        assert_eq!(t.num_molecules(), 3);
        assert_eq!(t.num_reads(), 44);
    }
}
