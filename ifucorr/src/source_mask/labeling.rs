//! Connected component labeling of a binary mask.
//!
//! Rows are scanned top to bottom as runs of set pixels. Each run takes the
//! label of the runs it touches in the row above, joining them in a
//! union-find when there are several. Labels are made dense at the end.

use std::ops::Range;

use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;

use crate::config::Connectivity;

#[derive(Debug, Clone)]
struct Run {
    cols: Range<usize>,
    label: u32,
}

/// Runs of set pixels in row `y`, left to right.
fn row_runs(mask: &BitBuffer2, y: usize, out: &mut Vec<Run>) {
    out.clear();
    let mut open = None;
    for x in 0..mask.width() {
        match (mask.get_xy(x, y), open) {
            (true, None) => open = Some(x),
            (false, Some(start)) => {
                out.push(Run { cols: start..x, label: 0 });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        out.push(Run {
            cols: start..mask.width(),
            label: 0,
        });
    }
}

/// Label the runs of a row from the row above. `reach` is 1 when diagonal
/// neighbours count.
fn link_row(row: &mut [Run], above: &[Run], reach: usize, uf: &mut UnionFind) {
    for run in row.iter_mut() {
        // Runs above are sorted and disjoint.
        let first = above.partition_point(|a| a.cols.end + reach <= run.cols.start);
        let mut label = None;
        for a in above[first..]
            .iter()
            .take_while(|a| a.cols.start < run.cols.end + reach)
        {
            match label {
                None => label = Some(a.label),
                Some(l) => uf.union(l, a.label),
            }
        }
        run.label = label.unwrap_or_else(|| uf.make_set());
    }
}

/// Labels of a binary mask: 0 is background, components are `1..=num_labels`.
#[derive(Debug)]
pub struct LabelMap {
    labels: Buffer2<u32>,
    num_labels: usize,
}

impl LabelMap {
    pub fn from_mask(mask: &BitBuffer2, connectivity: Connectivity) -> Self {
        let reach = match connectivity {
            Connectivity::Four => 0,
            Connectivity::Eight => 1,
        };
        let mut labels = Buffer2::<u32>::new_default(mask.width(), mask.height());
        let mut uf = UnionFind::new();
        let mut above = Vec::new();
        let mut row = Vec::new();

        for y in 0..mask.height() {
            row_runs(mask, y, &mut row);
            link_row(&mut row, &above, reach, &mut uf);
            let out = labels.row_mut(y);
            for run in &row {
                out[run.cols.clone()].fill(run.label);
            }
            std::mem::swap(&mut above, &mut row);
        }

        let (dense, num_labels) = uf.compact();
        for label in labels.iter_mut() {
            *label = dense[*label as usize];
        }
        Self { labels, num_labels }
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn labels(&self) -> &[u32] {
        self.labels.pixels()
    }

    /// Pixel count per label; index 0 is the background.
    pub fn areas(&self) -> Vec<usize> {
        let mut areas = vec![0usize; self.num_labels + 1];
        for &label in self.labels.iter() {
            areas[label as usize] += 1;
        }
        areas
    }
}

/// Disjoint sets of provisional labels. Slot 0 is the background. A root is
/// always the smallest label of its set.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        Self { parent: vec![0] }
    }

    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        label
    }

    fn find(&mut self, mut label: u32) -> u32 {
        // Path halving.
        while self.parent[label as usize] != label {
            let grandparent = self.parent[self.parent[label as usize] as usize];
            self.parent[label as usize] = grandparent;
            label = grandparent;
        }
        label
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        self.parent[ra.max(rb) as usize] = ra.min(rb);
    }

    /// Dense label of every provisional label, and the number of sets.
    fn compact(&mut self) -> (Vec<u32>, usize) {
        let mut dense = vec![0u32; self.parent.len()];
        let mut sets = 0;
        for label in 1..self.parent.len() as u32 {
            let root = self.find(label);
            dense[label as usize] = if root == label {
                sets += 1;
                sets
            } else {
                dense[root as usize]
            };
        }
        (dense, sets as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> BitBuffer2 {
        let width = rows[0].len();
        let bits: Vec<bool> = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();
        BitBuffer2::from_slice(width, rows.len(), &bits)
    }

    #[test]
    fn test_empty_mask() {
        let mask = BitBuffer2::new_default(8, 8);
        let labels = LabelMap::from_mask(&mask, Connectivity::Eight);
        assert_eq!(labels.num_labels(), 0);
        assert_eq!(labels.areas(), vec![64]);
    }

    #[test]
    fn test_diagonal_depends_on_connectivity() {
        let mask = mask_from_rows(&["#..", ".#.", "..#"]);
        assert_eq!(
            LabelMap::from_mask(&mask, Connectivity::Four).num_labels(),
            3
        );
        assert_eq!(
            LabelMap::from_mask(&mask, Connectivity::Eight).num_labels(),
            1
        );
    }

    #[test]
    fn test_u_shape_merges() {
        // Two arms meet only on the last row.
        let mask = mask_from_rows(&["#...#", "#...#", "#####"]);
        let labels = LabelMap::from_mask(&mask, Connectivity::Four);
        assert_eq!(labels.num_labels(), 1);
        assert_eq!(labels.areas()[1], 9);
    }

    #[test]
    fn test_separate_components_and_areas() {
        let mask = mask_from_rows(&["##....", "##..#.", "....#.", "......"]);
        let labels = LabelMap::from_mask(&mask, Connectivity::Eight);
        assert_eq!(labels.num_labels(), 2);
        let mut areas = labels.areas()[1..].to_vec();
        areas.sort();
        assert_eq!(areas, vec![2, 4]);
        assert_eq!(labels.labels()[0], labels.labels()[7]);
        assert_ne!(labels.labels()[0], labels.labels()[10]);
    }

    #[test]
    fn test_row_joins_three_arms() {
        let mask = mask_from_rows(&["#.#.#", "#.#.#", "#####", "....#", "#...."]);
        let labels = LabelMap::from_mask(&mask, Connectivity::Four);
        assert_eq!(labels.num_labels(), 2);
        assert_eq!(labels.areas()[1..], [12, 1]);
        assert_eq!(labels.labels()[0], 1);
        assert_eq!(labels.labels()[20], 2);
    }
}
