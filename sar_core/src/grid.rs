use serde::Serialize;

/// Probability mass over a search area, row-major, row 0 north.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityGrid {
    width: usize,
    height: usize,
    cells: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridStats {
    pub total: f64,
    pub max: f64,
    pub mean: f64,
    pub nonzero: usize,
}

impl ProbabilityGrid {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    /// All mass on a single cell.
    pub fn point_mass(width: usize, height: usize, row: usize, col: usize) -> Self {
        let mut grid = Self::zeros(width, height);
        grid.set(row, col, 1.0);
        grid
    }

    pub fn from_cells(width: usize, height: usize, cells: Vec<f64>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.height && col < self.width);
        self.cells[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.height && col < self.width);
        self.cells[row * self.width + col] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.cells
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.cells
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.cells.chunks(self.width.max(1))
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }

    pub fn max(&self) -> f64 {
        self.cells.iter().copied().fold(0.0, f64::max)
    }

    pub fn mean(&self) -> f64 {
        if self.cells.is_empty() {
            0.0
        } else {
            self.total() / self.cells.len() as f64
        }
    }

    /// Highest cell as `(row, col, probability)`; ties resolve to the first in row-major order.
    pub fn argmax(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &value) in self.cells.iter().enumerate() {
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((idx, value)),
            }
        }
        best.map(|(idx, value)| (idx / self.width, idx % self.width, value))
    }

    pub fn nonzero_count(&self) -> usize {
        self.cells.iter().filter(|&&value| value > 0.0).count()
    }

    pub fn count_above(&self, epsilon: f64) -> usize {
        self.cells.iter().filter(|&&value| value >= epsilon).count()
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            total: self.total(),
            max: self.max(),
            mean: self.mean(),
            nonzero: self.nonzero_count(),
        }
    }

    /// Rescale to a total of 1.0 and return the total before rescaling.
    ///
    /// A grid with no finite positive mass is left untouched.
    pub fn normalize(&mut self) -> f64 {
        let total = self.total();
        if total > 0.0 && total.is_finite() {
            let scale = 1.0 / total;
            for value in &mut self.cells {
                *value *= scale;
            }
        }
        total
    }

    /// `[row][col]` copy with sub-epsilon cells written as zero. The grid itself is unchanged.
    pub fn to_matrix(&self, epsilon: f64) -> Vec<Vec<f64>> {
        self.rows()
            .map(|row| {
                row.iter()
                    .map(|&value| if value >= epsilon { value } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    /// Up to `limit` cells at or above `epsilon`, highest first.
    pub fn top_cells(&self, limit: usize, epsilon: f64) -> Vec<(usize, usize, f64)> {
        let mut cells: Vec<(usize, f64)> = self
            .cells
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, value)| *value >= epsilon)
            .collect();
        cells.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        cells
            .into_iter()
            .take(limit)
            .map(|(idx, value)| (idx / self.width, idx % self.width, value))
            .collect()
    }
}
