//! Dense linear algebra for small model matrices

/// Row-major square matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return None;
        }
        Some(Self {
            n,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n + col] = value;
    }

    pub fn add_to(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n + col] += value;
    }

    /// `self += scale * u v^T`
    pub fn add_outer(&mut self, u: &[f64], v: &[f64], scale: f64) {
        for (i, ui) in u.iter().enumerate() {
            for (j, vj) in v.iter().enumerate() {
                self.add_to(i, j, scale * ui * vj);
            }
        }
    }

    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.n)
            .map(|i| (0..self.n).map(|j| self.get(i, j) * v[j]).sum())
            .collect()
    }

    /// Inverse and `ln|det|` by Gauss-Jordan elimination with partial pivoting.
    ///
    /// `None` when a pivot falls below a relative tolerance.
    pub fn inverse_with_log_det(&self) -> Option<(SquareMatrix, f64)> {
        let n = self.n;
        let mut a = self.clone();
        let mut inv = Self::identity(n);
        let scale = self.data.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if scale == 0.0 {
            return None;
        }
        let tolerance = scale * 1e-12;
        let mut log_det = 0.0;

        for col in 0..n {
            let pivot_row = (col..n).max_by(|&r1, &r2| a.get(r1, col).abs().total_cmp(&a.get(r2, col).abs()))?;
            let pivot = a.get(pivot_row, col);
            if pivot.abs() < tolerance {
                return None;
            }
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }
            log_det += pivot.abs().ln();

            for j in 0..n {
                a.set(col, j, a.get(col, j) / pivot);
                inv.set(col, j, inv.get(col, j) / pivot);
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a.get(row, col);
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n {
                    a.add_to(row, j, -factor * a.get(col, j));
                    inv.add_to(row, j, -factor * inv.get(col, j));
                }
            }
        }
        Some((inv, log_det))
    }

    fn swap_rows(&mut self, r1: usize, r2: usize) {
        for j in 0..self.n {
            self.data.swap(r1 * self.n + j, r2 * self.n + j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_2x2() {
        let m = SquareMatrix::from_rows(&[vec![4.0, 7.0], vec![2.0, 6.0]]).unwrap();
        let (inv, log_det) = m.inverse_with_log_det().unwrap();
        assert!((inv.get(0, 0) - 0.6).abs() < 1e-12);
        assert!((inv.get(0, 1) - -0.7).abs() < 1e-12);
        assert!((inv.get(1, 0) - -0.2).abs() < 1e-12);
        assert!((inv.get(1, 1) - 0.4).abs() < 1e-12);
        assert!((log_det - 10f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        let m = SquareMatrix::from_rows(&[
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, 3.0],
            vec![4.0, -3.0, 8.0],
        ])
        .unwrap();
        let (inv, _) = m.inverse_with_log_det().unwrap();
        // m * inv == I
        for i in 0..3 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|k| m.get(i, k) * inv.get(k, j)).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_singular() {
        let m = SquareMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        assert!(m.inverse_with_log_det().is_none());
        assert!(SquareMatrix::zeros(2).inverse_with_log_det().is_none());
    }

    #[test]
    fn test_outer_and_mul() {
        let mut m = SquareMatrix::identity(2);
        m.add_outer(&[1.0, 2.0], &[3.0, 4.0], 0.5);
        assert_eq!(m.get(0, 0), 2.5);
        assert_eq!(m.get(1, 1), 5.0);
        assert_eq!(m.mul_vec(&[1.0, 1.0]), vec![2.5 + 2.0, 3.0 + 5.0]);
    }
}
