use vigil_core::VigilError;

/// Per-column standardization: `(x - mean) / std`.
///
/// Columns with zero variance keep a unit scale so constant features pass
/// through centered instead of dividing by zero.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit column statistics (population std) over `rows`.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, VigilError> {
        let first = rows
            .first()
            .ok_or_else(|| VigilError::InvalidInput("cannot fit scaler on zero rows".into()))?;
        let dim = first.len();
        if rows.iter().any(|r| r.len() != dim) {
            return Err(VigilError::InvalidInput("ragged feature rows".into()));
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; dim];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut variance = vec![0.0; dim];
        for row in rows {
            for ((var, v), m) in variance.iter_mut().zip(row).zip(&means) {
                *var += (v - m).powi(2);
            }
        }
        let scales = variance
            .into_iter()
            .map(|var| {
                let std = (var / n).sqrt();
                if std <= f64::EPSILON { 1.0 } else { std }
            })
            .collect();

        Ok(Self { means, scales })
    }

    pub fn dim(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_columns() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let out = scaler.transform_all(&rows);

        let col0: Vec<f64> = out.iter().map(|r| r[0]).collect();
        assert!((col0.iter().sum::<f64>()).abs() < 1e-12);
        assert!((col0[2] - 1.224744871391589).abs() < 1e-9);
        // Constant column centers to zero with unit scale.
        assert!(out.iter().all(|r| r[1] == 0.0));
        assert_eq!(scaler.dim(), 2);
    }

    #[test]
    fn rejects_empty_and_ragged() {
        assert!(StandardScaler::fit(&[]).is_err());
        assert!(StandardScaler::fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
