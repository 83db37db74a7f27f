use nalgebra::{DMatrix, SymmetricEigen};

/// Gauss–Legendre rule on `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussLegendre {
    pub points: Vec<f64>,
    pub weights: Vec<f64>,
}

impl GaussLegendre {
    /// Builds an `n`-point rule with the Golub–Welsch eigenvalue method.
    pub fn new(n: usize) -> Self {
        let n = n.max(1);
        let mut jacobi = DMatrix::<f64>::zeros(n, n);
        for k in 1..n {
            let kf = k as f64;
            let beta = kf / (4.0 * kf * kf - 1.0).sqrt();
            jacobi[(k - 1, k)] = beta;
            jacobi[(k, k - 1)] = beta;
        }
        let eigen = SymmetricEigen::new(jacobi);

        let mut rule: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let x = eigen.eigenvalues[i];
                let v0 = eigen.eigenvectors[(0, i)];
                (0.5 * (x + 1.0), v0 * v0)
            })
            .collect();
        rule.sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            points: rule.iter().map(|r| r.0).collect(),
            weights: rule.iter().map(|r| r.1).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}
