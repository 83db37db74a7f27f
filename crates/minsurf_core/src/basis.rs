/// One-dimensional Lagrange basis on `order + 1` equispaced nodes in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeBasis {
    nodes: Vec<f64>,
    /// `1 / prod_{m != k} (x_k - x_m)` per node.
    denominators: Vec<f64>,
}

impl LagrangeBasis {
    pub fn new(order: usize) -> Self {
        let order = order.max(1);
        let nodes: Vec<f64> = (0..=order).map(|k| k as f64 / order as f64).collect();
        let denominators = (0..nodes.len())
            .map(|k| {
                let product: f64 = (0..nodes.len())
                    .filter(|&m| m != k)
                    .map(|m| nodes[k] - nodes[m])
                    .product();
                1.0 / product
            })
            .collect();
        Self {
            nodes,
            denominators,
        }
    }

    pub fn order(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Writes `L_k(s)` for every node `k` into `out`.
    pub fn eval(&self, s: f64, out: &mut [f64]) {
        for k in 0..self.nodes.len() {
            let mut value = self.denominators[k];
            for (m, &node) in self.nodes.iter().enumerate() {
                if m != k {
                    value *= s - node;
                }
            }
            out[k] = value;
        }
    }

    /// Writes `L_k'(s)` for every node `k` into `out`.
    pub fn eval_derivative(&self, s: f64, out: &mut [f64]) {
        let n = self.nodes.len();
        for k in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                if j == k {
                    continue;
                }
                let mut term = 1.0;
                for m in 0..n {
                    if m != k && m != j {
                        term *= s - self.nodes[m];
                    }
                }
                sum += term;
            }
            out[k] = sum * self.denominators[k];
        }
    }

    pub fn values(&self, s: f64) -> Vec<f64> {
        let mut out = vec![0.0; self.nodes.len()];
        self.eval(s, &mut out);
        out
    }

    pub fn derivatives(&self, s: f64) -> Vec<f64> {
        let mut out = vec![0.0; self.nodes.len()];
        self.eval_derivative(s, &mut out);
        out
    }
}

/// Evaluates a tensor-product field stored lexicographically (`a + b * (p + 1)`)
/// at the reference point `(s, t)`.
pub fn eval_tensor(basis: &LagrangeBasis, values: &[[f64; 3]], s: f64, t: f64) -> [f64; 3] {
    let n = basis.len();
    let bs = basis.values(s);
    let bt = basis.values(t);
    let mut out = [0.0; 3];
    for b in 0..n {
        for a in 0..n {
            let weight = bs[a] * bt[b];
            let value = &values[a + b * n];
            for d in 0..3 {
                out[d] += weight * value[d];
            }
        }
    }
    out
}
