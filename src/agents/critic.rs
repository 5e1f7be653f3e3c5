//! Linear value functions.
//!
//! `LinearValue` is a state-value baseline `V(s) = v · [obs, 1]` fitted by
//! ridge regression. `LinearCritic` is an action-value function over the
//! features `[φ, a_j φ, a_j²]` where `φ = [obs, 1]` and `a` is the action in
//! `[-1, 1]`, which keeps `∂Q/∂a` available in closed form.

use serde::{Deserialize, Serialize};

use crate::utils::dot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearValue {
    weights: Vec<f64>,
    ridge: f64,
}

impl LinearValue {
    pub fn new(feature_dim: usize, ridge: f64) -> Self {
        Self {
            weights: vec![0.0; feature_dim],
            ridge,
        }
    }

    pub fn value(&self, features: &[f64]) -> f64 {
        dot(&self.weights, features)
    }

    /// Refit to `targets` by solving `(XᵀX + λI) v = Xᵀy`.
    ///
    /// Leaves the weights untouched if the system is singular.
    pub fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> f64 {
        debug_assert_eq!(features.len(), targets.len());
        let n = self.weights.len();
        let mut gram = vec![vec![0.0; n]; n];
        let mut rhs = vec![0.0; n];
        for (x, y) in features.iter().zip(targets) {
            for i in 0..n {
                rhs[i] += x[i] * y;
                for j in 0..n {
                    gram[i][j] += x[i] * x[j];
                }
            }
        }
        for (i, row) in gram.iter_mut().enumerate() {
            row[i] += self.ridge;
        }
        if let Some(solution) = solve_linear_system(gram, rhs) {
            self.weights = solution;
        }
        self.mse(features, targets)
    }

    pub fn mse(&self, features: &[Vec<f64>], targets: &[f64]) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        features
            .iter()
            .zip(targets)
            .map(|(x, y)| (self.value(x) - y).powi(2))
            .sum::<f64>()
            / targets.len() as f64
    }
}

/// Gaussian elimination with partial pivoting.
pub(crate) fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCritic {
    feature_dim: usize,
    act_dim: usize,
    weights: Vec<f64>,
}

impl LinearCritic {
    pub fn new(feature_dim: usize, act_dim: usize) -> Self {
        Self {
            feature_dim,
            act_dim,
            weights: vec![0.0; feature_dim * (1 + act_dim) + act_dim],
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `ψ(φ, a) = [φ, a_0 φ, .., a_{d-1} φ, a_0², .., a_{d-1}²]`
    pub fn features(&self, state_features: &[f64], action: &[f64]) -> Vec<f64> {
        let mut psi = Vec::with_capacity(self.weights.len());
        psi.extend_from_slice(state_features);
        for a in action {
            psi.extend(state_features.iter().map(|f| a * f));
        }
        psi.extend(action.iter().map(|a| a * a));
        psi
    }

    pub fn value(&self, state_features: &[f64], action: &[f64]) -> f64 {
        dot(&self.weights, &self.features(state_features, action))
    }

    /// `∂Q/∂a_j` for every action dimension.
    pub fn action_gradient(&self, state_features: &[f64], action: &[f64]) -> Vec<f64> {
        let f = self.feature_dim;
        let square_offset = f * (1 + self.act_dim);
        (0..self.act_dim)
            .map(|j| {
                let block = &self.weights[f * (1 + j)..f * (2 + j)];
                dot(block, state_features) + 2.0 * self.weights[square_offset + j] * action[j]
            })
            .collect()
    }

    /// One gradient step on the mean squared TD error; returns the loss
    /// before the step.
    pub fn regress(&mut self, batch: &[(Vec<f64>, f64)], lr: f64) -> f64 {
        if batch.is_empty() {
            return 0.0;
        }
        let n = batch.len() as f64;
        let mut grad = vec![0.0; self.weights.len()];
        let mut loss = 0.0;
        for (psi, target) in batch {
            let err = dot(&self.weights, psi) - target;
            loss += err * err;
            for (g, x) in grad.iter_mut().zip(psi) {
                *g += err * x;
            }
        }
        for (w, g) in self.weights.iter_mut().zip(&grad) {
            *w -= lr * g / n;
        }
        loss / n
    }

    pub(crate) fn soft_update_from(&mut self, source: &LinearCritic, tau: f64) {
        crate::utils::soft_update(&mut self.weights, &source.weights, tau);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let b = vec![3.0, 5.0];
        let x = solve_linear_system(a, b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn singular_system_returns_none() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve_linear_system(a, vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn value_fit_recovers_linear_target() {
        let mut v = LinearValue::new(2, 1e-6);
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64 / 10.0, 1.0]).collect();
        let targets: Vec<f64> = features.iter().map(|x| 3.0 * x[0] - 1.0).collect();
        let mse = v.fit(&features, &targets);
        assert!(mse < 1e-8);
        assert!((v.value(&[1.0, 1.0]) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn action_gradient_matches_finite_difference() {
        let mut critic = LinearCritic::new(3, 1);
        critic.weights = vec![0.1, -0.2, 0.3, 0.5, 0.4, -0.1, -0.7];
        let phi = [0.2, -0.5, 1.0];
        let a = [0.3];
        let h = 1e-6;
        let numeric = (critic.value(&phi, &[a[0] + h]) - critic.value(&phi, &[a[0] - h])) / (2.0 * h);
        let analytic = critic.action_gradient(&phi, &a)[0];
        assert!((numeric - analytic).abs() < 1e-6);
    }

    #[test]
    fn regression_reduces_error() {
        let mut critic = LinearCritic::new(2, 1);
        let batch: Vec<(Vec<f64>, f64)> = (0..10)
            .map(|i| {
                let phi = [i as f64 / 10.0, 1.0];
                (critic.features(&phi, &[0.5]), 2.0)
            })
            .collect();
        let first = critic.regress(&batch, 0.1);
        let mut last = first;
        for _ in 0..200 {
            last = critic.regress(&batch, 0.1);
        }
        assert!(last < first * 0.1);
    }
}
