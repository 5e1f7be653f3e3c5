//! Linear Gaussian policy with tanh-squashed actions.
//!
//! The pre-squash mean is linear in the observation features `[obs, 1]`; the
//! standard deviation is a state-independent learned vector. Actions live in
//! `[-1, 1]` inside the agent and are scaled by the action limit only when
//! handed to the environment.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const LOG_STD_MIN: f64 = -5.0;
pub const LOG_STD_MAX: f64 = 2.0;

const SQUASH_EPS: f64 = 1e-6;

/// One draw from the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySample {
    /// Gaussian sample before squashing
    pub pre_tanh: Vec<f64>,
    /// Standard-normal noise used for the draw
    pub noise: Vec<f64>,
    /// `tanh(pre_tanh)`, in `[-1, 1]`
    pub normalized_action: Vec<f64>,
    /// Log-density of the squashed action
    pub log_prob: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianPolicy {
    obs_dim: usize,
    act_dim: usize,
    act_limit: f64,
    /// Row-major `act_dim x (obs_dim + 1)`; the last column is the bias
    weights: Vec<f64>,
    log_std: Vec<f64>,
}

impl GaussianPolicy {
    /// Small random weights, zero bias, constant initial log-std.
    pub fn new<R: Rng + ?Sized>(
        obs_dim: usize,
        act_dim: usize,
        act_limit: f64,
        init_log_std: f64,
        rng: &mut R,
    ) -> Self {
        let feature_dim = obs_dim + 1;
        let weights = (0..act_dim * feature_dim)
            .map(|i| {
                if i % feature_dim == obs_dim {
                    0.0
                } else {
                    0.01 * rng.sample::<f64, _>(StandardNormal)
                }
            })
            .collect();
        Self {
            obs_dim,
            act_dim,
            act_limit,
            weights,
            log_std: vec![init_log_std.clamp(LOG_STD_MIN, LOG_STD_MAX); act_dim],
        }
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    pub fn act_limit(&self) -> f64 {
        self.act_limit
    }

    pub fn feature_dim(&self) -> usize {
        self.obs_dim + 1
    }

    pub fn num_params(&self) -> usize {
        self.weights.len() + self.log_std.len()
    }

    pub fn log_std(&self) -> &[f64] {
        &self.log_std
    }

    pub fn std(&self) -> Vec<f64> {
        self.log_std.iter().map(|l| l.exp()).collect()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `[obs, 1]`
    pub fn features(&self, obs: &[f64]) -> Vec<f64> {
        let mut features = Vec::with_capacity(self.feature_dim());
        features.extend_from_slice(obs);
        features.push(1.0);
        features
    }

    /// Pre-squash mean for each action dimension.
    pub fn mean(&self, features: &[f64]) -> Vec<f64> {
        self.weights
            .chunks(self.feature_dim())
            .map(|row| crate::utils::dot(row, features))
            .collect()
    }

    /// Greedy action in `[-1, 1]`.
    pub fn deterministic(&self, features: &[f64]) -> Vec<f64> {
        self.mean(features).into_iter().map(f64::tanh).collect()
    }

    pub fn sample<R: Rng + ?Sized>(&self, features: &[f64], rng: &mut R) -> PolicySample {
        let mean = self.mean(features);
        let noise: Vec<f64> = (0..self.act_dim)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        let pre_tanh: Vec<f64> = mean
            .iter()
            .zip(&self.log_std)
            .zip(&noise)
            .map(|((m, l), e)| m + l.exp() * e)
            .collect();
        let normalized_action = pre_tanh.iter().map(|u| u.tanh()).collect();
        let log_prob = self.log_prob_with_mean(&mean, &pre_tanh);
        PolicySample {
            pre_tanh,
            noise,
            normalized_action,
            log_prob,
        }
    }

    /// Log-density of the squashed action produced by `pre_tanh`.
    pub fn log_prob(&self, features: &[f64], pre_tanh: &[f64]) -> f64 {
        let mean = self.mean(features);
        self.log_prob_with_mean(&mean, pre_tanh)
    }

    fn log_prob_with_mean(&self, mean: &[f64], pre_tanh: &[f64]) -> f64 {
        mean.iter()
            .zip(&self.log_std)
            .zip(pre_tanh)
            .map(|((m, l), u)| {
                let z = (u - m) / l.exp();
                let squash = (1.0 - u.tanh().powi(2) + SQUASH_EPS).ln();
                -0.5 * z * z - l - 0.5 * (2.0 * PI).ln() - squash
            })
            .sum()
    }

    /// Gradient of `log_prob` with respect to the flat parameter vector.
    pub fn score(&self, features: &[f64], pre_tanh: &[f64]) -> Vec<f64> {
        let feature_dim = self.feature_dim();
        let mean = self.mean(features);
        let mut grad = vec![0.0; self.num_params()];
        for j in 0..self.act_dim {
            let var = (2.0 * self.log_std[j]).exp();
            let diff = pre_tanh[j] - mean[j];
            let d_mean = diff / var;
            for (k, f) in features.iter().enumerate() {
                grad[j * feature_dim + k] = d_mean * f;
            }
            grad[self.weights.len() + j] = diff * diff / var - 1.0;
        }
        grad
    }

    /// Mean `KL(self || other)` over a batch of feature vectors.
    pub fn kl_divergence(&self, other: &GaussianPolicy, batch: &[Vec<f64>]) -> f64 {
        if batch.is_empty() {
            return 0.0;
        }
        let total: f64 = batch
            .iter()
            .map(|features| {
                let mu_p = self.mean(features);
                let mu_q = other.mean(features);
                (0..self.act_dim)
                    .map(|j| {
                        let (lp, lq) = (self.log_std[j], other.log_std[j]);
                        let (vp, vq) = ((2.0 * lp).exp(), (2.0 * lq).exp());
                        lq - lp + (vp + (mu_p[j] - mu_q[j]).powi(2)) / (2.0 * vq) - 0.5
                    })
                    .sum::<f64>()
            })
            .sum();
        total / batch.len() as f64
    }

    /// Entropy of the (pre-squash) Gaussian.
    pub fn entropy(&self) -> f64 {
        self.log_std
            .iter()
            .map(|l| 0.5 + 0.5 * (2.0 * PI).ln() + l)
            .sum()
    }

    /// Scale a `[-1, 1]` action to the environment's bounds.
    pub fn to_env_action(&self, normalized: &[f64]) -> Vec<f64> {
        normalized.iter().map(|a| a * self.act_limit).collect()
    }

    /// Flat parameter vector: weights followed by log-std.
    pub fn params(&self) -> Vec<f64> {
        let mut params = self.weights.clone();
        params.extend_from_slice(&self.log_std);
        params
    }

    pub fn set_params(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(Error::DimensionMismatch {
                what: "policy parameters".to_string(),
                expected: self.num_params(),
                got: params.len(),
            });
        }
        let (weights, log_std) = params.split_at(self.weights.len());
        self.weights.copy_from_slice(weights);
        for (dst, src) in self.log_std.iter_mut().zip(log_std) {
            *dst = src.clamp(LOG_STD_MIN, LOG_STD_MAX);
        }
        Ok(())
    }

    /// `params += scale * delta`
    pub fn step(&mut self, delta: &[f64], scale: f64) -> Result<()> {
        let mut params = self.params();
        if delta.len() != params.len() {
            return Err(Error::DimensionMismatch {
                what: "policy step".to_string(),
                expected: params.len(),
                got: delta.len(),
            });
        }
        for (p, d) in params.iter_mut().zip(delta) {
            *p += scale * d;
        }
        self.set_params(&params)
    }

    /// Apply a gradient step to the mean weights of action dimension `j`.
    pub(crate) fn step_row(&mut self, j: usize, grad: &[f64], scale: f64) {
        let feature_dim = self.feature_dim();
        let row = &mut self.weights[j * feature_dim..(j + 1) * feature_dim];
        for (w, g) in row.iter_mut().zip(grad) {
            *w += scale * g;
        }
    }

    pub(crate) fn step_log_std(&mut self, j: usize, grad: f64, scale: f64) {
        self.log_std[j] = (self.log_std[j] + scale * grad).clamp(LOG_STD_MIN, LOG_STD_MAX);
    }

    /// Polyak-average toward `source`.
    pub(crate) fn soft_update_from(&mut self, source: &GaussianPolicy, tau: f64) {
        crate::utils::soft_update(&mut self.weights, &source.weights, tau);
        crate::utils::soft_update(&mut self.log_std, &source.log_std, tau);
    }

    /// Fail unless `other` has the same observation/action shape.
    pub fn ensure_same_shape(&self, other: &GaussianPolicy) -> Result<()> {
        if self.obs_dim != other.obs_dim {
            return Err(Error::DimensionMismatch {
                what: "policy observation".to_string(),
                expected: self.obs_dim,
                got: other.obs_dim,
            });
        }
        if self.act_dim != other.act_dim {
            return Err(Error::DimensionMismatch {
                what: "policy action".to_string(),
                expected: self.act_dim,
                got: other.act_dim,
            });
        }
        if other.weights.len() != self.weights.len() || other.log_std.len() != self.log_std.len()
        {
            return Err(Error::DimensionMismatch {
                what: "policy parameters".to_string(),
                expected: self.num_params(),
                got: other.num_params(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::build_rng;

    fn policy() -> GaussianPolicy {
        let mut rng = build_rng(3);
        GaussianPolicy::new(3, 1, 15.0, -0.5, &mut rng)
    }

    #[test]
    fn shapes() {
        let p = policy();
        assert_eq!(p.feature_dim(), 4);
        assert_eq!(p.num_params(), 5);
        assert_eq!(p.features(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 3.0, 1.0]);
        assert_eq!(p.weights()[3], 0.0, "bias starts at zero");
    }

    #[test]
    fn exploration_noise_is_standard_normal() {
        let mut p = policy();
        p.set_params(&[0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let f = p.features(&[0.3, -0.2, 0.1]);
        let mut rng = build_rng(21);
        let draws: Vec<f64> = (0..5000).map(|_| p.sample(&f, &mut rng).pre_tanh[0]).collect();
        assert!(crate::utils::mean(&draws).abs() < 0.1);
        assert!((crate::utils::std_dev(&draws) - 1.0).abs() < 0.1);

        let mut a = build_rng(5);
        let mut b = build_rng(5);
        assert_eq!(p.sample(&f, &mut a), p.sample(&f, &mut b));
    }

    #[test]
    fn actions_stay_in_bounds() {
        let mut p = policy();
        p.set_params(&[50.0, -20.0, 10.0, 3.0, 0.0]).unwrap();
        let mut rng = build_rng(9);
        let f = p.features(&[1.0, 1.0, 1.0]);
        for _ in 0..50 {
            let s = p.sample(&f, &mut rng);
            assert!(s.normalized_action.iter().all(|a| a.abs() <= 1.0));
            let env_action = p.to_env_action(&s.normalized_action);
            assert!(env_action.iter().all(|a| a.abs() <= 15.0));
        }
    }

    #[test]
    fn score_matches_finite_difference() {
        let mut p = policy();
        p.set_params(&[0.3, -0.2, 0.1, 0.05, -0.3]).unwrap();
        let f = p.features(&[0.5, -1.0, 0.25]);
        let u = vec![0.4];
        let analytic = p.score(&f, &u);
        let base = p.params();
        let h = 1e-6;
        for i in 0..base.len() {
            let mut plus = base.clone();
            plus[i] += h;
            let mut minus = base.clone();
            minus[i] -= h;
            let mut pp = p.clone();
            pp.set_params(&plus).unwrap();
            let mut pm = p.clone();
            pm.set_params(&minus).unwrap();
            let numeric = (pp.log_prob(&f, &u) - pm.log_prob(&f, &u)) / (2.0 * h);
            assert!(
                (numeric - analytic[i]).abs() < 1e-5,
                "param {i}: numeric {numeric} vs analytic {}",
                analytic[i]
            );
        }
    }

    #[test]
    fn kl_of_identical_policies_is_zero() {
        let p = policy();
        let batch = vec![p.features(&[1.0, 0.0, -1.0]), p.features(&[0.2, 0.3, 0.4])];
        assert!(p.kl_divergence(&p, &batch).abs() < 1e-12);

        let mut q = p.clone();
        q.step(&[0.0, 0.0, 0.0, 0.5, 0.0], 1.0).unwrap();
        assert!(p.kl_divergence(&q, &batch) > 0.0);
    }

    #[test]
    fn log_std_is_clamped() {
        let mut p = policy();
        p.set_params(&[0.0, 0.0, 0.0, 0.0, 100.0]).unwrap();
        assert_eq!(p.log_std()[0], LOG_STD_MAX);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let p = policy();
        let mut rng = build_rng(1);
        let other = GaussianPolicy::new(4, 1, 15.0, -0.5, &mut rng);
        assert!(p.ensure_same_shape(&other).is_err());
        assert!(p.ensure_same_shape(&p.clone()).is_ok());
    }
}
