//! Episode-level value types shared by agents and the experiment loop.

use serde::{Deserialize, Serialize};

/// Outcome of one call to [`Agent::run`](crate::ports::Agent::run).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    /// Environment steps taken in the episode
    pub steps: usize,
    /// Sum of rewards collected in the episode
    pub episode_return: f64,
    /// Whether the episode ended in a collision
    pub collision: bool,
}

impl EpisodeResult {
    pub fn new(steps: usize, episode_return: f64, collision: bool) -> Self {
        Self {
            steps,
            episode_return,
            collision,
        }
    }
}

/// Running totals over a phase of the experiment.
///
/// The training phase keeps one aggregate for the whole run and only clears
/// its collision counter at evaluation boundaries; every evaluation block
/// starts from a fresh aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningAggregate {
    pub total_steps: usize,
    pub total_episodes: usize,
    pub sum_returns: f64,
    pub collisions: usize,
}

impl RunningAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &EpisodeResult) {
        self.total_steps += result.steps;
        self.total_episodes += 1;
        self.sum_returns += result.episode_return;
        if result.collision {
            self.collisions += 1;
        }
    }

    /// Mean episodic return, `0.0` before any episode is recorded.
    pub fn average_return(&self) -> f64 {
        if self.total_episodes > 0 {
            self.sum_returns / self.total_episodes as f64
        } else {
            0.0
        }
    }

    /// Collisions divided by `denominator`, `0.0` when the denominator is zero.
    pub fn collision_rate(&self, denominator: usize) -> f64 {
        if denominator > 0 {
            self.collisions as f64 / denominator as f64
        } else {
            0.0
        }
    }

    pub fn reset_collisions(&mut self) {
        self.collisions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aggregate_has_zero_average() {
        let agg = RunningAggregate::new();
        assert_eq!(agg.average_return(), 0.0);
        assert_eq!(agg.collision_rate(0), 0.0);
    }

    #[test]
    fn average_is_running_mean() {
        let mut agg = RunningAggregate::new();
        let returns = [3.0, -1.0, 4.0, 10.0];
        for (k, r) in returns.iter().enumerate() {
            agg.record(&EpisodeResult::new(5, *r, false));
            let expected = returns[..=k].iter().sum::<f64>() / (k + 1) as f64;
            assert!((agg.average_return() - expected).abs() < 1e-12);
        }
        assert_eq!(agg.total_steps, 20);
        assert_eq!(agg.total_episodes, 4);
    }

    #[test]
    fn collisions_count_and_reset() {
        let mut agg = RunningAggregate::new();
        agg.record(&EpisodeResult::new(1, 0.0, true));
        agg.record(&EpisodeResult::new(1, 0.0, false));
        agg.record(&EpisodeResult::new(1, 0.0, true));
        assert_eq!(agg.collisions, 2);
        assert_eq!(agg.collision_rate(4), 0.5);

        agg.reset_collisions();
        assert_eq!(agg.collisions, 0);
        assert_eq!(agg.total_episodes, 3);
    }
}
