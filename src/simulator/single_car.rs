//! Single controlled car following a leader, with a human-driven follower.
//!
//! Longitudinal kinematics only. The action in `[-15, 15]` is mapped
//! linearly to an acceleration command between the maximum deceleration and
//! the maximum acceleration. The leader tracks a randomly drifting target
//! speed and occasionally brakes hard; the follower drives with the
//! Intelligent Driver Model. A collision with either neighbour ends the
//! episode, as does reaching the end of the route.

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ACTION_DIM, ACTION_LIMIT, OBSERVATION_DIM};
use crate::{
    Error, Result,
    ports::{Environment, Transition},
    utils::build_rng,
};

const SPEED_SCALE: f64 = 30.0;
const GAP_SCALE: f64 = 100.0;
const MAX_HEADWAY: f64 = 10.0;
const MAX_INVERSE_TTC: f64 = 5.0;
const EMERGENCY_DECEL: f64 = 9.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCarConfig {
    /// Simulation step in seconds
    pub dt: f64,
    /// Route length in metres; reaching it ends the episode
    pub route_length: f64,
    pub vehicle_length: f64,
    /// Bumper-to-bumper gap to each neighbour at reset
    pub initial_gap: f64,
    pub max_accel: f64,
    pub max_decel: f64,
    /// Candidate speed limits in m/s; one is drawn per episode
    pub speed_limits: Vec<f64>,
    /// Per-step probability that the leader starts an emergency brake
    pub leader_brake_prob: f64,
    pub leader_brake_decel: f64,
    /// Per-step probability that the leader picks a new target speed
    pub leader_retarget_prob: f64,
    /// Follower IDM desired time gap in seconds
    pub follower_time_gap: f64,
    /// Follower IDM standstill gap in metres
    pub follower_min_gap: f64,
    pub follower_accel: f64,
    pub follower_decel: f64,
    /// Time headway below which the agent is penalised
    pub headway_threshold: f64,
    pub efficiency_weight: f64,
    pub headway_penalty: f64,
    pub comfort_weight: f64,
    pub overspeed_weight: f64,
    pub collision_penalty: f64,
}

impl Default for SingleCarConfig {
    fn default() -> Self {
        Self {
            dt: 0.5,
            route_length: 3000.0,
            vehicle_length: 5.0,
            initial_gap: 30.0,
            max_accel: 2.6,
            max_decel: 4.5,
            speed_limits: vec![13.89, 16.67, 19.44],
            leader_brake_prob: 0.01,
            leader_brake_decel: 6.0,
            leader_retarget_prob: 0.02,
            follower_time_gap: 1.5,
            follower_min_gap: 2.0,
            follower_accel: 1.5,
            follower_decel: 2.0,
            headway_threshold: 1.0,
            efficiency_weight: 0.1,
            headway_penalty: 0.1,
            comfort_weight: 0.01,
            overspeed_weight: 0.1,
            collision_penalty: 10.0,
        }
    }
}

impl SingleCarConfig {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("dt", self.dt),
            ("route_length", self.route_length),
            ("max_accel", self.max_accel),
            ("max_decel", self.max_decel),
            ("follower_accel", self.follower_accel),
            ("follower_decel", self.follower_decel),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.speed_limits.is_empty() || self.speed_limits.iter().any(|v| *v <= 0.0) {
            return Err(Error::config("speed_limits must be non-empty and positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Vehicle {
    position: f64,
    speed: f64,
    accel: f64,
}

impl Vehicle {
    /// Integrate one step. Speed never goes negative, so the stored
    /// acceleration is the one actually realised.
    fn advance(&mut self, accel: f64, dt: f64) {
        let speed = (self.speed + accel * dt).max(0.0);
        self.accel = (speed - self.speed) / dt;
        self.position += 0.5 * (self.speed + speed) * dt;
        self.speed = speed;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Episode {
    ego: Vehicle,
    leader: Vehicle,
    follower: Vehicle,
    speed_limit: f64,
    leader_target: f64,
    leader_brake_steps: usize,
    previous_action: f64,
    steps: usize,
}

pub struct SingleCarEnv {
    config: SingleCarConfig,
    rng: StdRng,
    episode: Option<Episode>,
}

impl SingleCarEnv {
    /// Environment seeded for reproducible traffic.
    pub fn new(config: SingleCarConfig, seed: u64) -> Self {
        Self {
            config,
            rng: build_rng(seed),
            episode: None,
        }
    }

    /// Like [`new`](Self::new) but rejects nonsensical configurations.
    pub fn try_new(config: SingleCarConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config, seed))
    }

    pub fn config(&self) -> &SingleCarConfig {
        &self.config
    }

    /// Whether an episode is in progress.
    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    /// Speed limit of the current episode.
    pub fn speed_limit(&self) -> Option<f64> {
        self.episode.map(|e| e.speed_limit)
    }

    fn leader_gap(&self, e: &Episode) -> f64 {
        e.leader.position - e.ego.position - self.config.vehicle_length
    }

    fn follower_gap(&self, e: &Episode) -> f64 {
        e.ego.position - e.follower.position - self.config.vehicle_length
    }

    fn observe(&self, e: &Episode) -> Vec<f64> {
        let leader_gap = self.leader_gap(e);
        let follower_gap = self.follower_gap(e);
        let headway = (leader_gap.max(0.0) / e.ego.speed.max(0.1)).min(MAX_HEADWAY);
        let closing = e.ego.speed - e.leader.speed;
        let inverse_ttc = if closing > 0.0 && leader_gap > 0.0 {
            (closing / leader_gap).min(MAX_INVERSE_TTC)
        } else {
            0.0
        };
        vec![
            e.ego.speed / SPEED_SCALE,
            e.ego.accel / self.config.max_decel,
            leader_gap / GAP_SCALE,
            e.leader.speed / SPEED_SCALE,
            (e.leader.speed - e.ego.speed) / SPEED_SCALE,
            e.leader.accel / self.config.max_decel,
            headway / MAX_HEADWAY,
            inverse_ttc / MAX_INVERSE_TTC,
            follower_gap / GAP_SCALE,
            e.follower.speed / SPEED_SCALE,
            (e.ego.speed - e.follower.speed) / SPEED_SCALE,
            (e.ego.position / self.config.route_length).clamp(0.0, 1.0),
            e.previous_action,
            e.speed_limit / SPEED_SCALE,
        ]
    }

    fn leader_accel(&mut self, e: &mut Episode) -> f64 {
        if e.leader_brake_steps > 0 {
            e.leader_brake_steps -= 1;
            return -self.config.leader_brake_decel;
        }
        if self.rng.random_bool(self.config.leader_brake_prob.clamp(0.0, 1.0)) {
            e.leader_brake_steps = self.rng.random_range(1..=4);
            debug!(position = e.leader.position, "leader emergency brake");
            return -self.config.leader_brake_decel;
        }
        if self.rng.random_bool(self.config.leader_retarget_prob.clamp(0.0, 1.0)) {
            e.leader_target = self.rng.random_range(0.4..1.0) * e.speed_limit;
        }
        (0.5 * (e.leader_target - e.leader.speed) / self.config.dt)
            .clamp(-self.config.max_decel, self.config.max_accel)
    }

    /// Intelligent Driver Model acceleration of the follower behind the ego.
    fn follower_accel(&self, e: &Episode) -> f64 {
        let c = &self.config;
        let gap = self.follower_gap(e);
        if gap <= 0.1 {
            return -EMERGENCY_DECEL;
        }
        let v = e.follower.speed;
        let dv = v - e.ego.speed;
        let desired = c.follower_min_gap
            + (v * c.follower_time_gap
                + v * dv / (2.0 * (c.follower_accel * c.follower_decel).sqrt()))
            .max(0.0);
        let free_road = (v / e.speed_limit).powi(4);
        (c.follower_accel * (1.0 - free_road - (desired / gap).powi(2)))
            .clamp(-EMERGENCY_DECEL, c.follower_accel)
    }

    fn reward(&self, e: &Episode, jerk: f64, collision: bool) -> f64 {
        let c = &self.config;
        let v = e.ego.speed;
        let mut reward = c.efficiency_weight * (v / e.speed_limit).min(1.0);
        if v > e.speed_limit {
            reward -= c.overspeed_weight * (v - e.speed_limit) / e.speed_limit;
        }
        let leader_gap = self.leader_gap(e);
        if leader_gap / v.max(0.1) < c.headway_threshold {
            reward -= c.headway_penalty;
        }
        reward -= c.comfort_weight * (jerk / (c.max_accel + c.max_decel)).powi(2);
        if collision {
            reward -= c.collision_penalty;
        }
        reward
    }
}

impl Environment for SingleCarEnv {
    fn observation_dim(&self) -> usize {
        OBSERVATION_DIM
    }

    fn action_dim(&self) -> usize {
        ACTION_DIM
    }

    fn action_limit(&self) -> f64 {
        ACTION_LIMIT
    }

    fn reset(&mut self) -> Result<Vec<f64>> {
        let limits = &self.config.speed_limits;
        if limits.is_empty() {
            return Err(Error::config("speed_limits must not be empty"));
        }
        let speed_limit = limits[self.rng.random_range(0..limits.len())];
        let spacing = self.config.initial_gap + self.config.vehicle_length;
        let ego_speed = self.rng.random_range(0.5..1.0) * speed_limit;
        let leader_speed = self.rng.random_range(0.5..1.0) * speed_limit;
        let leader_target = self.rng.random_range(0.6..1.0) * speed_limit;

        let episode = Episode {
            ego: Vehicle {
                position: spacing,
                speed: ego_speed,
                accel: 0.0,
            },
            leader: Vehicle {
                position: 2.0 * spacing,
                speed: leader_speed,
                accel: 0.0,
            },
            follower: Vehicle {
                position: 0.0,
                speed: ego_speed,
                accel: 0.0,
            },
            speed_limit,
            leader_target,
            leader_brake_steps: 0,
            previous_action: 0.0,
            steps: 0,
        };
        let observation = self.observe(&episode);
        self.episode = Some(episode);
        Ok(observation)
    }

    fn step(&mut self, action: &[f64]) -> Result<Transition> {
        let Some(mut e) = self.episode else {
            return Err(Error::Simulation {
                message: "step called without an active episode; call reset first".to_string(),
            });
        };
        if action.len() != ACTION_DIM {
            return Err(Error::DimensionMismatch {
                what: "action".to_string(),
                expected: ACTION_DIM,
                got: action.len(),
            });
        }
        let raw = action[0];
        if !raw.is_finite() {
            return Err(Error::Simulation {
                message: format!("non-finite action {raw}"),
            });
        }

        let normalized = raw.clamp(-ACTION_LIMIT, ACTION_LIMIT) / ACTION_LIMIT;
        let command = if normalized >= 0.0 {
            normalized * self.config.max_accel
        } else {
            normalized * self.config.max_decel
        };
        let dt = self.config.dt;
        let previous_accel = e.ego.accel;

        let leader_accel = self.leader_accel(&mut e);
        let follower_accel = self.follower_accel(&e);
        e.ego.advance(command, dt);
        e.leader.advance(leader_accel, dt);
        e.follower.advance(follower_accel, dt);
        e.previous_action = normalized;
        e.steps += 1;

        let collision = self.leader_gap(&e) <= 0.0 || self.follower_gap(&e) <= 0.0;
        let finished = e.ego.position >= self.config.route_length;
        let done = collision || finished;
        let reward = self.reward(&e, e.ego.accel - previous_accel, collision);
        let observation = self.observe(&e);

        if done {
            debug!(steps = e.steps, collision, "episode finished");
            self.episode = None;
        } else {
            self.episode = Some(e);
        }

        Ok(Transition {
            observation,
            reward,
            done,
            collision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollout(env: &mut SingleCarEnv, action: f64, max_steps: usize) -> Vec<Transition> {
        env.reset().unwrap();
        let mut transitions = Vec::new();
        for _ in 0..max_steps {
            let t = env.step(&[action]).unwrap();
            let done = t.done;
            transitions.push(t);
            if done {
                break;
            }
        }
        transitions
    }

    #[test]
    fn exposes_driving_contract() {
        let mut env = SingleCarEnv::new(SingleCarConfig::default(), 0);
        assert_eq!(env.observation_dim(), 14);
        assert_eq!(env.action_dim(), 1);
        assert_eq!(env.action_limit(), 15.0);
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), 14);
        assert!(obs.iter().all(|x| x.is_finite()));
        assert!(
            SingleCarConfig::default()
                .speed_limits
                .contains(&env.speed_limit().unwrap())
        );
    }

    #[test]
    fn step_before_reset_is_an_error() {
        let mut env = SingleCarEnv::new(SingleCarConfig::default(), 0);
        assert!(matches!(env.step(&[0.0]), Err(Error::Simulation { .. })));
    }

    #[test]
    fn rejects_malformed_actions() {
        let mut env = SingleCarEnv::new(SingleCarConfig::default(), 0);
        env.reset().unwrap();
        assert!(matches!(
            env.step(&[0.0, 1.0]),
            Err(Error::DimensionMismatch { expected: 1, got: 2, .. })
        ));
        assert!(env.step(&[f64::NAN]).is_err());
        assert!(env.step(&[0.0]).is_ok());
    }

    #[test]
    fn same_seed_same_traffic() {
        let mut a = SingleCarEnv::new(SingleCarConfig::default(), 42);
        let mut b = SingleCarEnv::new(SingleCarConfig::default(), 42);
        assert_eq!(rollout(&mut a, 3.0, 100), rollout(&mut b, 3.0, 100));
    }

    #[test]
    fn ramming_the_leader_ends_the_episode() {
        let config = SingleCarConfig {
            initial_gap: 2.0,
            leader_brake_prob: 1.0,
            ..SingleCarConfig::default()
        };
        let mut env = SingleCarEnv::new(config, 3);
        let transitions = rollout(&mut env, 15.0, 200);
        let last = transitions.last().unwrap();
        assert!(last.done);
        assert!(last.collision);
        assert!(last.reward < -9.0);
        assert!(!env.is_active());
        assert!(env.step(&[0.0]).is_err(), "stepping after the end must fail");
    }

    #[test]
    fn out_of_range_actions_are_clamped() {
        let mut a = SingleCarEnv::new(SingleCarConfig::default(), 9);
        let mut b = SingleCarEnv::new(SingleCarConfig::default(), 9);
        assert_eq!(rollout(&mut a, 100.0, 20), rollout(&mut b, 15.0, 20));
    }

    #[test]
    fn try_new_validates() {
        let config = SingleCarConfig {
            speed_limits: vec![],
            ..SingleCarConfig::default()
        };
        assert!(SingleCarEnv::try_new(config, 0).is_err());
        assert!(SingleCarEnv::try_new(SingleCarConfig::default(), 0).is_ok());
    }
}
