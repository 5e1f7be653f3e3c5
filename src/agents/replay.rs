//! Fixed-capacity replay buffer with uniform sampling.

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransition {
    /// Policy features of the state
    pub features: Vec<f64>,
    /// Action taken, in `[-1, 1]`
    pub action: Vec<f64>,
    pub reward: f64,
    pub next_features: Vec<f64>,
    /// Terminal transition (no bootstrapping)
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    storage: Vec<StoredTransition>,
    next: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            storage: Vec::with_capacity(capacity.min(4096)),
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert, overwriting the oldest entry once full.
    pub fn push(&mut self, transition: StoredTransition) {
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.next] = transition;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Sample `batch_size` transitions with replacement.
    pub fn sample<'a, R: Rng + ?Sized>(
        &'a self,
        batch_size: usize,
        rng: &mut R,
    ) -> Vec<&'a StoredTransition> {
        if self.storage.is_empty() {
            return Vec::new();
        }
        (0..batch_size)
            .map(|_| &self.storage[rng.random_range(0..self.storage.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::build_rng;

    fn transition(reward: f64) -> StoredTransition {
        StoredTransition {
            features: vec![reward],
            action: vec![0.0],
            reward,
            next_features: vec![reward],
            done: false,
        }
    }

    #[test]
    fn wraps_around_at_capacity() {
        let mut buffer = ReplayBuffer::new(3);
        for r in 0..5 {
            buffer.push(transition(r as f64));
        }
        assert_eq!(buffer.len(), 3);
        let rewards: Vec<f64> = buffer.storage.iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![3.0, 4.0, 2.0]);
    }

    #[test]
    fn sampling_empty_buffer_yields_nothing() {
        let buffer = ReplayBuffer::new(10);
        let mut rng = build_rng(0);
        assert!(buffer.sample(4, &mut rng).is_empty());
    }

    #[test]
    fn samples_requested_batch() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(transition(1.0));
        buffer.push(transition(2.0));
        let mut rng = build_rng(0);
        let batch = buffer.sample(8, &mut rng);
        assert_eq!(batch.len(), 8);
        assert!(batch.iter().all(|t| t.reward == 1.0 || t.reward == 2.0));
    }
}
