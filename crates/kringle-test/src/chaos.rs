//! Chaos delivery for event frames
//!
//! Time is counted in ticks. Each frame sent into a link is scheduled
//! some ticks ahead, and on the way it may be:
//! - lost, alone or in a burst
//! - truncated, so it no longer decodes
//! - delivered twice
//! - overtaken by frames sent after it

use std::collections::VecDeque;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link impairment settings
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Delivery delay range in ticks, inclusive
    pub latency_ticks: (u32, u32),
    /// Independent loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Chance that a loss starts a burst
    pub burst_loss_prob: f64,
    /// Extra frames lost in a burst
    pub burst_length: (u32, u32),
    /// Chance a frame arrives cut short
    pub truncate_prob: f64,
    /// Chance a frame is delivered twice
    pub duplicate_prob: f64,
    /// Chance a frame jumps ahead of frames already in flight
    pub reorder_prob: f64,
    /// How many in-flight frames it can jump
    pub reorder_depth: usize,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig::poor()
    }
}

impl ChaosConfig {
    /// Every frame arrives once, in order
    pub fn perfect() -> Self {
        ChaosConfig {
            latency_ticks: (1, 1),
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            truncate_prob: 0.0,
            duplicate_prob: 0.0,
            reorder_prob: 0.0,
            reorder_depth: 0,
        }
    }

    /// At-least-once but unordered: duplicates and reordering, no loss
    pub fn unordered() -> Self {
        ChaosConfig {
            latency_ticks: (1, 6),
            duplicate_prob: 0.3,
            reorder_prob: 0.4,
            reorder_depth: 8,
            ..ChaosConfig::perfect()
        }
    }

    /// Occasional loss on top of duplication and reordering
    pub fn poor() -> Self {
        ChaosConfig {
            latency_ticks: (1, 10),
            loss_rate: 0.05,
            burst_loss_prob: 0.1,
            burst_length: (1, 3),
            truncate_prob: 0.02,
            duplicate_prob: 0.1,
            reorder_prob: 0.2,
            reorder_depth: 5,
        }
    }

    /// Heavy loss, corruption and churn
    pub fn hostile() -> Self {
        ChaosConfig {
            latency_ticks: (1, 30),
            loss_rate: 0.2,
            burst_loss_prob: 0.3,
            burst_length: (2, 8),
            truncate_prob: 0.1,
            duplicate_prob: 0.2,
            reorder_prob: 0.4,
            reorder_depth: 12,
        }
    }

    /// Whether frames can go missing or arrive undecodable
    pub fn is_lossy(&self) -> bool {
        self.loss_rate > 0.0 || self.burst_loss_prob > 0.0 || self.truncate_prob > 0.0
    }
}

#[derive(Clone, Debug)]
struct InFlight {
    frame: Bytes,
    due: u64,
}

/// Link statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChaosStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub truncated: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }
}

/// One-way impaired link towards a single observer
pub struct ChaosLink {
    config: ChaosConfig,
    rng: StdRng,
    in_flight: VecDeque<InFlight>,
    now: u64,
    burst_remaining: u32,
    stats: ChaosStats,
}

impl ChaosLink {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            now: 0,
            burst_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    pub fn send(&mut self, frame: Bytes) {
        self.stats.sent += 1;
        if self.lose() {
            self.stats.lost += 1;
            return;
        }

        let frame = if frame.len() > 1 && self.rng.gen_bool(self.config.truncate_prob) {
            self.stats.truncated += 1;
            let keep = self.rng.gen_range(0..frame.len());
            frame.slice(..keep)
        } else {
            frame
        };

        let copies = if self.rng.gen_bool(self.config.duplicate_prob) {
            self.stats.duplicated += 1;
            2
        } else {
            1
        };
        for _ in 0..copies {
            let due = self.now + u64::from(self.latency());
            self.enqueue(InFlight {
                frame: frame.clone(),
                due,
            });
        }
    }

    fn lose(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }
        if self.rng.gen_bool(self.config.loss_rate) {
            if self.rng.gen_bool(self.config.burst_loss_prob) {
                let (min, max) = self.config.burst_length;
                self.burst_remaining = self.rng.gen_range(min..=max.max(min));
            }
            return true;
        }
        false
    }

    fn latency(&mut self) -> u32 {
        let (min, max) = self.config.latency_ticks;
        self.rng.gen_range(min..=max.max(min))
    }

    /// Keep the queue sorted by due tick, except where a reorder lets a
    /// frame jump ahead
    fn enqueue(&mut self, item: InFlight) {
        let mut pos = self.in_flight.partition_point(|f| f.due <= item.due);
        if pos > 0 && self.config.reorder_depth > 0 && self.rng.gen_bool(self.config.reorder_prob) {
            let jump = self.rng.gen_range(1..=self.config.reorder_depth.min(pos));
            pos -= jump;
            self.stats.reordered += 1;
        }
        self.in_flight.insert(pos, item);
    }

    /// Advance one tick and return the frames that arrive
    pub fn tick(&mut self) -> Vec<Bytes> {
        self.now += 1;
        let mut arrived = Vec::new();
        while self.in_flight.front().map_or(false, |f| f.due <= self.now) {
            if let Some(item) = self.in_flight.pop_front() {
                arrived.push(item.frame);
            }
        }
        self.stats.delivered += arrived.len() as u64;
        arrived
    }

    /// Deliver everything still in flight, in queue order
    pub fn flush(&mut self) -> Vec<Bytes> {
        let arrived: Vec<_> = self.in_flight.drain(..).map(|f| f.frame).collect();
        self.stats.delivered += arrived.len() as u64;
        arrived
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u8) -> Vec<Bytes> {
        (0..n).map(|i| Bytes::from(vec![i, i, i])).collect()
    }

    #[test]
    fn test_perfect_link_preserves_everything() {
        let mut link = ChaosLink::new(ChaosConfig::perfect(), 1);
        for f in frames(20) {
            link.send(f);
        }
        assert_eq!(link.tick(), frames(20));
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_unordered_link_loses_nothing() {
        let mut link = ChaosLink::new(ChaosConfig::unordered(), 7);
        for f in frames(200) {
            link.send(f);
        }
        let mut arrived = Vec::new();
        for _ in 0..10 {
            arrived.extend(link.tick());
        }
        arrived.extend(link.flush());

        let stats = link.stats().clone();
        assert_eq!(stats.lost, 0);
        assert_eq!(arrived.len() as u64, 200 + stats.duplicated);
        assert!(stats.reordered > 0);
        for f in frames(200) {
            assert!(arrived.contains(&f));
        }
        assert_ne!(arrived[..200], frames(200)[..]);
    }

    #[test]
    fn test_hostile_link_loses_and_truncates() {
        let mut link = ChaosLink::new(ChaosConfig::hostile(), 12345);
        for i in 0..1000u32 {
            link.send(Bytes::from(i.to_le_bytes().to_vec()));
        }
        let arrived = link.flush();

        let stats = link.stats();
        assert!(stats.loss_rate() > 0.1);
        assert!(stats.truncated > 0);
        assert!(arrived.iter().any(|f| f.len() < 4));
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let run = |seed| {
            let mut link = ChaosLink::new(ChaosConfig::poor(), seed);
            for f in frames(50) {
                link.send(f);
            }
            link.flush()
        };
        assert_eq!(run(3), run(3));
    }
}
