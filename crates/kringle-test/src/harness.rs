//! Multi-observer convergence harness
//!
//! Drives a real `GiftExchange` through a scenario while several
//! simulated observers follow the group's stream, each through its own
//! chaos link. Observers apply what arrives with the same `GroupView`
//! the live observer uses, and reload from the service when a frame does
//! not decode, cannot be applied, or after a stretch of silence.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kringle_core::{GroupId, KringleError, KringleResult, Session};
use kringle_runtime::{GiftExchange, ServiceConfig};
use kringle_store::MemoryStore;
use kringle_sync::{
    ApplyOutcome, BroadcastHub, EventStream, GroupView, NotificationSink, ObserverStats,
};
use kringle_wire::{decode_event, frame_group};

use crate::chaos::{ChaosConfig, ChaosLink};

/// Sink that records every published frame and forwards it to a hub
#[derive(Default)]
pub struct RecordingSink {
    hub: BroadcastHub,
    log: Mutex<Vec<Bytes>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    /// Frames published since the last call
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.log.lock())
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, group: GroupId, frame: Bytes) -> usize {
        self.log.lock().push(frame.clone());
        self.hub.publish(group, frame)
    }

    fn subscribe(&self, group: GroupId) -> EventStream {
        self.hub.subscribe(group)
    }
}

/// An observer fed by a chaos link instead of a broadcast channel
pub struct SimulatedObserver {
    view: GroupView,
    link: ChaosLink,
    idle_ticks: u32,
    stats: ObserverStats,
}

impl SimulatedObserver {
    pub fn view(&self) -> &GroupView {
        &self.view
    }

    pub fn stats(&self) -> ObserverStats {
        self.stats
    }

    /// Returns false if the view needs reloading
    fn receive(&mut self, frame: &[u8]) -> bool {
        self.idle_ticks = 0;
        let Ok(envelope) = decode_event(frame) else {
            self.stats.decode_failures += 1;
            return false;
        };
        match self.view.apply(&envelope) {
            Ok(ApplyOutcome::Applied) => {
                self.stats.applied += 1;
                true
            }
            Ok(_) => {
                self.stats.duplicates += 1;
                true
            }
            Err(_) => false,
        }
    }

    fn resync(&mut self, service: &GiftExchange) -> KringleResult<()> {
        let snapshot = service.snapshot(self.view.group_id())?;
        self.view.install_snapshot(snapshot);
        self.stats.resyncs += 1;
        self.idle_ticks = 0;
        Ok(())
    }
}

/// One step of a scenario. Indices pick among current members, modulo
/// the roster size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Join,
    Leave(usize),
    HostRemoves(usize),
    AddIdea(usize),
    Draw,
    /// Let the links run without new traffic
    Wait(u32),
}

/// Harness configuration
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub observers: usize,
    pub chaos: ChaosConfig,
    /// Ticks of silence before an observer reloads
    pub idle_timeout: u32,
    pub host_participates: bool,
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            observers: 3,
            chaos: ChaosConfig::default(),
            idle_timeout: 40,
            host_participates: false,
            seed: 1,
        }
    }
}

impl HarnessConfig {
    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = chaos;
        self
    }

    pub fn with_observers(mut self, observers: usize) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_host_participating(mut self, participates: bool) -> Self {
        self.host_participates = participates;
        self
    }
}

/// Outcome of a scenario
#[derive(Clone, Debug)]
pub struct ConvergenceReport {
    /// Every observer matches the source of truth
    pub converged: bool,
    /// Every observer resolves the same draw view as the service for
    /// every member
    pub views_agree: bool,
    pub observer_stats: Vec<ObserverStats>,
    /// Operations the service rejected, such as a join after the draw
    pub rejected_ops: usize,
}

impl ConvergenceReport {
    pub fn passed(&self) -> bool {
        self.converged && self.views_agree
    }
}

/// Service plus simulated observers of one group
pub struct ConvergenceHarness {
    config: HarnessConfig,
    service: GiftExchange,
    sink: Arc<RecordingSink>,
    host: Session,
    members: Vec<Session>,
    observers: Vec<SimulatedObserver>,
    rng: StdRng,
    next_name: usize,
    rejected_ops: usize,
}

impl ConvergenceHarness {
    pub fn new(config: HarnessConfig) -> KringleResult<Self> {
        let sink = Arc::new(RecordingSink::new());
        let service = GiftExchange::with_parts(
            ServiceConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        )
        .map_err(|e| KringleError::InvalidInput(e.to_string()))?
        .seeded(config.seed);

        let (group, host) = service.create_group("Harness", "Host", config.host_participates)?;
        let snapshot = service.snapshot(group.id)?;
        sink.take();

        let observers = (0..config.observers)
            .map(|i| SimulatedObserver {
                view: GroupView::from_snapshot(snapshot.clone()),
                link: ChaosLink::new(config.chaos.clone(), config.seed.wrapping_add(i as u64 + 1)),
                idle_ticks: 0,
                stats: ObserverStats {
                    resyncs: 1,
                    ..ObserverStats::default()
                },
            })
            .collect();

        Ok(ConvergenceHarness {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            service,
            sink,
            host,
            members: Vec::new(),
            observers,
            next_name: 0,
            rejected_ops: 0,
        })
    }

    pub fn service(&self) -> &GiftExchange {
        &self.service
    }

    pub fn group_id(&self) -> GroupId {
        self.host.group_id
    }

    pub fn observers(&self) -> &[SimulatedObserver] {
        &self.observers
    }

    /// Random scenario: mostly joins, some leaves and ideas, one draw
    /// somewhere in the second half
    pub fn random_scenario(&mut self, len: usize) -> Vec<Op> {
        let draw_at = len / 2 + self.rng.gen_range(0..=len / 2);
        (0..len)
            .map(|i| {
                if i == draw_at {
                    return Op::Draw;
                }
                match self.rng.gen_range(0..10) {
                    0..=4 => Op::Join,
                    5 => Op::Leave(self.rng.gen()),
                    6 => Op::HostRemoves(self.rng.gen()),
                    7 | 8 => Op::AddIdea(self.rng.gen()),
                    _ => Op::Wait(self.rng.gen_range(1..5)),
                }
            })
            .collect()
    }

    /// Run `ops`, let every link drain, then report
    pub fn run(&mut self, ops: &[Op]) -> ConvergenceReport {
        for op in ops {
            self.execute(op);
            self.forward();
            self.tick();
        }
        self.deliver_all();
        self.settle();
        self.report()
    }

    /// Run `ops` and deliver everything in flight without any timeout
    /// reload, so only the apply path is exercised
    pub fn run_without_timeouts(&mut self, ops: &[Op]) -> ConvergenceReport {
        for op in ops {
            self.execute(op);
            self.forward();
            self.deliver_tick();
        }
        self.deliver_all();
        self.report()
    }

    fn execute(&mut self, op: &Op) {
        let result = match op {
            Op::Join => {
                self.next_name += 1;
                let name = format!("Member{}", self.next_name);
                self.service
                    .join(self.group_id(), &name, "member@mail")
                    .map(|p| {
                        self.members.push(Session {
                            group_id: p.group_id,
                            participant_id: Some(p.id),
                            name: p.name,
                            is_host: false,
                        });
                    })
            }
            Op::Leave(i) | Op::HostRemoves(i) if !self.members.is_empty() => {
                let idx = i % self.members.len();
                let member = self.members[idx].clone();
                let actor = if matches!(op, Op::Leave(_)) { &member } else { &self.host };
                let removed = member.participant_id.map_or(Ok(()), |id| self.service.leave(actor, id));
                if removed.is_ok() {
                    self.members.remove(idx);
                }
                removed
            }
            Op::AddIdea(i) if !self.members.is_empty() => {
                let member = &self.members[i % self.members.len()];
                self.service
                    .add_gift_idea(member, &format!("idea {}", self.next_name), None)
                    .map(|_| ())
            }
            Op::Draw => self.service.draw(&self.host).map(|_| ()),
            Op::Wait(ticks) => {
                for _ in 0..*ticks {
                    self.tick();
                }
                Ok(())
            }
            Op::Leave(_) | Op::HostRemoves(_) | Op::AddIdea(_) => Ok(()),
        };
        if result.is_err() {
            self.rejected_ops += 1;
        }
    }

    /// Hand newly published frames to every link
    fn forward(&mut self) {
        let group = self.group_id();
        for frame in self.sink.take() {
            if frame_group(&frame).map_or(true, |g| g != group) {
                continue;
            }
            for observer in &mut self.observers {
                observer.link.send(frame.clone());
            }
        }
    }

    /// One tick with the idle timer running
    fn tick(&mut self) {
        let timeout = self.config.idle_timeout;
        for observer in &mut self.observers {
            let arrived = observer.link.tick();
            let mut needs_resync = false;
            if arrived.is_empty() {
                observer.idle_ticks += 1;
                needs_resync = observer.idle_ticks >= timeout;
            }
            for frame in &arrived {
                needs_resync |= !observer.receive(frame);
            }
            if needs_resync {
                // The source of truth is local; a failed fetch is retried
                // on the next timeout
                let _ = observer.resync(&self.service);
            }
        }
    }

    /// One tick that only applies deliveries
    fn deliver_tick(&mut self) {
        for observer in &mut self.observers {
            for frame in observer.link.tick() {
                observer.receive(&frame);
            }
        }
    }

    fn deliver_all(&mut self) {
        for observer in &mut self.observers {
            for frame in observer.link.flush() {
                observer.receive(&frame);
            }
        }
    }

    /// Let every observer hit its idle timeout once
    fn settle(&mut self) {
        for _ in 0..=self.config.idle_timeout {
            self.tick();
        }
    }

    fn report(&self) -> ConvergenceReport {
        let snapshot = match self.service.snapshot(self.group_id()) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                return ConvergenceReport {
                    converged: false,
                    views_agree: false,
                    observer_stats: Vec::new(),
                    rejected_ops: self.rejected_ops,
                }
            }
        };

        let converged = self.observers.iter().all(|o| o.view.matches(&snapshot));

        let mut viewers: Vec<_> = self.members.iter().map(Session::viewer).collect();
        viewers.push(self.host.viewer());
        let views_agree = self.observers.iter().all(|o| {
            viewers.iter().all(|viewer| {
                self.service
                    .my_view(viewer)
                    .map_or(false, |expected| o.view.visible(viewer) == expected)
            })
        });

        ConvergenceReport {
            converged,
            views_agree,
            observer_stats: self.observers.iter().map(|o| o.stats).collect(),
            rejected_ops: self.rejected_ops,
        }
    }
}
