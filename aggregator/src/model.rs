//! In-memory data model: observations, per-station buckets, producer
//! liveness, and the most-recent-station pointer (spec §3).

use crate::clock::LamportClock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

pub type StationId = String;
pub type ProducerId = String;

/// An opaque key/value observation, immutable once stored (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// The raw JSON body as uploaded by the producer, including `id`.
    #[serde(flatten)]
    pub body: serde_json::Value,
    /// Lamport timestamp attached to the PUT that delivered this observation.
    pub timestamp: u64,
    /// Producer that delivered this observation.
    #[serde(rename = "ServerId")]
    pub producer: ProducerId,
}

/// The ordered collection of every observation ever received for one
/// station, most-recent-first by Lamport timestamp (spec invariant 2).
#[derive(Debug, Default, Clone)]
pub struct StationBucket {
    observations: Vec<Observation>,
}

impl StationBucket {
    /// Inserts `obs` keeping descending-timestamp order; on a timestamp tie
    /// the later insert wins the head (spec invariant 2).
    pub fn insert(&mut self, obs: Observation) {
        let pos = self
            .observations
            .iter()
            .position(|existing| obs.timestamp >= existing.timestamp)
            .unwrap_or(self.observations.len());
        self.observations.insert(pos, obs);
    }

    /// Scans in descending-timestamp order for the first observation visible
    /// at logical time `at_or_before` whose producer is still live (spec
    /// §4.6 step 4).
    pub fn visible(
        &self,
        at_or_before: u64,
        liveness: &ProducerLiveness,
        now: SystemTime,
        expiry_window: Duration,
    ) -> Option<&Observation> {
        self.observations.iter().find(|obs| {
            obs.timestamp <= at_or_before && liveness.is_live(&obs.producer, now, expiry_window)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations in storage order (most-recent-first), for checkpointing.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn from_sorted(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

/// Producer liveness table: the wall-clock instant of each producer's most
/// recent successful PUT (spec §3, §4.6).
///
/// Stored as [`SystemTime`] rather than [`std::time::Instant`] so it maps
/// directly onto the checkpoint's epoch-millisecond `serverTimestampMap`
/// (spec §6) without a parallel Instant<->epoch translation table; the spec's
/// monotonicity requirement is a best-effort property of the OS clock here,
/// never compared against anything producer-supplied (spec §4.5 policy).
#[derive(Debug, Default, Clone)]
pub struct ProducerLiveness {
    last_seen: HashMap<ProducerId, SystemTime>,
}

impl ProducerLiveness {
    pub fn touch(&mut self, producer: ProducerId, now: SystemTime) {
        self.last_seen.insert(producer, now);
    }

    /// A producer is live iff it has ever PUT and did so within the last
    /// `expiry_window` (spec §4.6, "soft expiry").
    pub fn is_live(&self, producer: &str, now: SystemTime, expiry_window: Duration) -> bool {
        match self.last_seen.get(producer) {
            Some(seen) => now
                .duration_since(*seen)
                .map(|elapsed| elapsed <= expiry_window)
                .unwrap_or(true),
            None => false,
        }
    }

    pub fn last_seen(&self, producer: &str) -> Option<SystemTime> {
        self.last_seen.get(producer).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProducerId, &SystemTime)> {
        self.last_seen.iter()
    }

    pub fn from_map(last_seen: HashMap<ProducerId, SystemTime>) -> Self {
        Self { last_seen }
    }
}

/// All process-wide mutable state the worker owns and the checkpointer
/// periodically snapshots (spec §3, §9 "Global state").
pub struct AggregatorState {
    pub clock: LamportClock,
    pub buckets: HashMap<StationId, StationBucket>,
    pub liveness: ProducerLiveness,
    /// Most-recent-station pointer and its Lamport timestamp (spec §3 `M`).
    pub most_recent: Option<(StationId, u64)>,
    pub expiry_window: Duration,
}

impl AggregatorState {
    pub fn new(expiry_window: Duration) -> Self {
        Self {
            clock: LamportClock::new(),
            buckets: HashMap::new(),
            liveness: ProducerLiveness::default(),
            most_recent: None,
            expiry_window,
        }
    }

    /// Applies a PUT to the in-memory model as one atomic step (spec §4.5
    /// step 7, invariant 3 + 4). `now` is the wall-clock instant used only
    /// for liveness bookkeeping.
    pub fn apply_put(
        &mut self,
        station: StationId,
        timestamp: u64,
        producer: ProducerId,
        body: serde_json::Value,
        now: SystemTime,
    ) {
        self.liveness.touch(producer.clone(), now);

        let newer = match &self.most_recent {
            Some((_, t_last)) => timestamp > *t_last,
            None => true,
        };
        if newer {
            self.most_recent = Some((station.clone(), timestamp));
        }

        self.buckets
            .entry(station)
            .or_insert_with(StationBucket::default)
            .insert(Observation {
                body,
                timestamp,
                producer,
            });
    }

    /// Rebuilds state from a restored checkpoint snapshot (spec invariant 5).
    /// Callers pass buckets already in descending-timestamp order, so no
    /// re-sorting is needed here.
    pub fn restore(
        clock_value: u64,
        buckets: HashMap<StationId, StationBucket>,
        liveness: ProducerLiveness,
        most_recent: Option<(StationId, u64)>,
        expiry_window: Duration,
    ) -> Self {
        Self {
            clock: LamportClock::with_value(clock_value),
            buckets,
            liveness,
            most_recent,
            expiry_window,
        }
    }
}
