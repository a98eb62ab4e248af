//! Precomputed travel times between parkings, for "closest alternatives"
//! queries.
//!
//! Building costs one travel-time query per ordered pair of parkings and is
//! meant to run once per simulation, never inside the per-tick loop.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::NotFoundError;
use crate::registry::ParkingRegistry;
use crate::traits::{AccessPoint, TravelTimeProvider};

#[derive(Debug, Clone, Default)]
pub struct TravelTimeIndex {
    ids: Vec<String>,
    points: Vec<AccessPoint>,
    position: HashMap<String, usize>,
    /// Reachable destinations per origin. Unreachable pairs are absent.
    edges: Vec<BTreeMap<usize, f64>>,
    /// Destinations per origin, ascending by travel time then parking id.
    ranked: Vec<Vec<(f64, usize)>>,
    stale: BTreeSet<(usize, usize)>,
    vclass: String,
}

impl TravelTimeIndex {
    /// Computes travel times between the access points of every pair of
    /// parkings in `registry`.
    pub fn build<P: TravelTimeProvider + ?Sized>(registry: &ParkingRegistry, provider: &P, vclass: &str) -> Self {
        let started = Instant::now();
        let ids: Vec<String> = registry.iter().map(|p| p.id().to_string()).collect();
        let points: Vec<AccessPoint> = registry
            .iter()
            .map(|p| AccessPoint {
                edge: p.access_edge().to_string(),
                location: p.location(),
            })
            .collect();
        let n = ids.len();

        let matrix = provider.matrix_for(&points, vclass);
        let mut edges = vec![BTreeMap::new(); n];
        let mut unreachable = 0usize;
        for (i, row) in edges.iter_mut().enumerate() {
            for j in (0..n).filter(|&j| j != i) {
                let time = matrix.get(i).and_then(|r| r.get(j)).copied().flatten();
                match time.filter(|t| valid_time(*t)) {
                    Some(time) => {
                        row.insert(j, time);
                    }
                    None => unreachable += 1,
                }
            }
        }

        let mut index = TravelTimeIndex {
            position: ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect(),
            ids,
            points,
            edges,
            ranked: vec![Vec::new(); n],
            stale: BTreeSet::new(),
            vclass: vclass.to_string(),
        };
        for origin in 0..n {
            index.rerank(origin);
        }

        if unreachable > 0 {
            warn!(unreachable, "parking pairs without a route");
        }
        info!(
            parkings = n,
            reachable_pairs = n * n.saturating_sub(1) - unreachable,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "travel time index built"
        );
        index
    }

    fn rerank(&mut self, origin: usize) {
        let ids = &self.ids;
        let mut ranked: Vec<(f64, usize)> = self.edges[origin]
            .iter()
            .map(|(&destination, &time)| (time, destination))
            .collect();
        ranked.sort_by(|a, b| match a.0.total_cmp(&b.0) {
            Ordering::Equal => ids[a.1].cmp(&ids[b.1]),
            other => other,
        });
        self.ranked[origin] = ranked;
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position.contains_key(id)
    }

    pub fn travel_time(&self, origin: &str, destination: &str) -> Option<f64> {
        let from = *self.position.get(origin)?;
        let to = *self.position.get(destination)?;
        self.edges[from].get(&to).copied()
    }

    /// Up to `k` parkings reachable from `origin`, closest first. The origin
    /// itself is never included; an unknown or isolated origin yields nothing.
    pub fn closest(&self, origin: &str, k: usize) -> Vec<(f64, &str)> {
        let Some(&from) = self.position.get(origin) else {
            return Vec::new();
        };
        self.ranked[from]
            .iter()
            .take(k)
            .map(|&(time, to)| (time, self.ids[to].as_str()))
            .collect()
    }

    /// Marks a pair for recomputation by [`TravelTimeIndex::refresh_invalidated`].
    /// The previous value keeps being served until then.
    pub fn invalidate(&mut self, origin: &str, destination: &str) -> Result<(), NotFoundError> {
        let from = self.index_of(origin)?;
        let to = self.index_of(destination)?;
        if from != to {
            self.stale.insert((from, to));
        }
        Ok(())
    }

    pub fn invalidated(&self) -> usize {
        self.stale.len()
    }

    /// Recomputes the invalidated pairs and returns how many were refreshed.
    pub fn refresh_invalidated<P: TravelTimeProvider + ?Sized>(&mut self, provider: &P) -> usize {
        let stale: Vec<(usize, usize)> = std::mem::take(&mut self.stale).into_iter().collect();
        let points = &self.points;
        let vclass = self.vclass.as_str();
        let times: Vec<Option<f64>> = stale
            .par_iter()
            .map(|&(from, to)| provider.travel_time(&points[from], &points[to], vclass))
            .collect();

        let mut origins = BTreeSet::new();
        for (&(from, to), time) in stale.iter().zip(times) {
            match time.filter(|t| valid_time(*t)) {
                Some(time) => self.edges[from].insert(to, time),
                None => self.edges[from].remove(&to),
            };
            origins.insert(from);
        }
        for origin in origins {
            self.rerank(origin);
        }
        debug!(refreshed = stale.len(), "travel time pairs refreshed");
        stale.len()
    }

    fn index_of(&self, id: &str) -> Result<usize, NotFoundError> {
        self.position
            .get(id)
            .copied()
            .ok_or_else(|| NotFoundError::Parking(id.to_string()))
    }
}

fn valid_time(time: f64) -> bool {
    time.is_finite() && time >= 0.0
}
