//! Seam to the external routing collaborator.
//!
//! The monitor never computes routes itself. Hosts plug in whatever router
//! the simulation uses by implementing [`TravelTimeProvider`].

use rayon::prelude::*;

/// Where vehicles enter a parking: the access edge and, when known, its
/// geographic location (lat, lng).
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPoint {
    pub edge: String,
    pub location: Option<(f64, f64)>,
}

/// Provides point-to-point travel times in seconds.
///
/// Implementations must be `Sync` because the default matrix computation fans
/// the pairwise queries out over a thread pool.
pub trait TravelTimeProvider: Sync {
    /// Travel time from `from` to `to` for a vehicle of `vclass`, or `None`
    /// when there is no route.
    fn travel_time(&self, from: &AccessPoint, to: &AccessPoint, vclass: &str) -> Option<f64>;

    /// Travel times between every ordered pair of `points`, indexed by the
    /// provided order. Batch backends should override this.
    fn matrix_for(&self, points: &[AccessPoint], vclass: &str) -> Vec<Vec<Option<f64>>> {
        points
            .par_iter()
            .enumerate()
            .map(|(i, from)| {
                points
                    .iter()
                    .enumerate()
                    .map(|(j, to)| {
                        if i == j {
                            Some(0.0)
                        } else {
                            self.travel_time(from, to, vclass)
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
