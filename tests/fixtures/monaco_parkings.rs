//! Public car parks of Monaco, for realistic travel time fixtures.
//!
//! Coordinates are approximate entrance positions taken from OpenStreetMap.

/// A named parking with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub id: &'static str,
    pub lane: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(id: &'static str, lane: &'static str, lat: f64, lng: f64) -> Self {
        Self { id, lane, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

pub const MONACO_PARKINGS: &[Location] = &[
    Location::new("louis_ii", "152763_0", 43.7275, 7.4155),
    Location::new("pecheurs", "-152892#2_0", 43.7312, 7.4262),
    Location::new("gare", "153409_1", 43.7383, 7.4210),
    Location::new("casino", "154186#1_0", 43.7393, 7.4283),
    Location::new("grimaldi_forum", "-154439_0", 43.7440, 7.4315),
    Location::new("larvotto", "154700#3_0", 43.7455, 7.4350),
];
