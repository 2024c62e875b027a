//! Client-side distance check for reservation check-in.

use thiserror::Error;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error, PartialEq)]
#[error("{distance:.1}m away from the practice room (limit {limit:.1}m)")]
pub struct TooFar {
    pub distance: f64,
    pub limit: f64,
}

/// Great-circle distance between two points (haversine).
pub fn distance_meters(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Area a user must be inside to check in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckInSite {
    pub center: Coordinates,
    pub radius_meters: f64,
}

impl CheckInSite {
    /// Returns the distance to the site if `position` is within the radius.
    pub fn check(&self, position: Coordinates) -> Result<f64, TooFar> {
        let distance = distance_meters(position, self.center);
        if distance > self.radius_meters {
            return Err(TooFar {
                distance,
                limit: self.radius_meters,
            });
        }
        Ok(distance)
    }
}
