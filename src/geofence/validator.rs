use std::time::Duration;

use log::{debug, warn};

use super::{distance_m, Coordinate, GeofenceResult, LocationProvider, WorkSite};
use crate::error::LocationError;

/// Decides whether the requester is physically present at a work site.
///
/// Stateless between checks: every attendance action re-verifies, so a stale
/// verification can never authorize a later action. Retrying is simply
/// calling [`check_presence`](Self::check_presence) again.
pub struct GeofenceValidator<L> {
    provider: L,
    timeout: Duration,
}

impl<L: LocationProvider> GeofenceValidator<L> {
    pub fn new(provider: L, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Acquire a coordinate and compare it against the site fence.
    ///
    /// Acquisition is bounded by the configured timeout; an elapsed timer
    /// maps to [`LocationError::Timeout`] rather than hanging the session.
    /// The boundary is inclusive: distance exactly equal to the radius
    /// verifies.
    pub async fn check_presence(&self, site: &WorkSite) -> GeofenceResult {
        let position = match tokio::time::timeout(self.timeout, self.provider.current_position())
            .await
        {
            Ok(Ok(position)) => position,
            Ok(Err(err)) => {
                warn!("position acquisition failed for site {}: {err}", site.id);
                return GeofenceResult::Unavailable(err);
            }
            Err(_) => {
                warn!(
                    "position acquisition timed out after {:?} for site {}",
                    self.timeout, site.id
                );
                return GeofenceResult::Unavailable(LocationError::Timeout);
            }
        };

        self.compare(site, &position)
    }

    fn compare(&self, site: &WorkSite, position: &Coordinate) -> GeofenceResult {
        let distance = distance_m(position, &site.center);
        debug!(
            "site {}: measured {distance:.1} m against radius {:.1} m",
            site.id, site.radius_m
        );
        if distance <= site.radius_m {
            GeofenceResult::Verified {
                distance_m: distance,
            }
        } else {
            GeofenceResult::OutOfRange {
                distance_m: distance,
                radius_m: site.radius_m,
            }
        }
    }
}
