use dashmap::{DashMap, Entry};
use tracing::debug;

use super::GeocodeGateway;
use super::error::GeocodeError;
use crate::point::Coordinate;

type CoordinateKey = (u64, u64);

fn key(coordinate: &Coordinate) -> CoordinateKey {
    (
        coordinate.latitude().to_bits(),
        coordinate.longitude().to_bits(),
    )
}

/// A [`GeocodeGateway`] allowing at most one outstanding lookup per coordinate.
///
/// A lookup for a coordinate that is already being resolved fails immediately with
/// [`GeocodeError::InFlight`] instead of reaching the backend again. Lookups for different
/// coordinates run concurrently.
#[derive(Debug)]
pub struct SingleFlightGeocoder<G> {
    inner: G,
    in_flight: DashMap<CoordinateKey, (), ahash::RandomState>,
}

impl<G: GeocodeGateway> SingleFlightGeocoder<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            in_flight: DashMap::default(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, coordinate: &Coordinate) -> bool {
        self.in_flight.contains_key(&key(coordinate))
    }

    fn claim(&self, coordinate: &Coordinate) -> Option<InFlightGuard<'_>> {
        let key = key(coordinate);
        match self.in_flight.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    map: &self.in_flight,
                    key,
                })
            }
        }
    }
}

impl<G: GeocodeGateway> GeocodeGateway for SingleFlightGeocoder<G> {
    async fn resolve_address(&self, coordinate: Coordinate) -> Result<String, GeocodeError> {
        let Some(_guard) = self.claim(&coordinate) else {
            debug!(coordinate = %coordinate, "Lookup already in flight");
            return Err(GeocodeError::InFlight);
        };

        self.inner.resolve_address(coordinate).await
    }
}

/// Releases a claimed coordinate when the lookup completes or is dropped.
struct InFlightGuard<'a> {
    map: &'a DashMap<CoordinateKey, (), ahash::RandomState>,
    key: CoordinateKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
