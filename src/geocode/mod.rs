//! Turning coordinates into human-readable addresses.
//!
//! The tracking engine never geocodes on its own. Observers resolve addresses on demand, for
//! example when a recorded point is selected, through a [`GeocodeGateway`].

pub mod error;
pub mod single_flight;

use std::future::Future;

use bon::Builder;
use tracing::debug;

use crate::point::Coordinate;

use self::error::GeocodeError;

pub use self::single_flight::SingleFlightGeocoder;

/// Returned when a placemark has none of the components used to build an address.
pub const UNKNOWN_ADDRESS: &str = "Unknown address";

/// Failure detail when the backend finds nothing at a coordinate.
pub const NO_ADDRESS_FOUND: &str = "No address found";

/// Resolves a coordinate to a single display address.
pub trait GeocodeGateway: Send + Sync {
    fn resolve_address(
        &self,
        coordinate: Coordinate,
    ) -> impl Future<Output = Result<String, GeocodeError>> + Send;
}

/// A structured reverse-geocoding result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct Placemark {
    /// Point of interest or building name.
    #[builder(into)]
    pub name: Option<String>,
    /// Street name.
    #[builder(into)]
    pub thoroughfare: Option<String>,
    /// House number.
    #[builder(into)]
    pub sub_thoroughfare: Option<String>,
    /// City.
    #[builder(into)]
    pub locality: Option<String>,
    /// State or province.
    #[builder(into)]
    pub administrative_area: Option<String>,
    #[builder(into)]
    pub country: Option<String>,
}

/// Join the components of `placemark` into a display address.
///
/// Components are taken in the order name, thoroughfare, sub-thoroughfare, locality,
/// administrative area, country and joined with `", "`. The sub-thoroughfare is only added
/// after a component that does not already contain it.
pub fn format_address(placemark: &Placemark) -> String {
    let mut components: Vec<&str> = Vec::new();

    components.extend(placemark.name.as_deref());
    components.extend(placemark.thoroughfare.as_deref());

    if let Some(number) = placemark.sub_thoroughfare.as_deref() {
        if components.last().is_some_and(|last| !last.contains(number)) {
            components.push(number);
        }
    }

    components.extend(placemark.locality.as_deref());
    components.extend(placemark.administrative_area.as_deref());
    components.extend(placemark.country.as_deref());

    if components.is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        components.join(", ")
    }
}

/// A reverse-geocoding backend returning structured placemarks, best match first.
pub trait ReverseGeocoder: Send + Sync {
    /// Errors are returned as a human-readable reason.
    fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> impl Future<Output = Result<Vec<Placemark>, String>> + Send;
}

/// A [`GeocodeGateway`] formatting the best placemark of a [`ReverseGeocoder`].
#[derive(Debug, Clone)]
pub struct PlacemarkGateway<R> {
    backend: R,
}

impl<R: ReverseGeocoder> PlacemarkGateway<R> {
    pub fn new(backend: R) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &R {
        &self.backend
    }
}

impl<R: ReverseGeocoder> GeocodeGateway for PlacemarkGateway<R> {
    async fn resolve_address(&self, coordinate: Coordinate) -> Result<String, GeocodeError> {
        let placemarks = self
            .backend
            .reverse_geocode(coordinate)
            .await
            .map_err(GeocodeError::Failed)?;

        let placemark = placemarks
            .first()
            .ok_or_else(|| GeocodeError::Failed(NO_ADDRESS_FOUND.to_string()))?;

        let address = format_address(placemark);
        debug!(coordinate = %coordinate, address = %address, "Resolved address");
        Ok(address)
    }
}
