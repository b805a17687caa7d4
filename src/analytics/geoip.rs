//! GeoIP lookup service using MaxMind GeoLite2/GeoIP2 MMDB
//!
//! This module provides thread-safe IP geolocation using a memory-mapped
//! MaxMind City database. A missing database or an address without a record
//! yields `None`; lookups never fail the caller.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;

/// GeoIP lookup service backed by an optional City database
#[derive(Clone, Default)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Create a new GeoIP service from an MMDB file path
    ///
    /// # Arguments
    /// * `city_path` - Optional path to the MaxMind GeoLite2-City or GeoIP2-City .mmdb file
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = if let Some(path) = city_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self { city_reader })
    }

    /// Whether a database is loaded
    pub fn is_enabled(&self) -> bool {
        self.city_reader.is_some()
    }

    /// Lookup geographic location for an IP address
    pub fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        let reader = self.city_reader.as_ref()?;
        let result = reader.lookup(ip).ok()?;

        let mut geo_location = GeoLocation::default();

        // The City database is a superset of Country data, so fall back to the
        // country decoder when a record carries no city block.
        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            Self::extract_from_city(&city, &mut geo_location);
        } else if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
            geo_location.country = country.country.iso_code.map(|s| s.to_string());
        }

        if geo_location.is_empty() {
            None
        } else {
            Some(geo_location)
        }
    }

    fn extract_from_city(city: &geoip2::City, geo_location: &mut GeoLocation) {
        geo_location.country = city.country.iso_code.map(|s| s.to_string());

        if let Some(subdivision) = city.subdivisions.first() {
            geo_location.region = subdivision
                .iso_code
                .or(subdivision.names.english)
                .map(|s| s.to_string());
        }

        geo_location.city = city.city.names.english.map(|s| s.to_string());

        if let (Some(lat), Some(lon)) = (city.location.latitude, city.location.longitude) {
            geo_location.coordinates = Some([lat, lon]);
        }
    }
}
