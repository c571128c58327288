use std::net::IpAddr;
use std::str::FromStr;

use tracing::{debug, warn};

use linkpulse_core::enrich::{device_of, DeviceInfo, GeoInfo};

/// Event enrichment: IP to geography via an embedded MaxMind database,
/// User-Agent to device attributes via `woothee` (in `linkpulse-core`).
///
/// Constructed once at startup and passed to components. Enrichment never
/// fails: a missing database, unparseable IP or malformed UA all yield empty
/// fields.
pub struct Enricher {
    geo: Option<maxminddb::Reader<Vec<u8>>>,
}

impl Enricher {
    /// Load the GeoIP database at `path`. An absent or unreadable file is
    /// non-fatal; events are stored with empty geo fields.
    pub fn new(geoip_path: &str) -> Self {
        let geo = match maxminddb::Reader::open_readfile(geoip_path) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(
                    geoip_path,
                    error = %e,
                    "GeoIP database not loaded; events will carry empty geo fields"
                );
                None
            }
        };
        Self { geo }
    }

    /// An enricher with no GeoIP database. Used by tests.
    pub fn disabled() -> Self {
        Self { geo: None }
    }

    pub fn geo_of(&self, ip: Option<&str>) -> GeoInfo {
        let (Some(reader), Some(ip)) = (self.geo.as_ref(), ip) else {
            return GeoInfo::default();
        };
        let Ok(ip_addr) = IpAddr::from_str(ip) else {
            debug!(ip, "Unparseable visitor IP; skipping geo lookup");
            return GeoInfo::default();
        };

        let record: maxminddb::geoip2::City = match reader.lookup(ip_addr) {
            Ok(record) => record,
            Err(e) => {
                debug!(ip, error = %e, "GeoIP lookup miss");
                return GeoInfo::default();
            }
        };

        let country = record
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(|s| s.to_string());
        let region = record
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|sub| sub.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let city = record
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());

        GeoInfo {
            country,
            region,
            city,
        }
    }

    pub fn enrich(&self, ip: Option<&str>, user_agent: Option<&str>) -> (GeoInfo, DeviceInfo) {
        (self.geo_of(ip), device_of(user_agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_yields_empty_geo() {
        let enricher = Enricher::disabled();
        assert_eq!(enricher.geo_of(Some("8.8.8.8")), GeoInfo::default());
        assert_eq!(enricher.geo_of(None), GeoInfo::default());
    }

    #[test]
    fn malformed_ip_never_panics() {
        let enricher = Enricher::disabled();
        assert_eq!(enricher.geo_of(Some("not-an-ip")), GeoInfo::default());
    }
}
