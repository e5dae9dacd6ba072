//! Region resolution and banner targeting. Pure functions, no state.

use crate::config::GeoConfig;
use crate::record::Region;

/// EU and EEA member states plus the UK and Switzerland, which run
/// equivalent regimes.
const EU_COUNTRIES: &[&str] = &[
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
    "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE", "IS", "LI", "NO",
    "GB", "CH",
];

/// Maps an ISO 3166 country code (and optional subdivision code) to a
/// privacy region. `CA` is California.
pub fn region_for_location(country: &str, subdivision: Option<&str>) -> Option<Region> {
    let country = country.trim().to_ascii_uppercase();
    if EU_COUNTRIES.contains(&country.as_str()) {
        return Some(Region::Eu);
    }
    if country == "US" {
        let subdivision = subdivision?.trim().to_ascii_uppercase();
        let code = subdivision.strip_prefix("US-").unwrap_or(&subdivision);
        if code == "CA" {
            return Some(Region::Ca);
        }
    }
    None
}

/// Whether the banner should be shown to a visitor from `region`.
pub fn should_show_banner(geo: &GeoConfig, region: Option<Region>) -> bool {
    if !geo.enabled {
        return true;
    }
    match region {
        Some(region) => geo.regions.contains(&region),
        None => geo.show_when_unknown,
    }
}
