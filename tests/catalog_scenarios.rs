/// Station catalog scenarios through the public client API.
///
/// These tests verify:
/// 1. Region filtering keeps exactly the covered stations
/// 2. Cached lists expire on the injected clock's TTL
/// 3. A failed reload falls back to the stale list
/// 4. Unknown providers are rejected up front
///
/// Run with: cargo test --test catalog_scenarios

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{ScriptedAdapter, client, client_with_clock, settings, station};
use hydrofetch::catalog::StationFilter;
use hydrofetch::clock::ManualClock;
use hydrofetch::geo::Polygon;
use hydrofetch::{CatalogError, ClientSettings, ProviderId, Region, StationStatus};
use std::sync::Arc;

fn ttl_settings(hours: i64) -> ClientSettings {
    ClientSettings {
        catalog_ttl: Duration::hours(hours),
        ..settings(2, 3)
    }
}

#[test]
fn test_polygon_covering_one_of_two_stations_returns_it() {
    let adapter = Arc::new(ScriptedAdapter::new("USGS", 120).with_stations(vec![
        station("USGS", "05567500", -89.60, 40.69),
        station("USGS", "05586100", -90.63, 39.70),
    ]));
    let client = client(vec![adapter], settings(2, 3));

    let peoria = Polygon::new(vec![(-90.0, 40.4), (-89.3, 40.4), (-89.3, 41.0), (-90.0, 41.0)]).unwrap();
    let stations = client
        .get_stations(&[ProviderId::new("USGS")], Some(&Region::polygon(peoria)), None)
        .unwrap();

    let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["05567500"]);
}

#[test]
fn test_stations_merge_across_providers_in_key_order() {
    let usgs = Arc::new(ScriptedAdapter::new("USGS", 120).with_stations(vec![station("USGS", "2", 0.0, 0.0)]));
    let coops = Arc::new(ScriptedAdapter::new("COOPS", 30).with_stations(vec![
        station("COOPS", "9", 0.0, 0.0),
        station("COOPS", "1", 0.0, 0.0),
    ]));
    let client = client(vec![usgs, coops], settings(2, 3));

    let stations = client
        .get_stations(&[ProviderId::new("USGS"), ProviderId::new("COOPS")], None, None)
        .unwrap();
    let keys: Vec<String> = stations.iter().map(|s| s.key().to_string()).collect();
    assert_eq!(keys, vec!["COOPS:1", "COOPS:9", "USGS:2"]);
}

#[test]
fn test_attribute_filters_apply_after_region() {
    let adapter = Arc::new(ScriptedAdapter::new("IOC", 30).with_stations(vec![
        station("IOC", "dakr", -17.4, 14.7),
        station("IOC", "abas", -17.1, 14.9).with_status(StationStatus::Discontinued),
        station("IOC", "bres", -4.5, 48.4),
    ]));
    let client = client(vec![adapter], settings(2, 3));

    let region = Region::bbox(-20.0, 10.0, -10.0, 20.0).unwrap();
    let filter = StationFilter::new().with_statuses(&[StationStatus::Active]);
    let stations = client
        .get_stations(&[ProviderId::new("IOC")], Some(&region), Some(&filter))
        .unwrap();
    let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["dakr"]);
}

#[test]
fn test_cache_expires_on_manual_clock() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_stations(vec![station("COOPS", "1", 0.0, 0.0)]));
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let client = client_with_clock(vec![adapter.clone()], ttl_settings(6), clock.clone());
    let providers = [ProviderId::new("COOPS")];

    client.get_stations(&providers, None, None).unwrap();
    clock.advance(Duration::hours(5));
    client.get_stations(&providers, None, None).unwrap();
    assert_eq!(adapter.list_calls(), 1, "still fresh");

    adapter.set_stations(vec![station("COOPS", "1", 0.0, 0.0), station("COOPS", "2", 0.0, 0.0)]);
    clock.advance(Duration::hours(2));
    let stations = client.get_stations(&providers, None, None).unwrap();
    assert_eq!(adapter.list_calls(), 2, "reloaded after TTL");
    assert_eq!(stations.len(), 2);
    assert_eq!(client.catalog().cached_age(&providers[0]), Some(Duration::zero()));
}

#[test]
fn test_failed_reload_serves_stale_list() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_stations(vec![station("COOPS", "1", 0.0, 0.0)]));
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let client = client_with_clock(vec![adapter.clone()], ttl_settings(1), clock.clone());
    let providers = [ProviderId::new("COOPS")];

    client.get_stations(&providers, None, None).unwrap();
    adapter.set_list_failing(true);
    clock.advance(Duration::hours(3));

    let stations = client.get_stations(&providers, None, None).unwrap();
    assert_eq!(stations.len(), 1, "stale list instead of an error");
    assert_eq!(adapter.list_calls(), 2);

    assert!(matches!(
        client.catalog().refresh(&providers[0]),
        Err(CatalogError::Refresh { .. })
    ));
}

#[test]
fn test_unknown_provider_is_rejected_before_listing() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30));
    let client = client(vec![adapter.clone()], settings(2, 3));

    let result = client.get_stations(&[ProviderId::new("COOPS"), ProviderId::new("NDBC")], None, None);
    assert_eq!(result, Err(CatalogError::UnknownProvider(ProviderId::new("NDBC"))));
    assert_eq!(adapter.list_calls(), 0);
}
