/// End-to-end fetch scenarios against scripted in-memory providers.
///
/// These tests verify:
/// 1. Requests longer than a provider's span are split and stitched back
/// 2. A failing station lands in the failure report without touching others
/// 3. Cancellation keeps finished work and reports the rest as cancelled
/// 4. Results do not depend on completion order or repetition
/// 5. Malformed requests fail before any provider call
/// 6. Workers sharing a provider respect its request spacing together
///
/// Run with: cargo test --test fetch_pipeline

mod common;

use common::{ScriptedAdapter, client, day, hourly, settings};
use hydrofetch::provider::{FetchRequest, Page};
use hydrofetch::{
    CancelToken, ErrorKind, FetchError, FetchOverrides, Observation, Product, QueryRequest, RequestError, StationKey,
    TimeInterval,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn keys(ids: &[&str]) -> Vec<StationKey> {
    ids.iter().map(|id| StationKey::new("COOPS", *id)).collect()
}

fn request(ids: &[&str], days: i64) -> QueryRequest {
    QueryRequest::new(keys(ids), Product::WaterLevel, day(0), day(days)).unwrap()
}

// ---------------------------------------------------------------------------
// Planning + merge
// ---------------------------------------------------------------------------

#[test]
fn test_75_days_over_30_day_span_is_three_calls_and_one_series() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30));
    let client = client(vec![adapter.clone()], settings(4, 3));

    let outcome = client.fetch(&request(&["8518750"], 75), FetchOverrides::new()).unwrap();

    let mut spans: Vec<TimeInterval> = adapter.calls().iter().map(|c| c.interval).collect();
    spans.sort();
    let lengths: Vec<i64> = spans.iter().map(|s| s.duration().num_days()).collect();
    assert_eq!(lengths, vec![30, 30, 15], "three provider calls of 30, 30 and 15 days");

    let series = outcome.table.series(&StationKey::new("COOPS", "8518750"), Product::WaterLevel);
    assert_eq!(series.len(), 75 * 24, "every hour exactly once");
    assert!(series.windows(2).all(|w| w[0].timestamp < w[1].timestamp), "strictly increasing");
    assert_eq!(series.first().unwrap().timestamp, day(0));
    assert!(outcome.failures.is_empty());
}

#[test]
fn test_overlapping_chunk_boundaries_are_deduplicated() {
    // provider returns the inclusive end bound too
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 10).with_script(|request| {
        let mut readings = hourly(request.interval, 2.0);
        readings.push(Observation::new(request.interval.end(), 2.0));
        Ok(Page::complete(readings))
    }));
    let client = client(vec![adapter.clone()], settings(4, 3));

    let outcome = client.fetch(&request(&["1"], 30), FetchOverrides::new()).unwrap();
    let series = outcome.table.series(&StationKey::new("COOPS", "1"), Product::WaterLevel);
    assert_eq!(adapter.call_count(), 3);
    assert_eq!(series.len(), 30 * 24 + 1, "shared boundaries collapse to one reading");
    assert!(series.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn test_paged_sub_query_collects_every_page() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_script(|request| {
        let start = request.interval.start();
        match request.cursor {
            None => Ok(Page::with_cursor(vec![Observation::new(start, 1.0)], "page-2")),
            Some("page-2") => Ok(Page::with_cursor(
                vec![Observation::new(start + chrono::Duration::hours(1), 2.0)],
                "page-3",
            )),
            Some(_) => Ok(Page::complete(vec![Observation::new(start + chrono::Duration::hours(2), 3.0)])),
        }
    }));
    let client = client(vec![adapter.clone()], settings(2, 3));

    let outcome = client.fetch(&request(&["1"], 5), FetchOverrides::new()).unwrap();
    let values: Vec<f64> = outcome
        .table
        .series(&StationKey::new("COOPS", "1"), Product::WaterLevel)
        .iter()
        .map(|o| o.value)
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
    let cursors: Vec<Option<String>> = adapter.calls().into_iter().map(|c| c.cursor).collect();
    assert_eq!(cursors, vec![None, Some("page-2".to_string()), Some("page-3".to_string())]);
}

// ---------------------------------------------------------------------------
// Partial failure
// ---------------------------------------------------------------------------

#[test]
fn test_one_failing_station_of_five_only_appears_in_failures() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_script(|request| {
        if request.station_id == "s3" {
            return Err(FetchError::Transient("HTTP 503".into()));
        }
        Ok(Page::complete(hourly(request.interval, 1.0)))
    }));
    let client = client(vec![adapter.clone()], settings(4, 3));

    let outcome = client
        .fetch(&request(&["s1", "s2", "s3", "s4", "s5"], 10), FetchOverrides::new())
        .unwrap();

    assert_eq!(outcome.table.series_keys().count(), 4, "the other four complete");
    for id in ["s1", "s2", "s4", "s5"] {
        let series = outcome.table.series(&StationKey::new("COOPS", id), Product::WaterLevel);
        assert_eq!(series.len(), 10 * 24, "station {} is complete", id);
    }

    assert_eq!(outcome.failures.len(), 1);
    let failure = outcome.failures.iter().next().unwrap();
    assert_eq!(failure.station, StationKey::new("COOPS", "s3"));
    assert_eq!(failure.error.kind, ErrorKind::Transient);
    assert!(failure.error.retryable);
    assert_eq!(failure.error.attempts, 3);
    assert_eq!(adapter.calls_for("s3"), 3, "retried up to max_attempts");
}

#[test]
fn test_retries_never_exceed_max_attempts() {
    let adapter = Arc::new(
        ScriptedAdapter::new("COOPS", 30).with_script(|_| Err(FetchError::Transient("connection reset".into()))),
    );
    let client = client(vec![adapter.clone()], settings(1, 5));

    let outcome = client
        .fetch(&request(&["1"], 5), FetchOverrides::new().max_attempts(4))
        .unwrap();
    assert_eq!(adapter.call_count(), 4, "override wins over client default");
    assert_eq!(outcome.failures.iter().next().unwrap().error.attempts, 4);
}

#[test]
fn test_non_retryable_errors_fail_on_first_attempt() {
    let adapter = Arc::new(
        ScriptedAdapter::new("COOPS", 30).with_script(|request| Err(FetchError::StationNotFound(request.station_id.into()))),
    );
    let client = client(vec![adapter.clone()], settings(1, 5));

    let outcome = client.fetch(&request(&["missing"], 5), FetchOverrides::new()).unwrap();
    assert_eq!(adapter.call_count(), 1);
    let failure = outcome.failures.iter().next().unwrap();
    assert_eq!(failure.error.kind, ErrorKind::StationNotFound);
    assert!(!failure.error.retryable);
}

#[test]
fn test_rate_limited_call_is_retried_and_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_script(move |request| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(FetchError::RateLimited {
                retry_after: Some(Duration::from_millis(20)),
                message: "HTTP 429".into(),
            });
        }
        Ok(Page::complete(hourly(request.interval, 1.0)))
    }));
    let client = client(vec![adapter.clone()], settings(1, 3));

    let outcome = client.fetch(&request(&["1"], 2), FetchOverrides::new()).unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.table.len(), 48);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn test_cancel_after_two_of_ten_keeps_those_two() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_script(move |request| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n >= 2 {
            // third call hangs until the caller gives up
            while !request.cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(FetchError::Cancelled);
        }
        Ok(Page::complete(hourly(request.interval, 1.0)))
    }));
    let client = client(vec![adapter.clone()], settings(1, 3));

    let ids: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let request = request(&id_refs, 3);
    let cancel = CancelToken::new();

    let outcome = std::thread::scope(|scope| {
        let handle = scope.spawn(|| client.fetch_with_cancel(&request, FetchOverrides::new(), &cancel));
        while started.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }
        cancel.cancel();
        handle.join().unwrap()
    })
    .unwrap();

    let completed: Vec<String> = outcome.table.series_keys().map(|(key, _)| key.id.clone()).collect();
    assert_eq!(completed, vec!["s0", "s1"], "exactly the two finished sub-queries");
    assert_eq!(outcome.table.len(), 2 * 3 * 24);

    assert_eq!(outcome.failures.len(), 8);
    assert!(outcome.failures.iter().all(|f| f.error.kind == ErrorKind::Cancelled));
    assert_eq!(adapter.call_count(), 3, "nothing dispatched after cancellation");
}

#[test]
fn test_timeout_reports_timeout_not_cancelled() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_script(|request| {
        while !request.cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(FetchError::Timeout)
    }));
    let client = client(vec![adapter], settings(2, 3));

    let outcome = client
        .fetch(&request(&["1", "2"], 3), FetchOverrides::new().timeout(Duration::from_millis(100)))
        .unwrap();
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.failures.iter().all(|f| f.error.kind == ErrorKind::Timeout));
}

#[test]
fn test_unrepresentable_timeout_runs_without_deadline() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30));
    let client = client(vec![adapter.clone()], settings(2, 3));

    let outcome = client
        .fetch(&request(&["1"], 3), FetchOverrides::new().timeout(Duration::from_secs(u64::MAX)))
        .unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.table.len(), 72);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[test]
fn test_concurrent_workers_share_the_provider_spacing() {
    let spacing = Duration::from_millis(50);
    let tolerance = Duration::from_millis(15);
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30).with_spacing(spacing));
    let client = client(vec![adapter.clone()], settings(4, 3));

    let outcome = client
        .fetch(&request(&["1", "2", "3", "4", "5", "6"], 2), FetchOverrides::new())
        .unwrap();
    assert!(outcome.failures.is_empty());

    let mut times: Vec<_> = adapter.calls().into_iter().map(|c| c.at).collect();
    times.sort();
    assert_eq!(times.len(), 6);
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap + tolerance >= spacing, "calls {:?} apart, expected at least {:?}", gap, spacing);
    }
    assert!(times[5].duration_since(times[0]) + tolerance >= spacing * 5);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn test_same_request_twice_gives_identical_tables() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 7));
    let client = client(vec![adapter], settings(4, 3));
    let request = request(&["a", "b", "c"], 20);

    let first = client.fetch(&request, FetchOverrides::new()).unwrap();
    let second = client.fetch(&request, FetchOverrides::new()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_completion_order_does_not_change_the_table() {
    // later chunks answer first, and each chunk repeats its neighbour's edge
    let script = |request: &FetchRequest<'_>| -> Result<Page, FetchError> {
        let offset = (request.interval.start() - day(0)).num_days() as u64;
        std::thread::sleep(Duration::from_millis(40u64.saturating_sub(offset)));
        let mut readings = hourly(request.interval, offset as f64);
        readings.push(Observation::new(request.interval.end(), offset as f64));
        readings.reverse();
        Ok(Page::complete(readings))
    };
    let parallel = client(vec![Arc::new(ScriptedAdapter::new("COOPS", 5).with_script(script))], settings(8, 3));
    let serial = client(vec![Arc::new(ScriptedAdapter::new("COOPS", 5).with_script(script))], settings(1, 3));
    let request = request(&["x", "y"], 30);

    let a = parallel.fetch(&request, FetchOverrides::new()).unwrap();
    let b = serial.fetch(&request, FetchOverrides::new()).unwrap();
    assert_eq!(a.table, b.table);
    assert_eq!(a.failures, b.failures);
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

#[test]
fn test_malformed_requests_fail_before_any_call() {
    assert_eq!(
        QueryRequest::new(Vec::new(), Product::WaterLevel, day(0), day(1)),
        Err(RequestError::EmptyStations)
    );
    assert!(matches!(
        QueryRequest::new(keys(&["1"]), Product::WaterLevel, day(1), day(1)),
        Err(RequestError::InvalidInterval { .. })
    ));

    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30));
    let client = client(vec![adapter.clone()], settings(4, 3));

    let unknown = QueryRequest::new([StationKey::new("NDBC", "44013")], Product::WaterLevel, day(0), day(1)).unwrap();
    assert!(matches!(
        client.fetch(&unknown, FetchOverrides::new()),
        Err(RequestError::UnknownProvider(_))
    ));
    assert!(matches!(
        client.fetch(&request(&["1"], 1), FetchOverrides::new().concurrency_limit(0)),
        Err(RequestError::InvalidSetting(_))
    ));
    assert_eq!(adapter.call_count(), 0);
}

#[test]
fn test_unsupported_product_is_reported_not_fetched() {
    let adapter = Arc::new(ScriptedAdapter::new("COOPS", 30));
    let client = client(vec![adapter.clone()], settings(4, 3));
    let request = QueryRequest::new(keys(&["1"]), Product::Discharge, day(0), day(40)).unwrap();

    let outcome = client.fetch(&request, FetchOverrides::new()).unwrap();
    assert!(outcome.table.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    let failure = outcome.failures.iter().next().unwrap();
    assert_eq!(failure.error.kind, ErrorKind::ProductUnsupported);
    assert_eq!(failure.interval, request.interval());
    assert_eq!(adapter.call_count(), 0);
}
