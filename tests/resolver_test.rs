use logship::metrics::ShipperMetrics;
use logship::resolver::{EndpointResolver, ServerSpec};
use std::sync::Arc;

#[test]
fn literal_and_srv_specs_are_distinguished() {
    assert!(matches!(
        ServerSpec::parse("logs.example.com:5044"),
        Ok(ServerSpec::Literal { .. })
    ));
    assert!(matches!(
        ServerSpec::parse("_logstash._tcp.example.com"),
        Ok(ServerSpec::Srv { .. })
    ));
}

#[test]
fn invalid_specs_fail_at_parse_time() {
    for bad in ["", "   ", ":9", "host:", "host:0", "host:66000", "host:x"] {
        assert!(ServerSpec::parse(bad).is_err(), "{bad:?} should not parse");
    }
}

#[tokio::test]
async fn literal_refresh_yields_the_configured_endpoint() {
    let metrics = Arc::new(ShipperMetrics::new());
    let resolver = EndpointResolver::new(
        ServerSpec::parse("collector.example:9200").unwrap(),
        metrics.clone(),
    )
    .unwrap();

    resolver.refresh().await.unwrap();

    let endpoints = resolver.endpoints();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].addr(), "collector.example:9200");
    assert_eq!(metrics.snapshot().resolutions_ok, 1);
}

#[tokio::test]
async fn repeated_refresh_replaces_the_snapshot() {
    let metrics = Arc::new(ShipperMetrics::new());
    let resolver = EndpointResolver::new(
        ServerSpec::parse("collector.example:9200").unwrap(),
        metrics,
    )
    .unwrap();

    resolver.refresh().await.unwrap();
    let first = resolver.endpoints();
    resolver.refresh().await.unwrap();
    let second = resolver.endpoints();

    // New Arc each time: readers of the old snapshot are unaffected.
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first[0].addr(), second[0].addr());
}
