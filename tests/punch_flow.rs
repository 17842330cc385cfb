//! End-to-end punch flow against mock geocode and backend servers

use fieldpunch::domain::types::Direction;
use fieldpunch::error::{SubmitError, ValidationFailure};
use fieldpunch::infra::{Config, Metrics};
use fieldpunch::io::geo::{GeoProvider, NativeAddress};
use fieldpunch::io::replay::{ReplayFix, ReplayGeoProvider};
use fieldpunch::io::{BackendClient, KeyValueStore, MemoryStore, WatchOptions};
use fieldpunch::services::{
    IdentityStore, LocationResolver, PunchSession, ReverseGeocoder, SignInFlow, ToggleOutcome,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn geocode_server(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/reverse")).respond_with(response).mount(&server).await;
    server
}

async fn resolve_place(provider: ReplayGeoProvider, geocode: &MockServer) -> String {
    let config = Config::default().with_geocode_base_url(&geocode.uri());
    let metrics = Arc::new(Metrics::new());
    let provider: Arc<dyn GeoProvider> = Arc::new(provider);
    let geocoder = Arc::new(ReverseGeocoder::from_config(&config, provider.clone(), metrics.clone()).unwrap());
    let resolver = LocationResolver::new(provider, geocoder, WatchOptions::default(), metrics);

    let mut rx = resolver.subscribe();
    resolver.mount();
    let snapshot = rx.wait_for(|s| s.resolved_name().is_some()).await.unwrap().clone();
    resolver.teardown();
    resolver.wait_stopped().await;

    snapshot.resolved_name().map(str::to_string).unwrap_or_default()
}

fn tirur_fix() -> ReplayFix {
    let mut fix = ReplayFix::new(10.9134, 75.9218);
    fix.address = Some(NativeAddress {
        name: Some("Tirur Bus Stand".into()),
        street: Some("Bazaar Road".into()),
        city: Some("Tirur".into()),
        subregion: None,
    });
    fix
}

#[tokio::test]
async fn test_network_name_wins() {
    let server = geocode_server(ResponseTemplate::new(200).set_body_json(json!({
        "address": { "town": "Tirur", "state_district": "Malappuram" }
    })))
    .await;

    let place = resolve_place(ReplayGeoProvider::new(vec![tirur_fix()]), &server).await;
    assert_eq!(place, "Tirur, Malappuram");
}

#[tokio::test]
async fn test_network_miss_uses_native_geocoder() {
    let server = geocode_server(ResponseTemplate::new(500)).await;
    let place = resolve_place(ReplayGeoProvider::new(vec![tirur_fix()]), &server).await;
    assert_eq!(place, "Tirur Bus Stand, Tirur");
}

#[tokio::test]
async fn test_total_miss_uses_coordinates() {
    let server = geocode_server(ResponseTemplate::new(200).set_body_json(json!({ "error": "Unable to geocode" }))).await;
    let place = resolve_place(ReplayGeoProvider::new(vec![ReplayFix::new(10.9134, 75.9218)]), &server).await;
    assert_eq!(place, "10.91340, 75.92180");
}

#[tokio::test]
async fn test_sign_in_punch_in_and_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "address": { "town": "Tirur", "state_district": "Malappuram" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/employee/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-42", "employee": { "name": "Asha K" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/trader-activity"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let config = Config::default().with_geocode_base_url(&server.uri()).with_backend_url(&server.uri());
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(MemoryStore::new());
    let identity = Arc::new(IdentityStore::open(store.clone()));
    let backend = Arc::new(BackendClient::from_config(&config).unwrap());

    let provider: Arc<dyn GeoProvider> = Arc::new(ReplayGeoProvider::new(vec![tirur_fix()]));
    let geocoder = Arc::new(ReverseGeocoder::from_config(&config, provider.clone(), metrics.clone()).unwrap());
    let resolver = LocationResolver::new(provider, geocoder, WatchOptions::default(), metrics.clone());
    let session = PunchSession::new(
        identity.clone(),
        resolver.subscribe(),
        backend.clone(),
        store.clone(),
        metrics.clone(),
        Some("Cochin Traders".into()),
    );

    // no identity yet: going on duty asks for sign-in
    assert_eq!(session.toggle(), ToggleOutcome::SignInRequired);
    assert_eq!(store.get("force_splash").as_deref(), Some("1"));

    let flow = SignInFlow::new(backend.clone(), identity.clone());
    let signed = flow.sign_in("asha", "98765 43210").await.unwrap();
    assert_eq!(signed.employee_name, "Asha K");
    assert_eq!(signed.token, "tok-42");

    // resolver not mounted yet: permission still undetermined
    session.set_shop("Acme Stores");
    session.set_amount("1250");
    assert_eq!(
        session.submit(),
        Err(SubmitError::Invalid(ValidationFailure::LocationPermissionRequired))
    );

    let mut location = resolver.subscribe();
    resolver.mount();
    location.wait_for(|s| s.resolved_name().is_some()).await.unwrap();

    assert!(matches!(session.toggle(), ToggleOutcome::PunchedIn { .. }));
    let punch_in = session.submit().unwrap();
    assert_eq!(punch_in.place_name, "Tirur, Malappuram");
    assert_eq!(punch_in.employee_name, "Asha K");
    session.wait_idle().await;

    let ToggleOutcome::PunchedOut(punch_out) = session.toggle() else {
        panic!("expected punch out");
    };
    assert_eq!(punch_out.direction, Direction::Out);
    session.wait_idle().await;

    resolver.teardown();
    resolver.wait_stopped().await;

    let bodies: Vec<Value> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/trader-activity")
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["type"], "punch_in");
    assert_eq!(bodies[0]["shopName"], "Acme Stores");
    assert_eq!(bodies[0]["amount"], 1250.0);
    assert_eq!(bodies[0]["place"], "Tirur, Malappuram");
    assert_eq!(bodies[0]["companyName"], "Cochin Traders");
    assert_eq!(bodies[0]["employeeId"], "9876543210");
    assert_eq!(bodies[1]["type"], "punch_out");

    assert_eq!(session.notice(), None);
    assert_eq!(session.last_punch().map(|l| l.shop_name).as_deref(), Some("Acme Stores"));
    assert_eq!(metrics.punches_dispatched(), 2);
}
