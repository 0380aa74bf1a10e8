//! Pricing lookups and catalog refresh through the bus facade.

use glimpse_types::{BusRequest, BusStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{MODEL, config_for, file_gateway, gateway_with_credential, mount_catalog};

fn price_request(model_id: &str) -> BusRequest {
    BusRequest::GetModelPricing {
        model_id: model_id.to_string(),
    }
}

#[tokio::test]
async fn lookup_refreshes_once_then_serves_from_cache() {
    let server = MockServer::start().await;
    mount_catalog(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));

    let first = gateway.dispatch(price_request(MODEL)).await;
    assert_eq!(first.status, BusStatus::Success);
    assert_eq!(first.price_per_unit, Some(0.000_000_15));
    assert_eq!(first.completion_price_per_unit, Some(0.000_000_6));
    assert_eq!(first.stale, None);

    let other = gateway
        .dispatch(price_request("anthropic/claude-3.5-haiku"))
        .await;
    let price = other.price_per_unit.unwrap();
    assert!((price - 0.000_000_8).abs() < 1e-15, "{price}");
}

#[tokio::test]
async fn update_reports_count_of_priced_models() {
    let server = MockServer::start().await;
    mount_catalog(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));

    let response = gateway
        .dispatch(BusRequest::UpdateKnownModelsAndPricing)
        .await;
    assert_eq!(response.status, BusStatus::Success);
    assert_eq!(response.updated_count, Some(2));
}

#[tokio::test]
async fn variable_priced_model_is_unknown() {
    let server = MockServer::start().await;
    mount_catalog(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));

    let response = gateway.dispatch(price_request("openrouter/auto")).await;
    assert_eq!(response.status, BusStatus::Error);
    assert!(response.price_per_unit.is_none());
}

#[tokio::test]
async fn failed_update_retries_three_times_then_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let gateway = gateway_with_credential(&config_for(&server, dir.path()));

    let response = gateway
        .dispatch(BusRequest::UpdateKnownModelsAndPricing)
        .await;
    assert_eq!(response.status, BusStatus::Error);
    let message = response.message.unwrap();
    assert!(message.contains("3 attempts"), "{message}");
}

#[tokio::test]
async fn cached_prices_survive_restart() {
    let server = MockServer::start().await;
    mount_catalog(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());

    {
        let gateway = file_gateway(&config);
        gateway
            .secrets()
            .store_credential("sk-or-v1-restart-credential")
            .unwrap();
        let response = gateway
            .dispatch(BusRequest::UpdateKnownModelsAndPricing)
            .await;
        assert_eq!(response.status, BusStatus::Success);
    }

    // Reopened from disk: served without a second catalog fetch.
    let reopened = file_gateway(&config);
    let response = reopened.dispatch(price_request(MODEL)).await;
    assert_eq!(response.status, BusStatus::Success);
    assert_eq!(response.price_per_unit, Some(0.000_000_15));
}
