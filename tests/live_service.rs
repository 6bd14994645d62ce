//! Integration tests against a real orchestration service
//!
//! These need a reachable service endpoint and are tagged `#[ignore]`.
//! Run them explicitly with:
//!
//!     FLOWLINE_ENDPOINT=http://host:port cargo test --test live_service -- --ignored

mod helpers;

use flowline::{ClientConfig, FlowClient, FlowService, Run, SavedTemplate};
use helpers::{wordcount_arguments, wordcount_pipeline};
use std::sync::Arc;
use std::time::Duration;

fn client_from_env() -> FlowClient {
    let endpoint =
        std::env::var("FLOWLINE_ENDPOINT").expect("FLOWLINE_ENDPOINT must point at a service");
    let mut config = ClientConfig::new(endpoint);
    if let (Ok(id), Ok(secret)) = (
        std::env::var("FLOWLINE_ACCESS_KEY_ID"),
        std::env::var("FLOWLINE_ACCESS_KEY_SECRET"),
    ) {
        config = config.with_credentials(id, secret);
    }
    FlowClient::new(config).expect("client builds")
}

#[tokio::test]
#[ignore] // Requires a running service
async fn test_register_fetch_and_delete() {
    let client = client_from_env();

    let mut template = SavedTemplate::new(wordcount_pipeline().to_manifest().unwrap()).unwrap();
    let id = template.register(&client).await.unwrap();

    let fetched = SavedTemplate::get(&client, &id).await.unwrap();
    assert_eq!(fetched.identifier(), "wordcount");

    client.delete_pipeline(&id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running service
async fn test_submit_inline_run_and_poll() {
    let client = Arc::new(client_from_env());
    let interval = Duration::from_secs(client.config().poll_interval_secs);

    let run = Run::submit(
        client.clone(),
        &wordcount_pipeline(),
        "flowline-live-test",
        wordcount_arguments(),
    )
    .await
    .unwrap();

    let detail = run.wait_for_completion(interval).await.unwrap();
    assert!(detail.status.is_terminal());
}
