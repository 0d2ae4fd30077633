//! Webhook and Discord delivery against a mock server

use std::sync::Arc;
use std::time::Duration;

use site_sentinel::config::Discord;
use site_sentinel::discord::DiscordNotifier;
use site_sentinel::notify::{FanoutNotifier, Notifier};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::webhook;

#[tokio::test]
async fn test_webhook_posts_subject_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "subject": "Website Status Alert - https://a.example",
            "message": "down"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = webhook(format!("{}/hook", server.uri()), 10);

    assert!(
        notifier
            .notify("Website Status Alert - https://a.example", "down")
            .await
    );
}

#[tokio::test]
async fn test_webhook_error_status_is_not_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    assert!(!webhook(server.uri(), 10).notify("subject", "body").await);
}

#[tokio::test]
async fn test_hung_webhook_times_out_as_undelivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(600)))
        .mount(&server)
        .await;

    let notifier = webhook(server.uri(), 1);
    let delivered = tokio::time::timeout(Duration::from_secs(10), notifier.notify("s", "b"))
        .await
        .expect("webhook delivery did not give up on a hung endpoint");

    assert!(!delivered);
}

#[tokio::test]
async fn test_discord_posts_embed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "embeds": [{ "description": "CPU usage: 95.0% (limit: 90.0%)" }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = DiscordNotifier::new(&Discord {
        url: server.uri(),
        user_id: None,
        timeout_secs: 10,
    })
    .unwrap();

    assert!(
        notifier
            .notify("Server CPU Alert - 10.0.0.1", "CPU usage: 95.0% (limit: 90.0%)")
            .await
    );
}

#[tokio::test]
async fn test_hung_discord_times_out_as_undelivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(600)))
        .mount(&server)
        .await;

    let notifier = DiscordNotifier::new(&Discord {
        url: server.uri(),
        user_id: None,
        timeout_secs: 1,
    })
    .unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(10), notifier.notify("s", "b"))
        .await
        .expect("Discord delivery did not give up on a hung endpoint");

    assert!(!delivered);
}

#[tokio::test]
async fn test_fanout_survives_one_broken_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let fanout = FanoutNotifier::new(vec![
        Arc::new(webhook("http://127.0.0.1:9/hook", 10)),
        Arc::new(webhook(server.uri(), 10)),
    ]);

    assert!(fanout.notify("subject", "body").await);
}
