//! End-to-end tests driving the real `Orchestrator` against a `wiremock`
//! server, exercising the routing -> fetch -> decode -> extract ->
//! serialize pipeline the way the `webdistill` binary does.

use std::fs;
use std::time::Duration;

use webdistill_cli::{Orchestrator, OrchestratorRequest};
use webdistill_config::CoreConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERIC_TEMPLATE: &str = r#"
name: generic
version: "1.0.0"
domains: ["*"]
priority: 0

selectors:
  title:
    - "h1"
    - "title"
  content:
    - "article"
    - "body"

filters:
  remove_selectors: []
  css_classes_to_remove: []
  ids_to_remove: []
  remove_patterns: []

output:
  max_heading_level: 6
  include_toc: false
"#;

fn catch_all_routing() -> String {
    r#"
version: 1
defaults:
  timeout_ms: 5000
  headers: {}
rules:
  - name: catch_all
    priority: 0
    enabled: true
    conditions: {}
    action:
      fetcher: static_http
      max_attempts: 1
"#
    .to_string()
}

fn routing_with_captcha_no_escalation() -> String {
    catch_all_routing()
}

/// Builds an `Orchestrator` from freshly written routing/template fixtures.
/// Returns the routing tempdir alongside it so the caller keeps it alive
/// for as long as the orchestrator (and its file watcher) needs the path.
async fn build_orchestrator(routing_yaml: &str, template_dir: &tempfile::TempDir) -> (Orchestrator, tempfile::TempDir) {
    let routing_dir = tempfile::tempdir().unwrap();
    let routing_path = routing_dir.path().join("routing.yaml");
    fs::write(&routing_path, routing_yaml).unwrap();
    fs::write(template_dir.path().join("generic.yaml"), GENERIC_TEMPLATE).unwrap();

    let mut config = CoreConfig::default();
    config.routing_path = routing_path;
    config.template_root = template_dir.path().to_path_buf();
    config.default_timeout = Duration::from_secs(5);

    let orchestrator = Orchestrator::new(&config).expect("orchestrator should construct from valid config");
    (orchestrator, routing_dir)
}

#[tokio::test]
async fn static_english_article_extracts_with_generic_template() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<h1>Hello</h1><article><p>World.</p></article>"),
        )
        .mount(&server)
        .await;

    let template_dir = tempfile::tempdir().unwrap();
    let (orchestrator, _routing_dir) = build_orchestrator(&catch_all_routing(), &template_dir).await;

    let output = orchestrator
        .process(OrchestratorRequest {
            url: format!("{}/article-1", server.uri()),
            ..Default::default()
        })
        .await;

    assert!(output.error.is_none(), "unexpected error: {:?}", output.error);
    assert_eq!(output.metadata.title, "Hello");
    assert_eq!(output.metadata.fetcher_used, "static_http");
    assert_eq!(output.metadata.template_used, "generic");
    assert!(output.markdown.contains("World."));
}

#[tokio::test]
async fn captcha_body_with_no_escalation_rule_surfaces_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Please verify you are human"))
        .mount(&server)
        .await;

    let template_dir = tempfile::tempdir().unwrap();
    let (orchestrator, _routing_dir) = build_orchestrator(&routing_with_captcha_no_escalation(), &template_dir).await;

    let output = orchestrator
        .process(OrchestratorRequest {
            url: format!("{}/blocked", server.uri()),
            ..Default::default()
        })
        .await;

    assert!(output.markdown.is_empty());
    let error = output.error.expect("expected a captcha error");
    assert_eq!(error.kind, webdistill_types::ErrorKind::CaptchaDetected);
}

#[tokio::test]
async fn force_fetcher_bypasses_routing_resolution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forced"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<h1>Forced</h1><article><p>Body text here.</p></article>"),
        )
        .mount(&server)
        .await;

    let template_dir = tempfile::tempdir().unwrap();
    // Routing would normally send everything through static_http anyway;
    // force_fetcher still has to resolve to a registered fetcher id.
    let (orchestrator, _routing_dir) = build_orchestrator(&catch_all_routing(), &template_dir).await;

    let output = orchestrator
        .process(OrchestratorRequest {
            url: format!("{}/forced", server.uri()),
            force_fetcher: Some("static_http".to_string()),
            ..Default::default()
        })
        .await;

    assert!(output.error.is_none());
    assert_eq!(output.metadata.fetcher_used, "static_http");
}

#[tokio::test]
async fn unresolvable_host_surfaces_network_error_not_a_panic() {
    let template_dir = tempfile::tempdir().unwrap();
    let (orchestrator, _routing_dir) = build_orchestrator(&catch_all_routing(), &template_dir).await;

    let output = orchestrator
        .process(OrchestratorRequest {
            url: "http://this-host-does-not-resolve.invalid/page".to_string(),
            ..Default::default()
        })
        .await;

    assert!(output.markdown.is_empty());
    assert!(output.error.is_some());
}
