//! The Orchestrator (spec §4.8): wires the Routing Engine, fetcher
//! plugins, Template Store, Extraction Executor, and Markdown Serializer
//! into one per-request pipeline.
//!
//! Every call to [`Orchestrator::process`] returns an [`OrchestratorOutput`]
//! rather than a `Result` — failure is a first-class part of the output
//! contract (spec §6 "Orchestrator output"), never a process-level error.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use webdistill_config::CoreConfig;
use webdistill_fetch::{decode, Fetcher, StaticHttpFetcher};
use webdistill_headless::{BrowserAttachFetcher, BrowserPoolConfig, HeadlessBrowserFetcher};
use webdistill_html::{match_template, TemplateStore};
use webdistill_routing::{RoutingEngine, RoutingStore};
use webdistill_types::{ErrorKind, FetchContext, FetchPlan};

/// Minimum remaining budget below which escalation is refused (spec §4.8:
/// "If the remaining budget drops below 3 s, escalation is suppressed.").
const MIN_ESCALATION_BUDGET: Duration = Duration::from_secs(3);

/// Minimum non-whitespace content length before the quality policy kicks
/// in (spec §4.6 "Quality policy").
const MIN_CONTENT_CHARS: usize = 200;

/// Input to [`Orchestrator::process`] (spec §6 "Orchestrator input").
#[derive(Debug, Clone, Default)]
pub struct OrchestratorRequest {
    pub url: String,
    pub user_timeout_ms: Option<u64>,
    pub extra_headers: HashMap<String, String>,
    pub force_fetcher: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OutputMetadata {
    pub title: String,
    pub url: String,
    pub final_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub fetcher_used: String,
    pub template_used: String,
    pub content_char_count: usize,
    pub elapsed_ms_by_phase: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OutputError {
    pub kind: ErrorKind,
    pub detail: String,
}

/// Orchestrator output (spec §6 "Orchestrator output"). On failure,
/// `markdown` is empty and `error` is populated; `metadata` is still
/// emitted (possibly partially filled) for observability.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorOutput {
    pub markdown: String,
    pub metadata: OutputMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutputError>,
}

impl OutputMetadata {
    fn failure_shell(url: &str) -> Self {
        Self {
            title: String::new(),
            url: url.to_string(),
            final_url: url.to_string(),
            author: None,
            publish_time: None,
            source: None,
            language: None,
            fetcher_used: String::new(),
            template_used: String::new(),
            content_char_count: 0,
            elapsed_ms_by_phase: BTreeMap::new(),
        }
    }
}

/// Owns the long-lived, hot-reloadable state (routing snapshot, template
/// index) and the fetcher plugin registry. Cheap to share across
/// concurrent requests behind an `Arc`; nothing here is request-scoped.
pub struct Orchestrator {
    routing: Arc<RoutingStore>,
    templates: Arc<TemplateStore>,
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
    default_timeout: Duration,
}

impl Orchestrator {
    /// Build the Orchestrator from a resolved [`CoreConfig`]: loads and
    /// starts watching the routing and template stores, and constructs one
    /// instance of every fetcher plugin the config makes available.
    pub fn new(config: &CoreConfig) -> Result<Self, String> {
        let routing = RoutingStore::load_with_watch(&config.routing_path)?;
        let templates = TemplateStore::load_with_watch(&config.template_root)?;

        let mut fetchers: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
        let static_http = StaticHttpFetcher::with_max_body_bytes(
            config.user_agent.clone(),
            config.accept_language.clone(),
            config.max_body_bytes,
        )?;
        fetchers.insert(static_http.id().to_string(), Arc::new(static_http));

        let headless = HeadlessBrowserFetcher::with_max_body_bytes(BrowserPoolConfig::default(), config.max_body_bytes);
        fetchers.insert(headless.id().to_string(), Arc::new(headless));

        if let Some(endpoint) = &config.browser_attach_endpoint {
            let attach = BrowserAttachFetcher::with_max_body_bytes(endpoint.clone(), config.max_body_bytes);
            fetchers.insert(attach.id().to_string(), Arc::new(attach));
        }

        Ok(Self {
            routing,
            templates,
            fetchers,
            default_timeout: config.default_timeout,
        })
    }

    /// Run the full pipeline for one URL (spec §4.8 steps 1-6), then emit
    /// the outcome record (step 6: "Emit outcome record") as a structured
    /// log event.
    pub async fn process(&self, request: OrchestratorRequest) -> OrchestratorOutput {
        let output = self.process_inner(request).await;
        self.log_outcome(&output);
        output
    }

    async fn process_inner(&self, request: OrchestratorRequest) -> OrchestratorOutput {
        let total_budget = request
            .user_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let deadline = Instant::now() + total_budget;

        let mut ctx = FetchContext::new(request.url.clone());
        ctx.user_headers = request.extra_headers.clone();
        ctx.user_timeout_ms = request.user_timeout_ms;

        let mut elapsed_ms_by_phase: BTreeMap<String, u64> = BTreeMap::new();
        let mut response_content_type: Option<String> = None;
        let engine = RoutingEngine::new(self.routing.current());

        let fetch_outcome = loop {
            let route_started = Instant::now();
            let plan = self.plan_for(&request, &engine, &ctx, response_content_type.as_deref());
            *elapsed_ms_by_phase.entry("route".to_string()).or_default() += route_started.elapsed().as_millis() as u64;

            let Some(fetcher) = self.fetchers.get(&plan.fetcher_id) else {
                break Err(OutputError {
                    kind: ErrorKind::FetcherInternal,
                    detail: format!("no fetcher registered for id {:?}", plan.fetcher_id),
                });
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(OutputError {
                    kind: ErrorKind::BudgetExceeded,
                    detail: "request timeout budget exhausted before fetch attempt".to_string(),
                });
            }
            let bounded_timeout = remaining.min(Duration::from_millis(plan.timeout_ms));

            let fetch_started = Instant::now();
            let fetch_result = tokio::time::timeout(bounded_timeout, fetcher.fetch(&ctx, &plan)).await;
            *elapsed_ms_by_phase.entry("fetch".to_string()).or_default() += fetch_started.elapsed().as_millis() as u64;

            let (kind, detail, content_type) = match fetch_result {
                Err(_) => (ErrorKind::NetworkTimeout, "fetch attempt exceeded the request deadline".to_string(), None),
                Ok(result) if result.is_success() => break Ok(result),
                Ok(result) => {
                    let content_type = result.response_headers.get("content-type").cloned();
                    match result.error {
                        Some((kind, detail)) => (kind, detail, content_type),
                        None => (ErrorKind::FetcherInternal, "fetcher reported failure with no error detail".to_string(), content_type),
                    }
                }
            };
            response_content_type = content_type;

            let remaining_after = deadline.saturating_duration_since(Instant::now());
            let escalation = engine.escalation_target(&ctx, &plan, kind);
            let can_retry = escalation.is_some()
                && ctx.attempt_index < plan.max_attempts
                && remaining_after >= MIN_ESCALATION_BUDGET;

            if can_retry {
                ctx = ctx.escalate(kind);
                continue;
            }

            break Err(OutputError { kind, detail });
        };

        let fetch_result = match fetch_outcome {
            Ok(result) => result,
            Err(error) => {
                let mut metadata = OutputMetadata::failure_shell(&request.url);
                metadata.elapsed_ms_by_phase = elapsed_ms_by_phase;
                return OrchestratorOutput {
                    markdown: String::new(),
                    metadata,
                    error: Some(error),
                };
            }
        };

        let decode_started = Instant::now();
        let decoded = decode(&fetch_result.content_bytes, &fetch_result.response_headers);
        elapsed_ms_by_phase.insert("decode".to_string(), decode_started.elapsed().as_millis() as u64);
        let decoded = match decoded {
            Ok(d) => d,
            Err(e) => {
                let mut metadata = OutputMetadata::failure_shell(&request.url);
                metadata.final_url = fetch_result.final_url.clone();
                metadata.fetcher_used = fetch_result.fetcher_used.clone();
                metadata.elapsed_ms_by_phase = elapsed_ms_by_phase;
                return OrchestratorOutput {
                    markdown: String::new(),
                    metadata,
                    error: Some(OutputError {
                        kind: ErrorKind::DecodeFailure,
                        detail: e.to_string(),
                    }),
                };
            }
        };

        let template_started = Instant::now();
        let snapshot = self.templates.current();
        let Some(template) = match_template(&snapshot.templates, &ctx.effective_host) else {
            let mut metadata = OutputMetadata::failure_shell(&request.url);
            metadata.final_url = fetch_result.final_url.clone();
            metadata.fetcher_used = fetch_result.fetcher_used.clone();
            metadata.elapsed_ms_by_phase = elapsed_ms_by_phase;
            return OrchestratorOutput {
                markdown: String::new(),
                metadata,
                error: Some(OutputError {
                    kind: ErrorKind::FetcherInternal,
                    detail: "no templates loaded, not even the generic fallback".to_string(),
                }),
            };
        };
        elapsed_ms_by_phase.insert("template_match".to_string(), template_started.elapsed().as_millis() as u64);

        let extract_started = Instant::now();
        let mut outcome = webdistill_html::extract(&decoded.text, &fetch_result.final_url, template);
        let mut template_used = template.name.clone();
        if outcome.document.content_char_count() < MIN_CONTENT_CHARS && !template.is_generic() {
            if let Some(generic) = snapshot.templates.iter().find(|t| t.is_generic()) {
                outcome = webdistill_html::extract(&decoded.text, &fetch_result.final_url, generic);
                template_used = generic.name.clone();
            }
        }
        elapsed_ms_by_phase.insert("extract".to_string(), extract_started.elapsed().as_millis() as u64);

        if outcome.document.content_char_count() < MIN_CONTENT_CHARS {
            let mut metadata = OutputMetadata::failure_shell(&request.url);
            metadata.final_url = fetch_result.final_url.clone();
            metadata.fetcher_used = fetch_result.fetcher_used.clone();
            metadata.template_used = template_used;
            metadata.content_char_count = outcome.document.content_char_count();
            metadata.elapsed_ms_by_phase = elapsed_ms_by_phase;
            return OrchestratorOutput {
                markdown: String::new(),
                metadata,
                error: Some(OutputError {
                    kind: ErrorKind::ExtractionInsufficient,
                    detail: format!(
                        "content below {MIN_CONTENT_CHARS} characters after generic-template retry"
                    ),
                }),
            };
        }

        let serialize_started = Instant::now();
        let markdown = webdistill_markdown::serialize(&outcome.document);
        elapsed_ms_by_phase.insert("serialize".to_string(), serialize_started.elapsed().as_millis() as u64);

        let document = outcome.document;
        let metadata = OutputMetadata {
            title: document.title,
            url: request.url,
            final_url: fetch_result.final_url,
            author: document.author,
            publish_time: document.publish_time,
            source: document.source_name,
            language: document.language,
            fetcher_used: fetch_result.fetcher_used,
            template_used,
            content_char_count: document.content_char_count(),
            elapsed_ms_by_phase,
        };

        OrchestratorOutput {
            markdown,
            metadata,
            error: None,
        }
    }

    fn log_outcome(&self, output: &OrchestratorOutput) {
        let record = webdistill_types::OutcomeRecord {
            url: output.metadata.url.clone(),
            final_url: output.metadata.final_url.clone(),
            fetcher_used: output.metadata.fetcher_used.clone(),
            template_used: output.metadata.template_used.clone(),
            elapsed_ms_by_phase: output.metadata.elapsed_ms_by_phase.clone(),
            error_kind: output.error.as_ref().map(|e| e.kind),
            content_char_count: output.metadata.content_char_count,
        };

        match &output.error {
            Some(error) => tracing::warn!(
                url = %record.url,
                final_url = %record.final_url,
                fetcher_used = %record.fetcher_used,
                template_used = %record.template_used,
                total_elapsed_ms = record.total_elapsed_ms(),
                error_kind = %error.kind,
                detail = %error.detail,
                "request failed"
            ),
            None => tracing::info!(
                url = %record.url,
                final_url = %record.final_url,
                fetcher_used = %record.fetcher_used,
                template_used = %record.template_used,
                total_elapsed_ms = record.total_elapsed_ms(),
                content_char_count = record.content_char_count,
                "request completed"
            ),
        }
    }

    fn plan_for(
        &self,
        request: &OrchestratorRequest,
        engine: &RoutingEngine,
        ctx: &FetchContext,
        response_content_type: Option<&str>,
    ) -> FetchPlan {
        match &request.force_fetcher {
            Some(forced) => FetchPlan {
                fetcher_id: forced.clone(),
                ..engine.resolve(ctx, response_content_type)
            },
            None => engine.resolve(ctx, response_content_type),
        }
    }
}
