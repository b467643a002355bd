//! End-to-end routing tests
//!
//! Drive the [`Router`] with scripted adapters and check the event protocol:
//! ordering, fallback, terminal events, cancellation and shared stats.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use switchboard_core::routing::fallback::{FATAL_ALL_FAILED, FATAL_NO_PROVIDERS};
use switchboard_core::{
    AttemptStatus, BackendError, ChunkStream, CompletionRequest, ProviderAdapter,
    ProviderRegistry, ProviderStats, QueryType, RouteError, Router, RoutingRule, RoutingRuleSet,
    RuleCondition, StreamEvent, UsageTracker,
};

// ============================================================================
// Scripted adapter
// ============================================================================

#[derive(Clone)]
enum Script {
    /// Stream these chunks, then finish
    Chunks(Vec<&'static str>),
    /// Fail before producing anything
    Refuse(&'static str),
    /// Stream these chunks, then fail
    BreakAfter(Vec<&'static str>, &'static str),
    /// Stream one chunk, then never finish
    Hang,
}

struct ScriptedAdapter {
    id: &'static str,
    model: Mutex<String>,
    script: Script,
    usage: Arc<UsageTracker>,
    queries: AtomicUsize,
    max_tokens: AtomicU32,
    released: Arc<AtomicBool>,
}

impl ScriptedAdapter {
    fn new(id: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id,
            model: Mutex::new(format!("{id}-default")),
            script,
            usage: Arc::new(UsageTracker::new()),
            queries: AtomicUsize::new(0),
            max_tokens: AtomicU32::new(0),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn last_max_tokens(&self) -> u32 {
        self.max_tokens.load(Ordering::SeqCst)
    }
}

struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn ok_chunks(chunks: Vec<&'static str>) -> impl futures::Stream<Item = Result<String, BackendError>> {
    futures::stream::iter(chunks.into_iter().map(|c| Ok(c.to_string())))
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> &str {
        self.id
    }

    fn current_model(&self) -> String {
        self.model.lock().clone()
    }

    fn set_model(&self, model: &str) {
        *self.model.lock() = model.to_string();
    }

    async fn query(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.max_tokens.store(request.max_tokens, Ordering::SeqCst);
        let usage = Arc::clone(&self.usage);

        match self.script.clone() {
            Script::Chunks(chunks) => {
                let tokens = chunks.len() as u64;
                let finish = futures::stream::once(async move {
                    usage.record_success(tokens, 0.001);
                })
                .filter_map(|()| async { None::<Result<String, BackendError>> });
                Ok(ok_chunks(chunks).chain(finish).boxed())
            }
            Script::Refuse(message) => {
                usage.record_failure();
                Err(BackendError::Http(message.to_string()))
            }
            Script::BreakAfter(chunks, message) => {
                let failure = futures::stream::once(async move {
                    usage.record_failure();
                    Err(BackendError::Stream(message.to_string()))
                });
                Ok(ok_chunks(chunks).chain(failure).boxed())
            }
            Script::Hang => {
                let guard = ReleaseGuard(Arc::clone(&self.released));
                Ok(ok_chunks(vec!["first"])
                    .chain(futures::stream::pending())
                    .map(move |item| {
                        let _held = &guard;
                        item
                    })
                    .boxed())
            }
        }
    }

    fn snapshot_stats(&self) -> ProviderStats {
        self.usage.snapshot(self.id, &self.current_model())
    }

    async fn health_check(&self) -> bool {
        !matches!(self.script, Script::Refuse(_))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn registry(adapters: &[&Arc<ScriptedAdapter>], unavailable: &[&str]) -> ProviderRegistry {
    let mut builder = ProviderRegistry::builder();
    for id in ["openai", "anthropic", "google"] {
        if let Some(adapter) = adapters.iter().find(|a| a.id == id) {
            builder = builder.with_adapter(Arc::clone(*adapter) as Arc<dyn ProviderAdapter>);
        } else if unavailable.contains(&id) {
            builder = builder.with_unavailable(id, format!("{id}-default"), "API key not configured");
        }
    }
    builder.build()
}

async fn collect(router: &Router, query: &str, preference: Option<&str>) -> Vec<StreamEvent> {
    router.query(query, preference).unwrap().collect().await
}

fn attempts(events: &[StreamEvent]) -> Vec<(String, AttemptStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ProviderAttempt {
                provider, status, ..
            } => Some((provider.clone(), *status)),
            _ => None,
        })
        .collect()
}

fn content(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn assert_protocol(events: &[StreamEvent]) {
    assert!(matches!(events.first(), Some(StreamEvent::Routing(_))));

    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "exactly one terminal event");
    assert!(events.last().is_some_and(StreamEvent::is_terminal));

    let mut failed: Vec<&str> = Vec::new();
    let mut current: Option<&str> = None;
    for event in events {
        match event {
            StreamEvent::ProviderAttempt { provider, .. } => current = Some(provider.as_str()),
            StreamEvent::ProviderError { provider, .. } => failed.push(provider.as_str()),
            StreamEvent::Content { .. } => {
                let provider = current.expect("content before any attempt");
                assert!(!failed.contains(&provider), "content after error for {provider}");
            }
            _ => {}
        }
    }
}

fn code_rule_set() -> RoutingRuleSet {
    RoutingRuleSet {
        rules: vec![RoutingRule::new("code", 1, "anthropic", "claude-3-opus-20240229")
            .with_condition(RuleCondition {
                query_type: Some(QueryType::Code),
                ..Default::default()
            })
            .with_description("Code queries go to Claude")],
        ..Default::default()
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_preference_keeps_openai_first() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["Hello", " there"]));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["Hi"]));
    let google = ScriptedAdapter::new("google", Script::Chunks(vec!["Hey"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic, &google], &[]),
    );

    let events = collect(&router, "hello", Some("anthropic")).await;
    assert_protocol(&events);

    let StreamEvent::Routing(decision) = &events[0] else {
        panic!("first event must be routing");
    };
    assert_eq!(decision.reason, "user preference");
    assert_eq!(decision.selected_provider.as_deref(), Some("anthropic"));
    assert_eq!(decision.fallback_order, vec!["openai", "anthropic", "google"]);

    // openai answers first even though anthropic was selected
    assert_eq!(
        attempts(&events),
        vec![
            ("openai".to_string(), AttemptStatus::Attempting),
            ("openai".to_string(), AttemptStatus::Success),
        ]
    );
    assert_eq!(content(&events), "Hello there");
    assert_eq!(anthropic.queries(), 0);
}

#[tokio::test]
async fn test_preference_without_openai() {
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["Hi"]));
    let google = ScriptedAdapter::new("google", Script::Chunks(vec!["Hey"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&anthropic, &google], &["openai"]),
    );

    let decision = router.decide("hello", Some("anthropic")).unwrap();
    assert_eq!(decision.fallback_order, vec!["anthropic", "google"]);
}

#[tokio::test]
async fn test_first_available_when_default_missing() {
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["Hi"]));
    let google = ScriptedAdapter::new("google", Script::Chunks(vec!["Hey"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&anthropic, &google], &["openai"]),
    );

    let events = collect(&router, "what time is it", None).await;
    assert_protocol(&events);

    let StreamEvent::Routing(decision) = &events[0] else {
        panic!("first event must be routing");
    };
    assert_eq!(decision.selected_provider.as_deref(), Some("anthropic"));
    assert_eq!(decision.reason, "first available provider");

    let Some(StreamEvent::Complete {
        provider, model, ..
    }) = events.last()
    else {
        panic!("expected completion");
    };
    assert_eq!(provider, "anthropic");
    assert_eq!(model, "anthropic-default");
}

#[tokio::test]
async fn test_failure_on_first_chunk_falls_back() {
    let openai = ScriptedAdapter::new("openai", Script::BreakAfter(vec![], "connection reset"));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["fine"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic], &["google"]),
    );

    let events = collect(&router, "hello", None).await;
    assert_protocol(&events);

    assert!(matches!(
        &events[1],
        StreamEvent::ProviderAttempt { provider, status: AttemptStatus::Attempting, .. }
            if provider == "openai"
    ));
    assert_eq!(
        events[2],
        StreamEvent::ProviderError {
            provider: "openai".to_string(),
            error: "stream interrupted: connection reset".to_string(),
            will_fallback: true,
        }
    );
    assert!(matches!(
        &events[3],
        StreamEvent::ProviderAttempt { provider, status: AttemptStatus::Attempting, .. }
            if provider == "anthropic"
    ));
    assert_eq!(
        attempts(&events)
            .iter()
            .filter(|(p, _)| p == "openai")
            .count(),
        1
    );
    assert_eq!(content(&events), "fine");
}

#[tokio::test]
async fn test_rule_model_applied_to_selected_provider() {
    let openai = ScriptedAdapter::new("openai", Script::Refuse("401 unauthorized"));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["fn main() {}"]));
    let router = Router::new(code_rule_set(), registry(&[&openai, &anthropic], &["google"]));

    let events = collect(&router, "implement this function", None).await;
    assert_protocol(&events);

    let Some(StreamEvent::Complete {
        provider,
        model,
        stats,
        ..
    }) = events.last()
    else {
        panic!("expected completion");
    };
    assert_eq!(provider, "anthropic");
    assert_eq!(model, "claude-3-opus-20240229");
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.model, "claude-3-opus-20240229");
}

#[tokio::test]
async fn test_complete_reports_the_attempt_model() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["one", " two"]));
    let router = Router::new(RoutingRuleSet::default(), registry(&[&openai], &[]));

    let mut events = router.query("hello", None).unwrap();
    while let Some(event) = events.next().await {
        if matches!(event, StreamEvent::Content { .. }) {
            break;
        }
    }
    // a concurrent request switches the shared adapter mid-stream
    openai.set_model("gpt-4o");
    let rest: Vec<_> = events.collect().await;

    let Some(StreamEvent::Complete { model, stats, .. }) = rest.last() else {
        panic!("expected completion, got {:?}", rest.last());
    };
    assert_eq!(model, "gpt-3.5-turbo");
    assert_eq!(stats.model, "gpt-3.5-turbo");
    assert_eq!(stats.request_count, 1);
    assert_eq!(openai.current_model(), "gpt-4o");
}

#[tokio::test]
async fn test_max_tokens_reaches_provider() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["ok"]));
    let router = Router::new(RoutingRuleSet::default(), registry(&[&openai], &[]));
    collect(&router, "hello", None).await;
    assert_eq!(openai.last_max_tokens(), 4096);

    let router = router.with_max_tokens(256);
    collect(&router, "hello", None).await;
    assert_eq!(openai.last_max_tokens(), 256);
}

#[tokio::test]
async fn test_all_providers_fail() {
    let openai = ScriptedAdapter::new("openai", Script::Refuse("timeout"));
    let anthropic = ScriptedAdapter::new("anthropic", Script::BreakAfter(vec!["par"], "overloaded"));
    let google = ScriptedAdapter::new("google", Script::Refuse("quota"));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic, &google], &[]),
    );

    let events = collect(&router, "hello", None).await;
    assert_protocol(&events);

    let errors = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::ProviderError { .. }))
        .count();
    assert_eq!(errors, 3);
    // partial content from the failed provider is not retracted
    assert_eq!(content(&events), "par");
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Fatal {
            error: FATAL_ALL_FAILED.to_string(),
            attempted_providers: vec![
                "openai".to_string(),
                "anthropic".to_string(),
                "google".to_string()
            ],
        })
    );
}

#[tokio::test]
async fn test_mid_stream_failure_then_success() {
    let openai = ScriptedAdapter::new("openai", Script::BreakAfter(vec!["Hel", "lo"], "reset"));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["Hello", "!"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic], &[]),
    );

    let events = collect(&router, "hello", None).await;
    assert_protocol(&events);
    assert_eq!(
        attempts(&events),
        vec![
            ("openai".to_string(), AttemptStatus::Attempting),
            ("openai".to_string(), AttemptStatus::Success),
            ("anthropic".to_string(), AttemptStatus::Attempting),
            ("anthropic".to_string(), AttemptStatus::Success),
        ]
    );
    assert_eq!(content(&events), "HelloHello!");
}

#[tokio::test]
async fn test_zero_chunk_success_stops_fallback() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec![]));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["unused"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic], &[]),
    );

    let events = collect(&router, "hello", None).await;
    assert_protocol(&events);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[2], StreamEvent::Complete { .. }));
    assert_eq!(anthropic.queries(), 0);
}

#[tokio::test]
async fn test_no_providers_available() {
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[], &["openai", "anthropic", "google"]),
    );

    let events = collect(&router, "hello", None).await;
    assert_eq!(events.len(), 2);
    let StreamEvent::Routing(decision) = &events[0] else {
        panic!("first event must be routing");
    };
    assert_eq!(decision.selected_provider, None);
    assert_eq!(decision.reason, "no providers available");
    assert_eq!(
        events[1],
        StreamEvent::Fatal {
            error: FATAL_NO_PROVIDERS.to_string(),
            attempted_providers: Vec::new(),
        }
    );
}

#[tokio::test]
async fn test_empty_query_touches_no_provider() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["x"]));
    let router = Router::new(RoutingRuleSet::default(), registry(&[&openai], &[]));

    assert!(matches!(router.query("", None), Err(RouteError::InvalidInput)));
    assert!(matches!(router.query("  \t", None), Err(RouteError::InvalidInput)));
    assert_eq!(openai.queries(), 0);
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["x"]));
    let router = Router::new(RoutingRuleSet::default(), registry(&[&openai], &[]));

    let mut events = router.query("hello", None).unwrap();
    assert_eq!(openai.queries(), 0);

    assert!(matches!(events.next().await, Some(StreamEvent::Routing(_))));
    assert!(matches!(
        events.next().await,
        Some(StreamEvent::ProviderAttempt { .. })
    ));
    assert_eq!(openai.queries(), 0);

    events.next().await;
    assert_eq!(openai.queries(), 1);
}

#[tokio::test]
async fn test_dropping_stream_releases_provider() {
    let openai = ScriptedAdapter::new("openai", Script::Hang);
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["unused"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic], &[]),
    );

    let mut events = router.query("hello", None).unwrap();
    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
        let is_content = matches!(event, StreamEvent::Content { .. });
        seen.push(event);
        if is_content {
            break;
        }
    }
    assert_eq!(content(&seen), "first");
    assert!(!openai.released.load(Ordering::SeqCst));

    drop(events);
    assert!(openai.released.load(Ordering::SeqCst));
    assert_eq!(anthropic.queries(), 0);
}

// ============================================================================
// Stats and introspection
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_stats() {
    let openai = ScriptedAdapter::new("openai", Script::BreakAfter(vec!["a"], "flaky"));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Chunks(vec!["b", "c"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic], &["google"]),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let query = format!("question number {i}");
                router
                    .query(&query, None)
                    .unwrap()
                    .collect::<Vec<_>>()
                    .await
            })
        })
        .collect();

    for handle in handles {
        let events = handle.await.unwrap();
        assert_protocol(&events);
    }

    let reports = router.list_provider_stats();
    assert_eq!(reports.len(), 3);

    let openai_report = &reports[0];
    assert_eq!(openai_report.stats.request_count, 16);
    assert_eq!(openai_report.stats.error_count, 16);
    assert!((openai_report.error_rate - 1.0).abs() < f64::EPSILON);

    let anthropic_report = &reports[1];
    assert_eq!(anthropic_report.stats.request_count, 16);
    assert_eq!(anthropic_report.stats.error_count, 0);
    assert_eq!(anthropic_report.stats.total_tokens, 32);

    for report in &reports {
        assert!(report.stats.error_count <= report.stats.request_count);
    }
}

#[tokio::test]
async fn test_provider_stats_include_unavailable() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["x"]));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai], &["anthropic", "google"]),
    );

    let reports = router.list_provider_stats();
    let ids: Vec<_> = reports.iter().map(|r| r.stats.provider_id.as_str()).collect();
    assert_eq!(ids, vec!["openai", "anthropic", "google"]);
    assert!(reports[0].available);
    assert!(!reports[1].available);
    assert_eq!(reports[1].error.as_deref(), Some("API key not configured"));
    assert_eq!(reports[1].stats.request_count, 0);

    assert_eq!(router.available_providers(), vec!["openai"]);

    let json = serde_json::to_value(&reports[1]).unwrap();
    assert_eq!(json["provider_id"], "anthropic");
    assert_eq!(json["available"], false);
}

#[tokio::test]
async fn test_health_check_all() {
    let openai = ScriptedAdapter::new("openai", Script::Chunks(vec!["x"]));
    let anthropic = ScriptedAdapter::new("anthropic", Script::Refuse("down"));
    let router = Router::new(
        RoutingRuleSet::default(),
        registry(&[&openai, &anthropic], &["google"]),
    );

    let health = router.health_check_all().await;
    assert_eq!(health.len(), 3);
    assert_eq!(health.get("openai"), Some(&true));
    assert_eq!(health.get("anthropic"), Some(&false));
    assert_eq!(health.get("google"), Some(&false));
}

#[test]
fn test_current_rule_set() {
    let router = Router::new(code_rule_set(), registry(&[], &[]));
    assert_eq!(router.current_rule_set(), &code_rule_set());
    assert!(tokio_test::block_on(router.health_check_all()).is_empty());
}
