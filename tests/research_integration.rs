//! 递归研究端到端测试：Mock 结构化补全 + 内存搜索客户端

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deep_research::core::{AbortHandle, AbortReason, LimiterScope, Progress, ResearchError};
use deep_research::llm::{MockStructuredClient, StructuredClient, StructuredRequest};
use deep_research::research::{
    OutputMode, ResearchOptions, ResearchOutput, ResearchRequest, Researcher,
};
use deep_research::tools::{SearchClient, SearchResult};
use serde_json::{json, Value};

fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let s = text.find(start).map(|i| i + start.len()).unwrap_or(0);
    let e = text[s..].find(end).map(|i| s + i).unwrap_or(text.len());
    &text[s..e]
}

/// 按 function 名应答：查询按全局计数命名 q0, q1, ...，数量等于 schema 的 maxItems
fn scripted_llm() -> MockStructuredClient {
    let counter = Arc::new(AtomicUsize::new(0));
    MockStructuredClient::new(move |req| match req.name.as_str() {
        "serp_queries" => {
            let cap = req.schema["properties"]["queries"]["maxItems"]
                .as_u64()
                .unwrap_or(1) as usize;
            let queries: Vec<Value> = (0..cap)
                .map(|_| {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    json!({"query": format!("q{n}"), "researchGoal": format!("goal {n}")})
                })
                .collect();
            Ok(json!({ "queries": queries }))
        }
        "serp_learnings" => {
            let q = between(&req.prompt, "<query>", "</query>");
            Ok(json!({
                "learnings": [format!("learning about {q}")],
                "followUpQuestions": [format!("what next after {q}?")]
            }))
        }
        "final_report" => Ok(json!({ "reportMarkdown": "# Report\n\nFindings." })),
        "final_answer" => Ok(json!({ "exactAnswer": "42" })),
        other => Err(ResearchError::Generic(format!("unexpected call {other}"))),
    })
}

/// 同时在途计数
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let n = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(n, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct FakeSearch {
    failures: HashMap<String, ResearchError>,
    gauge: Option<Arc<Gauge>>,
    common_url: bool,
    hang: bool,
}

#[async_trait]
impl SearchClient for FakeSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ResearchError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.enter();
            tokio::time::sleep(Duration::from_millis(5)).await;
            gauge.exit();
        }
        if let Some(err) = self.failures.get(query) {
            return Err(err.clone());
        }
        let mut results = vec![
            SearchResult {
                url: format!("https://example.com/{query}/a"),
                content: format!("first page about {query}"),
            },
            SearchResult {
                url: format!("https://example.com/{query}/b"),
                content: format!("second page about {query}"),
            },
        ];
        if self.common_url {
            results.push(SearchResult {
                url: "https://example.com/common".into(),
                content: "shared page".into(),
            });
        }
        Ok(results)
    }
}

/// 带在途计数的结构化补全
struct GaugedLlm {
    inner: MockStructuredClient,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl StructuredClient for GaugedLlm {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ResearchError> {
        self.gauge.enter();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let out = self.inner.complete_structured(request).await;
        self.gauge.exit();
        out
    }
}

fn search_failing(query: &str, err: ResearchError) -> FakeSearch {
    FakeSearch {
        failures: HashMap::from([(query.to_string(), err)]),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_depth_one_breadth_two() {
    let llm = Arc::new(scripted_llm());
    let researcher = Researcher::new(llm.clone(), Arc::new(FakeSearch::default()));

    let result = researcher.deep_research("rust async runtimes", 2, 1).await.unwrap();

    assert_eq!(result.learnings, vec!["learning about q0", "learning about q1"]);
    assert_eq!(result.visited_urls.len(), 4);
    assert_eq!(llm.calls_named("serp_queries").len(), 1);
    assert_eq!(llm.calls_named("serp_learnings").len(), 2);

    let progress = researcher.progress().snapshot();
    assert_eq!(progress.total_depth, 1);
    assert_eq!(progress.current_depth, 0);
    assert_eq!(progress.total_queries, 2);
    assert_eq!(progress.completed_queries, 2);
}

#[tokio::test]
async fn test_depth_two_breadth_four() {
    let llm = Arc::new(scripted_llm());
    let researcher = Researcher::new(llm.clone(), Arc::new(FakeSearch::default()));

    let result = researcher.deep_research("history of tea", 4, 2).await.unwrap();

    let generations = llm.calls_named("serp_queries");
    let caps: Vec<u64> = generations
        .iter()
        .map(|r| r.schema["properties"]["queries"]["maxItems"].as_u64().unwrap())
        .collect();
    assert_eq!(caps, vec![4, 2, 2, 2, 2]);

    // 4 个父分支 + 8 个叶子分支
    let extractions = llm.calls_named("serp_learnings");
    assert_eq!(extractions.len(), 12);
    let follow_up_caps: Vec<u64> = extractions
        .iter()
        .map(|r| r.schema["properties"]["followUpQuestions"]["maxItems"].as_u64().unwrap())
        .collect();
    assert_eq!(follow_up_caps.iter().filter(|c| **c == 2).count(), 4);
    assert_eq!(follow_up_caps.iter().filter(|c| **c == 1).count(), 8);

    assert_eq!(result.learnings.len(), 12);
    for n in 0..12 {
        assert!(result.learnings.contains(&format!("learning about q{n}")));
    }
    assert_eq!(result.visited_urls.len(), 24);
    assert_eq!(researcher.progress().snapshot().completed_queries, 12);

    // 下一层主题由研究目标与后续方向组成，并带上已有要点
    assert!(generations.iter().any(|r| r.prompt.contains(
        "Previous research goal: goal 0\nFollow-up research directions: \nwhat next after q0?"
    ) && r.prompt.contains("learning about q0")));
}

#[tokio::test]
async fn test_urls_and_learnings_deduplicated() {
    let llm = Arc::new(MockStructuredClient::new(|req| match req.name.as_str() {
        "serp_queries" => Ok(json!({"queries": [
            {"query": "a", "researchGoal": "ga"},
            {"query": "b", "researchGoal": "gb"}
        ]})),
        _ => Ok(json!({"learnings": ["same fact"], "followUpQuestions": []})),
    }));
    let search = FakeSearch {
        common_url: true,
        ..Default::default()
    };
    let researcher = Researcher::new(llm, Arc::new(search));

    let result = researcher.deep_research("topic", 2, 1).await.unwrap();
    assert_eq!(result.learnings, vec!["same fact"]);
    assert_eq!(
        result
            .visited_urls
            .iter()
            .filter(|u| u.as_str() == "https://example.com/common")
            .count(),
        1
    );
    assert_eq!(result.visited_urls.len(), 5);
}

#[tokio::test]
async fn test_rate_limit_escalates() {
    let researcher = Researcher::new(
        Arc::new(scripted_llm()),
        Arc::new(search_failing("q1", ResearchError::RateLimit("HTTP 429".into()))),
    );
    let err = researcher.deep_research("topic", 2, 1).await.unwrap_err();
    assert!(matches!(err, ResearchError::RateLimit(_)));
}

#[tokio::test]
async fn test_authentication_escalates_from_nested_frame() {
    // 子层各生成一条查询（q2、q3），其中一条鉴权失败
    let researcher = Researcher::new(
        Arc::new(scripted_llm()),
        Arc::new(search_failing("q3", ResearchError::Authentication("HTTP 401".into()))),
    );
    let err = researcher.deep_research("topic", 2, 2).await.unwrap_err();
    assert!(matches!(err, ResearchError::Authentication(_)));
}

#[tokio::test]
async fn test_generic_error_absorbed() {
    let researcher = Researcher::new(
        Arc::new(scripted_llm()),
        Arc::new(search_failing("q1", ResearchError::Timeout("search".into()))),
    );
    let result = researcher.deep_research("topic", 2, 1).await.unwrap();
    assert_eq!(result.learnings, vec!["learning about q0"]);
    assert_eq!(
        result.visited_urls,
        vec!["https://example.com/q0/a", "https://example.com/q0/b"]
    );
}

#[tokio::test]
async fn test_top_level_generation_failure_fails() {
    let researcher = Researcher::new(
        Arc::new(MockStructuredClient::new(|_| {
            Err(ResearchError::Server {
                status: 503,
                message: "unavailable".into(),
            })
        })),
        Arc::new(FakeSearch::default()),
    );
    let err = researcher.deep_research("topic", 2, 1).await.unwrap_err();
    assert!(matches!(err, ResearchError::Server { status: 503, .. }));
}

#[tokio::test]
async fn test_second_run_starts_with_fresh_progress() {
    // 第二次研究在生成查询时失败，快照停在开始时的重置值
    let fail = Arc::new(AtomicBool::new(false));
    let switch = fail.clone();
    let llm = MockStructuredClient::new(move |req| {
        if switch.load(Ordering::SeqCst) {
            return Err(ResearchError::Generic("generation down".into()));
        }
        match req.name.as_str() {
            "serp_queries" => Ok(json!({"queries": [
                {"query": "a", "researchGoal": "ga"},
                {"query": "b", "researchGoal": "gb"}
            ]})),
            _ => Ok(json!({"learnings": ["fact"], "followUpQuestions": []})),
        }
    });
    let researcher = Researcher::new(Arc::new(llm), Arc::new(FakeSearch::default()));
    let mut rx = researcher.subscribe_progress();

    researcher.deep_research("first topic", 2, 1).await.unwrap();
    let first = rx.borrow_and_update().clone();
    assert_eq!(first.completed_queries, 2);
    assert!(first.current_query.is_some());

    fail.store(true, Ordering::SeqCst);
    researcher.deep_research("second topic", 3, 2).await.unwrap_err();
    assert!(rx.has_changed().unwrap());
    let second = rx.borrow_and_update().clone();
    assert_eq!(
        second,
        Progress {
            current_depth: 2,
            total_depth: 2,
            current_breadth: 3,
            total_breadth: 3,
            total_queries: 0,
            completed_queries: 0,
            current_query: None,
        }
    );
}

#[tokio::test]
async fn test_nested_generation_failure_absorbed() {
    // 子层生成查询时返回无法解码的输出，该分支整体被吸收
    let calls = Arc::new(AtomicUsize::new(0));
    let llm = MockStructuredClient::new(move |req| match req.name.as_str() {
        "serp_queries" if calls.fetch_add(1, Ordering::SeqCst) == 0 => Ok(json!({"queries": [
            {"query": "a", "researchGoal": "ga"},
            {"query": "b", "researchGoal": "gb"}
        ]})),
        "serp_queries" => Ok(json!({"content": "not structured"})),
        _ => Ok(json!({"learnings": ["fact"], "followUpQuestions": ["next?"]})),
    });
    let researcher = Researcher::new(Arc::new(llm), Arc::new(FakeSearch::default()));
    let result = researcher.deep_research("topic", 2, 2).await.unwrap();
    assert!(result.learnings.is_empty());
    assert!(result.visited_urls.is_empty());
}

#[tokio::test]
async fn test_invalid_breadth_and_depth() {
    let researcher = Researcher::new(Arc::new(scripted_llm()), Arc::new(FakeSearch::default()));
    assert!(matches!(
        researcher.deep_research("topic", 0, 1).await,
        Err(ResearchError::InvalidRequest(_))
    ));
    assert!(matches!(
        researcher.deep_research("topic", 2, 0).await,
        Err(ResearchError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_shared_limiter_bounds_all_external_calls() {
    let gauge = Arc::new(Gauge::default());
    let llm = GaugedLlm {
        inner: scripted_llm(),
        gauge: gauge.clone(),
    };
    let search = FakeSearch {
        gauge: Some(gauge.clone()),
        ..Default::default()
    };
    let options = ResearchOptions {
        concurrency: 2,
        limiter_scope: LimiterScope::Shared,
        ..Default::default()
    };
    let researcher = Researcher::with_options(Arc::new(llm), Arc::new(search), options);

    let result = researcher.deep_research("topic", 4, 2).await.unwrap();
    assert_eq!(result.learnings.len(), 12);
    assert!(gauge.peak() <= 2, "peak {}", gauge.peak());
    assert!(gauge.peak() >= 1);
}

#[tokio::test]
async fn test_per_frame_limiter_bounds_branches() {
    let gauge = Arc::new(Gauge::default());
    let search = FakeSearch {
        gauge: Some(gauge.clone()),
        ..Default::default()
    };
    let options = ResearchOptions {
        concurrency: 2,
        limiter_scope: LimiterScope::PerFrame,
        ..Default::default()
    };
    let researcher = Researcher::with_options(Arc::new(scripted_llm()), Arc::new(search), options);

    let result = researcher.deep_research("topic", 4, 1).await.unwrap();
    assert_eq!(result.learnings.len(), 4);
    assert!(gauge.peak() <= 2, "peak {}", gauge.peak());
}

#[tokio::test]
async fn test_cancellation() {
    let abort = AbortHandle::new();
    let search = FakeSearch {
        hang: true,
        ..Default::default()
    };
    let researcher = Researcher::new(Arc::new(scripted_llm()), Arc::new(search))
        .with_cancellation(abort.token());

    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.abort(AbortReason::UserInitiated);
    });

    let err = researcher.deep_research("topic", 2, 2).await.unwrap_err();
    assert!(matches!(err, ResearchError::Cancelled));
    assert_eq!(abort.reason(), Some(AbortReason::UserInitiated));
}

#[tokio::test]
async fn test_report_lists_sources() {
    let researcher = Researcher::new(Arc::new(scripted_llm()), Arc::new(FakeSearch::default()));
    let outcome = researcher
        .research(ResearchRequest {
            query: "topic".into(),
            breadth: 2,
            depth: 1,
            mode: OutputMode::Report,
        })
        .await
        .unwrap();

    let ResearchOutput::Report(report) = &outcome.output else {
        panic!("expected report");
    };
    assert!(report.starts_with("# Report\n\nFindings.\n\n## Sources\n\n"));
    for url in &outcome.visited_urls {
        assert!(report.contains(&format!("- {url}")));
    }
}

#[tokio::test]
async fn test_answer_has_no_sources() {
    let llm = Arc::new(scripted_llm());
    let researcher = Researcher::new(llm.clone(), Arc::new(FakeSearch::default()));
    let outcome = researcher
        .research(ResearchRequest {
            query: "What is 6 x 7?".into(),
            breadth: 2,
            depth: 1,
            mode: OutputMode::Answer,
        })
        .await
        .unwrap();

    assert_eq!(outcome.output, ResearchOutput::Answer("42".into()));
    assert_eq!(outcome.learnings.len(), 2);
    let prompt = &llm.calls_named("final_answer")[0].prompt;
    assert!(prompt.contains("<learning>\nlearning about q0\n</learning>"));
}
