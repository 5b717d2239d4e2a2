//! 递归研究编排器
//!
//! 每一层（frame）：生成查询 → 各查询作为分支并发执行（搜索 → 提炼 → 递归或终止）→ 汇合去重。
//! 分支是普通 future，在调用方任务上由 try_join_all 汇合，不 spawn。
//! 下一层 breadth' = ceil(breadth / 2)，depth' = depth - 1，depth' 为 0 时分支终止。
//!
//! 限流（见 LimiterScope）：
//! - Shared：整次研究共用一个限流器，每次外部调用（生成、搜索、提炼）各自排队，递归期间不占许可
//! - PerFrame：每层新建限流器，分支连同其递归子树占用本层一个许可
//!
//! 分支出错时按 ErrorPolicy 处理：限流 / 鉴权 / 取消上抛并使本层失败，其余错误在分支内吸收。

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ResearchSection;
use crate::core::{
    ConcurrencyLimiter, ErrorKind, ErrorPolicy, LimiterScope, Progress, ProgressTracker,
    ProgressUpdate, ResearchError,
};
use crate::llm::StructuredClient;
use crate::research::feedback::FeedbackGenerator;
use crate::research::learnings::{LearningExtractor, DEFAULT_CONTENT_TOKEN_BUDGET};
use crate::research::prompts;
use crate::research::queries::{QueryGenerator, SerpQuery};
use crate::research::synthesis::{Synthesizer, DEFAULT_REPORT_TOKEN_BUDGET};
use crate::tools::SearchClient;

/// 编排参数
#[derive(Debug, Clone)]
pub struct ResearchOptions {
    /// 同时在途的外部调用（Shared）或分支（PerFrame）上限
    pub concurrency: usize,
    pub limiter_scope: LimiterScope,
    pub max_learnings: usize,
    pub content_token_budget: usize,
    pub report_token_budget: usize,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            limiter_scope: LimiterScope::Shared,
            max_learnings: 3,
            content_token_budget: DEFAULT_CONTENT_TOKEN_BUDGET,
            report_token_budget: DEFAULT_REPORT_TOKEN_BUDGET,
        }
    }
}

impl From<&ResearchSection> for ResearchOptions {
    fn from(section: &ResearchSection) -> Self {
        Self {
            concurrency: section.concurrency,
            limiter_scope: section.limiter_scope,
            max_learnings: section.max_learnings,
            content_token_budget: section.content_token_budget,
            report_token_budget: section.report_token_budget,
        }
    }
}

/// 一次研究（或一个子树）的结果；两个列表均已按首次出现顺序去重
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

/// 输出形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Report,
    Answer,
}

#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    pub mode: OutputMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchOutput {
    /// Markdown 报告（含来源列表）
    Report(String),
    Answer(String),
}

#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
    pub output: ResearchOutput,
}

/// 对外的 JSON 响应：成功时 {learnings, visitedUrls, report | answer}，失败时 {error}
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResearchResponse {
    Success {
        learnings: Vec<String>,
        #[serde(rename = "visitedUrls")]
        visited_urls: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
    },
    Failure {
        error: String,
    },
}

impl From<Result<ResearchOutcome, ResearchError>> for ResearchResponse {
    fn from(result: Result<ResearchOutcome, ResearchError>) -> Self {
        match result {
            Ok(outcome) => {
                let (report, answer) = match outcome.output {
                    ResearchOutput::Report(r) => (Some(r), None),
                    ResearchOutput::Answer(a) => (None, Some(a)),
                };
                ResearchResponse::Success {
                    learnings: outcome.learnings,
                    visited_urls: outcome.visited_urls,
                    report,
                    answer,
                }
            }
            Err(e) => ResearchResponse::Failure {
                error: e.to_string(),
            },
        }
    }
}

/// 一层递归的输入，按值向下传递
#[derive(Debug, Clone)]
struct Frame {
    query: String,
    breadth: usize,
    depth: usize,
    learnings: Vec<String>,
    visited_urls: Vec<String>,
}

/// 分支结束状态；上抛的错误不经过这里，直接以 Err 终止汇合
#[derive(Debug)]
enum BranchOutcome {
    Completed(ResearchResult),
    /// 被吸收的错误类别
    Absorbed(ErrorKind),
}

fn settle(query: &str, result: Result<ResearchResult, ResearchError>) -> Result<BranchOutcome, ResearchError> {
    match result {
        Ok(r) => Ok(BranchOutcome::Completed(r)),
        Err(e) => match e.policy() {
            ErrorPolicy::Escalate => {
                tracing::error!(query = %query, kind = ?e.kind(), error = %e, "branch failed, escalating");
                Err(e)
            }
            ErrorPolicy::Absorb => {
                tracing::warn!(query = %query, kind = ?e.kind(), error = %e, "branch failed, absorbed");
                Ok(BranchOutcome::Absorbed(e.kind()))
            }
        },
    }
}

/// 按首次出现顺序去重
fn dedup_ordered<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn concat(seed: &[String], new: impl IntoIterator<Item = String>) -> Vec<String> {
    seed.iter().cloned().chain(new).collect()
}

/// 递归研究器
pub struct Researcher {
    search: Arc<dyn SearchClient>,
    queries: QueryGenerator,
    extractor: LearningExtractor,
    synthesizer: Synthesizer,
    feedback: FeedbackGenerator,
    options: ResearchOptions,
    progress: ProgressTracker,
    cancel: CancellationToken,
}

impl Researcher {
    pub fn new(llm: Arc<dyn StructuredClient>, search: Arc<dyn SearchClient>) -> Self {
        Self::with_options(llm, search, ResearchOptions::default())
    }

    pub fn with_options(
        llm: Arc<dyn StructuredClient>,
        search: Arc<dyn SearchClient>,
        options: ResearchOptions,
    ) -> Self {
        Self {
            search,
            queries: QueryGenerator::new(llm.clone()),
            extractor: LearningExtractor::new(llm.clone())
                .with_content_token_budget(options.content_token_budget),
            synthesizer: Synthesizer::new(llm.clone())
                .with_token_budget(options.report_token_budget),
            feedback: FeedbackGenerator::new(llm),
            options,
            progress: ProgressTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// 绑定外部取消令牌（如 AbortHandle::token）
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 进度快照；每次 deep_research 开始时重置，并发研究请各用一个 Researcher
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// 研究前的澄清问题
    pub async fn feedback(&self, query: &str, max_questions: usize) -> Result<Vec<String>, ResearchError> {
        self.call(None, self.feedback.generate_feedback(query, max_questions))
            .await
    }

    /// 递归研究：返回去重后的全部要点与访问过的 URL
    pub async fn deep_research(
        &self,
        query: &str,
        breadth: usize,
        depth: usize,
    ) -> Result<ResearchResult, ResearchError> {
        if breadth == 0 {
            return Err(ResearchError::InvalidRequest("breadth must be at least 1".into()));
        }
        if depth == 0 {
            return Err(ResearchError::InvalidRequest("depth must be at least 1".into()));
        }

        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("research", run_id = %run_id);
        async {
            tracing::info!(
                breadth,
                depth,
                concurrency = self.options.concurrency,
                scope = ?self.options.limiter_scope,
                "research started"
            );
            // 同一个 Researcher 上的多次研究共用一个快照，开始时整体重置
            self.progress.replace(Progress {
                current_depth: depth,
                total_depth: depth,
                current_breadth: breadth,
                total_breadth: breadth,
                ..Default::default()
            });

            let shared = ConcurrencyLimiter::new(self.options.concurrency);
            let frame = Frame {
                query: query.to_string(),
                breadth,
                depth,
                learnings: Vec::new(),
                visited_urls: Vec::new(),
            };
            let result = self.research_frame(frame, &shared).await;
            match &result {
                Ok(r) => tracing::info!(
                    learnings = r.learnings.len(),
                    urls = r.visited_urls.len(),
                    "research finished"
                ),
                Err(e) => tracing::error!(kind = ?e.kind(), error = %e, "research failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// 研究并生成报告或答案
    pub async fn research(&self, request: ResearchRequest) -> Result<ResearchOutcome, ResearchError> {
        let result = self
            .deep_research(&request.query, request.breadth, request.depth)
            .await?;
        let output = match request.mode {
            OutputMode::Report => ResearchOutput::Report(
                self.call(
                    None,
                    self.synthesizer
                        .write_report(&request.query, &result.learnings, &result.visited_urls),
                )
                .await?,
            ),
            OutputMode::Answer => ResearchOutput::Answer(
                self.call(
                    None,
                    self.synthesizer.write_answer(&request.query, &result.learnings),
                )
                .await?,
            ),
        };
        Ok(ResearchOutcome {
            learnings: result.learnings,
            visited_urls: result.visited_urls,
            output,
        })
    }

    /// Shared 作用域下外部调用使用的限流器
    fn call_slot<'l>(&self, shared: &'l ConcurrencyLimiter) -> Option<&'l ConcurrencyLimiter> {
        match self.options.limiter_scope {
            LimiterScope::Shared => Some(shared),
            LimiterScope::PerFrame => None,
        }
    }

    /// 一次外部调用：可选限流，并与取消令牌竞速
    async fn call<F, T>(&self, limiter: Option<&ConcurrencyLimiter>, task: F) -> Result<T, ResearchError>
    where
        F: Future<Output = Result<T, ResearchError>>,
    {
        let admitted = async move {
            match limiter {
                Some(l) => l.run(task).await,
                None => task.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResearchError::Cancelled),
            r = admitted => r,
        }
    }

    fn research_frame<'a>(
        &'a self,
        frame: Frame,
        shared: &'a ConcurrencyLimiter,
    ) -> BoxFuture<'a, Result<ResearchResult, ResearchError>> {
        async move {
            let Frame {
                query,
                breadth,
                depth,
                learnings,
                visited_urls,
            } = frame;
            tracing::info!(breadth, depth, seed_learnings = learnings.len(), "frame started");

            let serp_queries = self
                .call(
                    self.call_slot(shared),
                    self.queries.generate(&query, &learnings, breadth),
                )
                .await?;
            self.progress.update(ProgressUpdate {
                total_queries: Some(serp_queries.len()),
                current_query: serp_queries.first().map(|q| q.query.clone()),
                ..Default::default()
            });

            let frame_limiter = ConcurrencyLimiter::new(self.options.concurrency);
            let branches = serp_queries.into_iter().map(|serp| {
                let frame_limiter = &frame_limiter;
                let learnings = &learnings;
                let visited_urls = &visited_urls;
                async move {
                    let query = serp.query.clone();
                    let branch = self.branch(serp, breadth, depth, learnings, visited_urls, shared);
                    let result = match self.options.limiter_scope {
                        LimiterScope::PerFrame => frame_limiter.run(branch).await,
                        LimiterScope::Shared => branch.await,
                    };
                    settle(&query, result)
                }
            });
            let outcomes = try_join_all(branches).await?;

            let mut all_learnings = Vec::new();
            let mut all_urls = Vec::new();
            let mut absorbed: HashMap<ErrorKind, usize> = HashMap::new();
            for outcome in outcomes {
                match outcome {
                    BranchOutcome::Completed(r) => {
                        all_learnings.extend(r.learnings);
                        all_urls.extend(r.visited_urls);
                    }
                    BranchOutcome::Absorbed(kind) => *absorbed.entry(kind).or_default() += 1,
                }
            }
            let result = ResearchResult {
                learnings: dedup_ordered(all_learnings),
                visited_urls: dedup_ordered(all_urls),
            };
            tracing::info!(
                depth,
                absorbed = absorbed.values().sum::<usize>(),
                absorbed_kinds = ?absorbed,
                learnings = result.learnings.len(),
                urls = result.visited_urls.len(),
                "frame finished"
            );
            Ok(result)
        }
        .boxed()
    }

    /// 单个分支：搜索 → 提炼 → 递归或终止
    async fn branch(
        &self,
        serp: SerpQuery,
        breadth: usize,
        depth: usize,
        learnings: &[String],
        visited_urls: &[String],
        shared: &ConcurrencyLimiter,
    ) -> Result<ResearchResult, ResearchError> {
        let slot = self.call_slot(shared);
        let results = self.call(slot, self.search.search(&serp.query)).await?;
        let new_urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();

        let new_breadth = breadth.div_ceil(2);
        let new_depth = depth - 1;
        let extracted = self
            .call(
                slot,
                self.extractor.extract(
                    &serp.query,
                    &results,
                    self.options.max_learnings,
                    new_breadth,
                ),
            )
            .await?;

        let all_learnings = concat(learnings, extracted.learnings);
        let all_urls = concat(visited_urls, new_urls);

        if new_depth > 0 {
            tracing::info!(
                query = %serp.query,
                breadth = new_breadth,
                depth = new_depth,
                "researching deeper"
            );
            self.progress.complete_query(ProgressUpdate {
                current_depth: Some(new_depth),
                current_breadth: Some(new_breadth),
                current_query: Some(serp.query.clone()),
                ..Default::default()
            });
            let next = Frame {
                query: prompts::next_query(&serp.research_goal, &extracted.follow_up_questions),
                breadth: new_breadth,
                depth: new_depth,
                learnings: all_learnings,
                visited_urls: all_urls,
            };
            self.research_frame(next, shared).await
        } else {
            self.progress.complete_query(ProgressUpdate {
                current_depth: Some(0),
                current_query: Some(serp.query),
                ..Default::default()
            });
            Ok(ResearchResult {
                learnings: all_learnings,
                visited_urls: all_urls,
            })
        }
    }
}
