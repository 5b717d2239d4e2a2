//! deep-research 命令行入口
//!
//! 读取配置与凭证，按需先追问澄清问题，再递归研究并输出报告或答案。
//! 进度与日志写到 stderr，结果写到 stdout 或 --output 指定的文件。

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use deep_research::config::load_config;
use deep_research::core::{AbortHandle, Progress};
use deep_research::llm::{resolve_model, Credentials, OpenAiClient, StructuredClient};
use deep_research::observability;
use deep_research::research::{
    combine_query, OutputMode, ResearchOptions, ResearchOutput, ResearchRequest, ResearchResponse,
    Researcher,
};
use deep_research::tools::FirecrawlSearch;

#[derive(Parser, Debug)]
#[command(name = "deep-research", version, about = "Recursive web research with an LLM")]
struct Cli {
    /// 研究主题；省略时从 stdin 读取
    query: Option<String>,

    /// 每层生成的查询数（默认取配置）
    #[arg(short, long)]
    breadth: Option<usize>,

    /// 递归深度（默认取配置）
    #[arg(short, long)]
    depth: Option<usize>,

    /// 输出简短答案而不是报告
    #[arg(long)]
    answer: bool,

    /// 研究前先回答澄清问题
    #[arg(long)]
    feedback: bool,

    /// 写入文件而不是 stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 输出 JSON 响应 {learnings, visitedUrls, report|answer} 或 {error}
    #[arg(long)]
    json: bool,

    /// 额外的配置文件
    #[arg(short, long, env = "RESEARCH_CONFIG")]
    config: Option<PathBuf>,
}

fn ask(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn render_progress(p: &Progress) -> String {
    format!(
        "[depth {}/{} | breadth {}/{} | queries {}/{}] {}",
        p.current_depth,
        p.total_depth,
        p.current_breadth,
        p.total_breadth,
        p.completed_queries,
        p.total_queries,
        p.current_query.as_deref().unwrap_or("")
    )
}

fn write_output(path: Option<&PathBuf>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Saved to {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    let model = resolve_model(&Credentials::from_config(&cfg.llm))?;
    let base_url = model.base_url.clone();
    let llm: Arc<dyn StructuredClient> = Arc::new(
        OpenAiClient::new(model, cfg.llm.timeout_secs).context("Failed to create LLM client")?,
    );
    tracing::info!(model = %llm.model_name(), base_url = %base_url, "using model");
    let search = Arc::new(
        FirecrawlSearch::new(
            cfg.search.resolved_base_url().as_deref(),
            cfg.search.resolved_api_key().as_deref(),
            cfg.search.timeout_secs,
            cfg.search.limit,
        )
        .context("Failed to create search client")?,
    );

    let abort = AbortHandle::new();
    abort.install_signal_handlers();
    if let Some(secs) = cfg.research.deadline_secs {
        abort.abort_after(Duration::from_secs(secs));
    }

    let researcher = Researcher::with_options(
        llm.clone(),
        search,
        ResearchOptions::from(&cfg.research),
    )
    .with_cancellation(abort.token());

    let initial = match cli.query.clone() {
        Some(q) if !q.trim().is_empty() => q,
        _ => ask("What would you like to research? ")?,
    };
    anyhow::ensure!(!initial.is_empty(), "Research query is empty");

    let topic = if cli.feedback {
        let questions = researcher
            .feedback(&initial, cfg.research.feedback_questions)
            .await?;
        if questions.is_empty() {
            initial
        } else {
            eprintln!("To better understand your research needs, please answer these follow-up questions:");
            let mut qa = Vec::with_capacity(questions.len());
            for q in questions {
                let a = ask(&format!("\n{q}\nYour answer: "))?;
                qa.push((q, a));
            }
            combine_query(&initial, &qa)
        }
    } else {
        initial
    };

    let mut progress_rx = researcher.subscribe_progress();
    let progress_task = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let snapshot = progress_rx.borrow_and_update().clone();
            eprintln!("{}", render_progress(&snapshot));
        }
    });

    let request = ResearchRequest {
        query: topic,
        breadth: cli.breadth.unwrap_or(cfg.research.breadth),
        depth: cli.depth.unwrap_or(cfg.research.depth),
        mode: if cli.answer {
            OutputMode::Answer
        } else {
            OutputMode::Report
        },
    };
    let result = researcher.research(request).await;
    progress_task.abort();

    let (prompt, completion, total) = llm.token_usage();
    tracing::info!(prompt, completion, total, "token usage");
    if let Some(reason) = abort.reason() {
        tracing::warn!(reason = ?reason, "research aborted");
    }

    if cli.json {
        let failed = result.is_err();
        let response = ResearchResponse::from(result);
        let text = serde_json::to_string_pretty(&response).context("Failed to encode response")?;
        write_output(cli.output.as_ref(), &text)?;
        anyhow::ensure!(!failed, "Research failed");
        return Ok(());
    }

    let outcome = result.context("Research failed")?;
    eprintln!(
        "\nLearnings: {}\nVisited URLs: {}",
        outcome.learnings.len(),
        outcome.visited_urls.len()
    );
    let text = match outcome.output {
        ResearchOutput::Report(report) => report,
        ResearchOutput::Answer(answer) => answer,
    };
    write_output(cli.output.as_ref(), &text)
}
