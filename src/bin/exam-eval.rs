//! CLI binary for exam-evaluator.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `EvaluationConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exam_evaluator::{
    evaluate, inspect, render_final_report_pdf, render_markdown_pdf, report_pdf, write_atomic,
    EvaluationConfig, EvaluationMode, EvaluationProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per graded exam.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-exam wall-clock start times, keyed by 1-based index.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Exam names by index, for the completion lines.
    names: Mutex<HashMap<usize, String>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} exams  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Grading");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn name_of(&self, index: usize) -> String {
        self.names
            .lock()
            .ok()
            .and_then(|m| m.get(&index).cloned())
            .unwrap_or_else(|| format!("exam {index}"))
    }
}

impl EvaluationProgressCallback for CliProgressCallback {
    fn on_evaluation_start(&self, total_pairs: usize) {
        self.activate_bar(total_pairs);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Evaluating {total_pairs} exam paper(s)…"))
        ));
    }

    fn on_pair_start(&self, index: usize, _total: usize, exam_name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        if let Ok(mut m) = self.names.lock() {
            m.insert(index, exam_name.to_string());
        }
        self.bar.set_message(exam_name.to_string());
    }

    fn on_pair_complete(&self, index: usize, total: usize, report_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<24} {:<8}  {}",
            green("✓"),
            index,
            total,
            self.name_of(index),
            dim(&format!("{report_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pair_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_final_report_start(&self) {
        self.bar.set_prefix("Compiling");
        self.bar.set_message("final report…");
    }

    fn on_evaluation_complete(&self, total_pairs: usize, succeeded: usize) {
        let failed = total_pairs.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} exam(s) evaluated successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} exams evaluated  ({} failed)",
                if failed == total_pairs { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_pairs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Grade two exams and download the final report card
  exam-eval evaluate --exam maths.pdf physics.pdf \
                     --scheme maths_ms.pdf physics_ms.pdf -o report_card.pdf

  # Individual report cards only, markdown to a file
  exam-eval evaluate --individual --exam maths.pdf --scheme maths_ms.pdf --markdown maths.md

  # Use a specific provider and model
  exam-eval evaluate --provider anthropic --model claude-sonnet-4-20250514 \
                     --exam maths.pdf --scheme maths_ms.pdf

  # JSON output (reports, final report, stats)
  exam-eval evaluate --json --exam maths.pdf --scheme maths_ms.pdf > result.json

  # Turn an edited final report back into a PDF (no API key needed)
  exam-eval render final_report.md -o report_card.pdf

  # Check a PDF has a text layer (no API key needed)
  exam-eval inspect maths.pdf

  # Browser UI on http://127.0.0.1:8080
  exam-eval serve --samples-dir data/

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EXAM_EVAL_PROVIDER      Provider (openai, anthropic, gemini, ollama, ...)
  EXAM_EVAL_MODEL         Model ID
  RUST_LOG                Log filter, e.g. exam_evaluator=debug

  Variables may also be set in a .env file in the working directory.
"#;

/// Grade solved exam papers against marking schemes with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "exam-eval",
    version,
    about = "Grade solved exam papers against marking schemes with an LLM",
    long_about = "Grade solved exam papers (PDF) against their marking schemes (PDF) with a \
chat LLM. Produces a report card per exam and, in batch mode, a final report card with a \
result table and an overall analysis, downloadable as a PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXAM_EVAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXAM_EVAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grade exams and produce report cards.
    Evaluate(EvaluateArgs),
    /// Render report markdown to PDF without calling a model.
    Render(RenderArgs),
    /// Show page count and a text preview of a PDF.
    Inspect(InspectArgs),
    /// Serve the browser UI and JSON API.
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

/// Model and retry settings shared by `evaluate` and `serve`.
#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EXAM_EVAL_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EXAM_EVAL_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0). 0 keeps grading deterministic.
    #[arg(long, env = "EXAM_EVAL_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "EXAM_EVAL_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries per call on LLM failure.
    #[arg(long, env = "EXAM_EVAL_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Exams graded at the same time. Report order never changes.
    #[arg(short, long, env = "EXAM_EVAL_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "EXAM_EVAL_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "EXAM_EVAL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Text file replacing the examiner system prompt.
    #[arg(long, env = "EXAM_EVAL_EXAMINER_PROMPT")]
    examiner_prompt: Option<PathBuf>,

    /// Text file replacing the final-report system prompt.
    #[arg(long, env = "EXAM_EVAL_COMPILER_PROMPT")]
    compiler_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Solved exam papers (paths or URLs), in the same order as --scheme.
    #[arg(long = "exam", required = true, num_args = 1..)]
    exams: Vec<String>,

    /// Marking schemes (paths or URLs), one per exam.
    #[arg(long = "scheme", required = true, num_args = 1..)]
    schemes: Vec<String>,

    /// Write the report PDF here.
    #[arg(short, long, env = "EXAM_EVAL_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the combined report markdown here.
    #[arg(long)]
    markdown: Option<PathBuf>,

    /// Output structured JSON (EvaluationOutput) instead of markdown.
    #[arg(long)]
    json: bool,

    /// Individual report cards only; skip the final report.
    #[arg(long)]
    individual: bool,

    /// Disable progress bar.
    #[arg(long, env = "EXAM_EVAL_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Markdown file to render.
    input: PathBuf,

    /// PDF file to write.
    #[arg(short, long, default_value = "report_card.pdf")]
    output: PathBuf,

    /// Lay out as a single exam report instead of a final report card.
    #[arg(long)]
    exam: bool,

    /// Title above an exam report.
    #[arg(long, requires = "exam")]
    title: Option<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output JSON.
    #[arg(long)]
    json: bool,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "EXAM_EVAL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Interface to bind.
    #[arg(long, env = "EXAM_EVAL_HOST", default_value = "127.0.0.1")]
    host: std::net::IpAddr,

    /// Port to listen on.
    #[arg(long, env = "EXAM_EVAL_PORT", default_value_t = 8080)]
    port: u16,

    /// Directory of sample PDFs offered for download.
    #[arg(long, env = "EXAM_EVAL_SAMPLES_DIR")]
    samples_dir: Option<PathBuf>,

    /// Maximum upload size per request, in MiB.
    #[arg(long, env = "EXAM_EVAL_UPLOAD_LIMIT_MB", default_value_t = 50)]
    upload_limit_mb: usize,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Evaluate(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Evaluate(args) => run_evaluate(args, show_progress, cli.quiet).await,
        Command::Render(args) => run_render(args, cli.quiet).await,
        Command::Inspect(args) => run_inspect(args).await,
        #[cfg(feature = "server")]
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_evaluate(args: EvaluateArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn EvaluationProgressCallback>)
    } else {
        None
    };

    let mode = if args.individual {
        EvaluationMode::Individual
    } else {
        EvaluationMode::Batch
    };
    let config = build_config(&args.model, mode, progress_cb).await?;

    let output = evaluate(&args.exams, &args.schemes, &config)
        .await
        .context("Evaluation failed")?;

    if let Some(ref path) = args.output {
        let pdf = report_pdf(&output).context("Failed to lay out the report PDF")?;
        write_atomic(path, &pdf)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !quiet {
            eprintln!("{}  report PDF  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    let markdown = output.combined_markdown();
    if let Some(ref path) = args.markdown {
        write_atomic(path, markdown.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if args.output.is_none() && args.markdown.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(markdown.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !quiet && !args.json {
        let stats = &output.stats;
        if !show_progress {
            eprintln!(
                "Evaluated {}/{} exam(s) in {}ms",
                stats.evaluated_pairs, stats.total_pairs, stats.total_duration_ms
            );
            if stats.failed_pairs > 0 {
                eprintln!("  {} exam(s) failed", stats.failed_pairs);
            }
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.total_duration_ms,
        );
    }

    Ok(())
}

async fn run_render(args: RenderArgs, quiet: bool) -> Result<()> {
    let markdown = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let pdf = if args.exam {
        render_markdown_pdf(args.title.as_deref(), &markdown)
    } else {
        render_final_report_pdf(&markdown)
    }
    .context("Failed to lay out the report PDF")?;

    write_atomic(&args.output, &pdf)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if !quiet {
        eprintln!(
            "{}  {} bytes  →  {}",
            green("✔"),
            pdf.len(),
            bold(&args.output.display().to_string())
        );
    }
    Ok(())
}

async fn run_inspect(args: InspectArgs) -> Result<()> {
    let info = inspect(&args.input, args.download_timeout)
        .await
        .context("Failed to inspect PDF")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
        );
    } else {
        println!("File:         {}", args.input);
        println!("Name:         {}", info.name);
        println!("Pages:        {}", info.page_count);
        println!("Text chars:   {}", info.text_chars);
        if info.text_chars == 0 {
            println!("              {}", red("no text layer: this PDF cannot be graded"));
        } else {
            println!("Preview:");
            for line in info.preview.lines().take(12) {
                println!("  {}", dim(line));
            }
        }
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn run_serve(args: ServeArgs) -> Result<()> {
    use exam_evaluator::server::{serve, AppState};

    let config = build_config(&args.model, EvaluationMode::Batch, None).await?;
    let mut state = AppState::new(config).with_upload_limit(args.upload_limit_mb * 1024 * 1024);
    if let Some(dir) = args.samples_dir {
        anyhow::ensure!(dir.is_dir(), "Samples directory {} does not exist", dir.display());
        state = state.with_samples_dir(dir);
    }

    let addr = std::net::SocketAddr::new(args.host, args.port);
    eprintln!("{} Serving on {}", cyan("◆"), bold(&format!("http://{addr}")));
    serve(state, addr).await.context("Server error")
}

/// Map CLI args to `EvaluationConfig`.
async fn build_config(
    args: &ModelArgs,
    mode: EvaluationMode,
    progress: Option<ProgressCallback>,
) -> Result<EvaluationConfig> {
    let mut builder = EvaluationConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_retries(args.max_retries)
        .concurrency(args.concurrency)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .mode(mode);

    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref path) = args.examiner_prompt {
        builder = builder.examiner_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = args.compiler_prompt {
        builder = builder.compiler_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {}", path.display()))
}
