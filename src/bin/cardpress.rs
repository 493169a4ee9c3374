//! CLI binary for cardpress.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, writes the post directory and prints results.

use anyhow::{Context, Result};
use cardpress::{
    convert_to_dir, load_document, paginate_document, CardError, ConversionConfig,
    ConversionOutput, ConversionProgressCallback, MetricsMeasurer, ProgressCallback, Template,
    UnmeasurablePolicy,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// card. Cards finish out of order when rendering concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Laying out pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0) as f64
            / 1000.0
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_pages} cards…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("card {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, bytes: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} cards rendered",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} cards rendered  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render a post into dist/notes/
  cardpress notes.org

  # Denser template, custom output root
  cardpress --template compact --out posts notes.org

  # Print the page plan without rendering anything
  cardpress --plan notes.org

  # Replace images of unknown size with placeholders instead of failing
  cardpress --placeholder article.json

  # Machine-readable summary
  cardpress --json notes.org > summary.json

OUTPUT:
  <out>/<stem>/001.png, 002.png, …   one 3:4 card per page
  <out>/<stem>/caption.txt           title + excerpt
  <out>/<stem>/meta.json             size, template, plan, diagnostics

INPUT FORMATS:
  .org    Org-mode subset: #+TITLE, headings, paragraphs, lists,
          src/example blocks, rules, [[file:image.png]] lines
  .json   serialised Document (title + blocks)

ENVIRONMENT VARIABLES:
  RUST_LOG    Override the tracing filter (e.g. cardpress=debug)
"#;

/// Paginate a document into fixed-size card images plus a caption.
#[derive(Parser, Debug)]
#[command(
    name = "cardpress",
    version,
    about = "Paginate documents into fixed-size card images plus a caption",
    long_about = "Lay out an Org-mode or JSON document onto fixed-size 3:4 cards, never \
splitting headings, images or code blocks, splitting long paragraphs at word boundaries, \
and write the rendered cards, a caption and metadata to a post directory.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input document (.org or .json).
    input: PathBuf,

    /// Output root; the post is written to <OUT>/<input stem>/.
    #[arg(short, long, env = "CARDPRESS_OUT", default_value = "dist")]
    out: PathBuf,

    /// Layout template: clean, compact.
    #[arg(short, long, env = "CARDPRESS_TEMPLATE", default_value = "clean")]
    template: Template,

    /// Canvas width in pixels.
    #[arg(long, env = "CARDPRESS_WIDTH", default_value_t = 1242)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long, env = "CARDPRESS_HEIGHT", default_value_t = 1660)]
    height: u32,

    /// Number of cards rendered concurrently.
    #[arg(short, long, env = "CARDPRESS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Caption length limit in characters.
    #[arg(long, env = "CARDPRESS_CAPTION_BUDGET", default_value_t = 200)]
    caption_budget: usize,

    /// Replace unmeasurable blocks with placeholders instead of failing.
    #[arg(long, env = "CARDPRESS_PLACEHOLDER")]
    placeholder: bool,

    /// Render at most this many cards (0 disables the cap).
    #[arg(long, env = "CARDPRESS_MAX_PAGES", default_value_t = 30)]
    max_pages: usize,

    /// Retries per card on capture failure.
    #[arg(long, env = "CARDPRESS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Print the page plan only, no rendering.
    #[arg(long)]
    plan: bool,

    /// Print a JSON summary instead of human-readable output.
    #[arg(long, env = "CARDPRESS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CARDPRESS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CARDPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CARDPRESS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs are suppressed while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.plan;
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

    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan {
        let config = build_config(&cli, None)?;
        return print_plan(&cli, &config);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let post_dir = post_dir(&cli.out, &cli.input);
    let output = match convert_to_dir(&cli.input, &post_dir, &config).await {
        Ok(output) => output,
        Err(e) => {
            report_error(&e);
            return Err(e).context("Conversion failed");
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&summary(&output, &post_dir))
            .context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        for diagnostic in &output.diagnostics {
            eprintln!("  {} {}", cyan("!"), diagnostic);
        }
        eprintln!(
            "{}  {}/{} cards  {}ms  →  {}",
            if output.stats.failed_pages + output.stats.not_submitted_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.stats.succeeded_pages,
            output.stats.rendered_pages,
            output.stats.total_duration_ms,
            bold(&post_dir.display().to_string()),
        );
        eprintln!();
        println!("{}", output.caption);
    }

    if let Err(e) = output.into_result() {
        report_error(&e);
        return Err(e).context("Some cards were not rendered");
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let policy = if cli.placeholder {
        UnmeasurablePolicy::Placeholder
    } else {
        UnmeasurablePolicy::Fail
    };

    let mut builder = ConversionConfig::builder()
        .template(cli.template)
        .canvas_size(cli.width, cli.height)
        .concurrency(cli.concurrency)
        .caption_char_budget(cli.caption_budget)
        .unmeasurable_policy(policy)
        .max_pages((cli.max_pages > 0).then_some(cli.max_pages))
        .max_retries(cli.max_retries);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `<out>/<input stem>`.
fn post_dir(out: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "post".to_string());
    out.join(stem)
}

fn print_plan(cli: &Cli, config: &ConversionConfig) -> Result<()> {
    let pagination = load_document(&cli.input)
        .and_then(|document| paginate_document(&document, &MetricsMeasurer, config))
        .map_err(|e| {
            report_error(&e);
            e
        })?;
    let plan: Vec<_> = pagination.pages.iter().map(|p| p.summary()).collect();

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "content_height": pagination.content_height,
            "pages": plan,
            "diagnostics": pagination.diagnostics,
        }))
        .context("Failed to serialise plan")?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "{} pages, content height {}px",
        bold(&plan.len().to_string()),
        pagination.content_height
    );
    for page in &plan {
        println!("{}", bold(&format!("Page {:>3}  {:>5}px", page.page, page.height)));
        for entry in &page.entries {
            println!(
                "  {} {:<10} {}",
                dim(&format!("#{:<4}", entry.block)),
                entry.kind,
                dim(&format!("{}px", entry.height))
            );
        }
    }
    for diagnostic in &pagination.diagnostics {
        eprintln!("  {} {}", cyan("!"), diagnostic);
    }
    Ok(())
}

fn summary(output: &ConversionOutput, post_dir: &Path) -> serde_json::Value {
    serde_json::json!({
        "post_dir": post_dir,
        "caption": output.caption,
        "metadata": output.metadata,
        "stats": output.stats,
        "plan": output.plan,
        "diagnostics": output.diagnostics,
        "failures": output.failures().collect::<Vec<_>>(),
    })
}

/// Print a fatal error with its stage and, where known, page and block.
fn report_error(e: &CardError) {
    let mut location = Vec::new();
    if let Some(page) = e.page() {
        location.push(format!("page {page}"));
    }
    if let Some(block) = e.block_position() {
        location.push(format!("block {block}"));
    }
    let location = if location.is_empty() {
        String::new()
    } else {
        format!(" ({})", location.join(", "))
    };
    eprintln!(
        "{} {} stage failed{}: {}",
        red("✘"),
        bold(&e.stage().to_string()),
        location,
        e
    );
}
