use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info, warn, LevelFilter};
use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use timeline_crawler_lib::config::{CrawlConfig, Credentials, Mode};
use timeline_crawler_lib::dedup_store::CrawlResults;
use timeline_crawler_lib::result_sink::{self, ResultSink, SinkFormat};
use timeline_crawler_lib::resume_manager::PROGRESS_FILE;
use timeline_crawler_lib::webdriver::{BrowserOptions, WebDriverSession};
use timeline_crawler_lib::{input_loader, logger, CrawlError, Crawler, ProgressState, RateLimiter, SiteProfile};

#[derive(Parser)]
#[command(name = "timeline-crawler", version, about = "Scroll a search timeline and collect what it shows")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, run one or more searches and append the results
    Crawl(CrawlArgs),
    /// Repair a JSON output file and convert it to CSV
    Export {
        /// JSON output written by `crawl`
        source: PathBuf,
        /// CSV file to create
        destination: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Image and video-preview links only
    Media,
    /// Structured records
    Full,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Array,
    Fragments,
}

#[derive(Args)]
struct CrawlArgs {
    #[arg(long, env = "CRAWLER_USERNAME")]
    username: String,
    #[arg(long, env = "CRAWLER_PASSWORD", hide_env_values = true)]
    password: String,
    /// Account email, typed when the site asks to verify the identity
    #[arg(long, env = "CRAWLER_EMAIL")]
    email: String,

    /// Search text; repeat for a batch
    #[arg(short, long = "query")]
    queries: Vec<String>,
    /// Text file (one query per line) or CSV with a `query` column
    #[arg(long)]
    queries_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "media")]
    mode: ModeArg,
    #[arg(long, default_value_t = 10)]
    num_scrolls: u32,
    /// Base pause between scrolls, in seconds
    #[arg(long, default_value_t = 15.0)]
    wait_base: f64,
    /// Random jitter added to or removed from the base pause
    #[arg(long, default_value_t = 5.0)]
    wait_epsilon: f64,

    #[arg(long)]
    since_id: Option<u64>,
    #[arg(long)]
    max_id: Option<u64>,
    /// YYYY-MM-DD, or "none"
    #[arg(long)]
    since: Option<String>,
    /// YYYY-MM-DD, or "none"
    #[arg(long)]
    until: Option<String>,
    /// Epoch seconds; overrides --since/--until
    #[arg(long)]
    since_time: Option<String>,
    /// Epoch seconds; overrides --since/--until
    #[arg(long)]
    until_time: Option<String>,

    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    webdriver_url: String,
    #[arg(long)]
    headless: bool,
    /// Disable the Chrome sandbox (required when running as root)
    #[arg(long)]
    no_sandbox: bool,
    /// Seconds to wait for any page element or browser request
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// JSON file overriding the site's URLs, locators and patterns
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Seed for the scroll pause jitter
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, default_value = "twitter.json")]
    output: PathBuf,
    #[arg(long, value_enum, default_value = "array")]
    format: FormatArg,
    /// Also export the output to this CSV file when the batch ends
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Skip queries recorded in the progress file
    #[arg(long)]
    resume: bool,
    #[arg(long, default_value = PROGRESS_FILE)]
    progress_file: PathBuf,
}

fn build_config(args: &CrawlArgs, query: &str) -> Result<CrawlConfig, CrawlError> {
    let profile = match &args.profile {
        Some(path) => SiteProfile::load(path)?,
        None => SiteProfile::default(),
    };
    let mode = match args.mode {
        ModeArg::Media => Mode::MediaOnly,
        ModeArg::Full => Mode::FullRecord,
    };

    CrawlConfig::builder(
        Credentials::new(&args.username, &args.password, &args.email),
        query,
    )
    .mode(mode)
    .num_scrolls(args.num_scrolls)
    .wait(args.wait_base, args.wait_epsilon)
    .id_range(args.since_id, args.max_id)
    .date_range(args.since.clone(), args.until.clone())
    .time_range(args.since_time.clone(), args.until_time.clone())
    .element_timeout(Duration::from_secs(args.timeout))
    .profile(profile)
    .build()
}

fn crawl(args: CrawlArgs) -> Result<(), Box<dyn Error>> {
    let mut queries = args.queries.clone();
    if let Some(file) = &args.queries_file {
        queries.extend(input_loader::load_queries(file)?);
    }
    if queries.is_empty() {
        error!("No queries given. Use --query or --queries-file.");
        return Ok(());
    }

    let format = match args.format {
        FormatArg::Array => SinkFormat::Array,
        FormatArg::Fragments => SinkFormat::Fragments,
    };
    let sink = ResultSink::new(&args.output, format);
    let mut progress = args.resume.then(|| ProgressState::load(&args.progress_file));
    let options = BrowserOptions {
        headless: args.headless,
        no_sandbox: args.no_sandbox,
        request_timeout: Duration::from_secs(args.timeout),
        ..BrowserOptions::default()
    };

    let total = queries.len();
    for (i, query) in queries.iter().enumerate() {
        if progress.as_ref().map_or(false, |p| p.contains(query)) {
            info!("Skipping '{}', already processed.", query);
            continue;
        }
        info!("Processing {} / {} : '{}'", i + 1, total, query);
        let started = Instant::now();

        let config = build_config(&args, query)?;
        let driver = WebDriverSession::connect(&args.webdriver_url, &options)?;
        let mut crawler = Crawler::new(driver, config)?;
        if let Some(seed) = args.seed {
            crawler = crawler.with_rate_limiter(RateLimiter::with_seed(seed));
        }

        match crawler.run() {
            Ok(results) => {
                let saved = match &results {
                    CrawlResults::Records(records) => sink.append(records)?,
                    CrawlResults::Media(media) if !media.is_empty() => sink.append(std::slice::from_ref(media))?,
                    CrawlResults::Media(_) => 0,
                };
                info!("'{}': {} results, {} entries saved", query, results.len(), saved);
            }
            Err(CrawlError::NoTweetsReturned(q)) => {
                warn!("No tweets returned for '{}'. Moving on.", q);
            }
            Err(e) => {
                error!("Crawl of '{}' failed: {}", query, e);
                crawler.quit()?;
                return Err(e.into());
            }
        }

        crawler.go_home()?;
        crawler.quit()?;
        if let Some(p) = progress.as_mut() {
            p.mark_complete(query);
        }
        info!("'{}' took {:.1}s", query, started.elapsed().as_secs_f64());
    }

    if let Some(csv_path) = &args.csv {
        if args.output.exists() {
            result_sink::export_tabular(&args.output, csv_path)?;
        } else {
            warn!("Nothing was saved to {}; skipping CSV export.", args.output.display());
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info });

    match cli.command {
        Command::Crawl(args) => crawl(args),
        Command::Export { source, destination } => {
            let rows = result_sink::export_tabular(&source, &destination)?;
            info!("Exported {} rows to {}", rows, destination.display());
            Ok(())
        }
    }
}
