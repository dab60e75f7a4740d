use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use procwatch::analysis::{self, DEFAULT_MAX_POINTS, Report};
use procwatch::collectors::create_collector;
use procwatch::config::ConfigStore;
use procwatch::controller::{Monitor, MonitorState, SessionSettings};
use procwatch::model::format_timestamp;
use procwatch::store::{MetricsStore, discover_stores};

const LOG_ENV: &str = "PROCWATCH_LOG";

#[derive(Parser, Debug)]
#[command(name = "procwatch")]
#[command(version, about = "Record and inspect per-process performance samples")]
struct Cli {
    /// Configuration file (defaults to ./config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a session for the watched processes until interrupted.
    Record(RecordArgs),
    /// Show or edit the watch-list.
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
    /// List live process names.
    Ps {
        /// Keep refreshing and print additions and removals.
        #[arg(long)]
        follow: bool,
    },
    /// List session stores in a directory (defaults to the output directory).
    Sessions { dir: Option<PathBuf> },
    /// Show the names, pids and time range recorded in a store.
    Inspect { store: PathBuf },
    /// Summary statistics and chart series for one pid.
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Stop after this many ticks.
    #[arg(long)]
    ticks: Option<u64>,
    /// Seconds between ticks; saved to the configuration.
    #[arg(long)]
    interval: Option<u64>,
    /// Output directory; saved to the configuration.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Add a process name to the watch-list before starting.
    #[arg(long = "watch", value_name = "NAME")]
    watch: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum WatchAction {
    List,
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ReportArgs {
    store: PathBuf,
    #[arg(long)]
    pid: u32,
    #[arg(long, default_value_t = DEFAULT_MAX_POINTS)]
    max_points: usize,
    /// Print the process series as CSV instead of JSON.
    #[arg(long)]
    csv: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    match cli.command {
        Command::Record(args) => record(cli.config.as_deref(), args),
        Command::Watch { action } => watch(cli.config.as_deref(), action),
        Command::Ps { follow } => ps(follow),
        Command::Sessions { dir } => sessions(cli.config.as_deref(), dir),
        Command::Inspect { store } => inspect(&store),
        Command::Report(args) => report(args),
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file = path
        .file_name()
        .with_context(|| format!("log file path {} has no file name", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

/// Flag raised by SIGINT or SIGTERM.
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))
        .context("cannot install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))
        .context("cannot install SIGTERM handler")?;
    Ok(flag)
}

fn record(config_path: Option<&Path>, args: RecordArgs) -> Result<()> {
    let mut config = ConfigStore::load(config_path).context("cannot load configuration")?;
    if let Some(secs) = args.interval {
        config.set_record_interval(secs);
    }
    if let Some(dir) = &args.output {
        config.set_output_dir(&dir.to_string_lossy());
    }
    if !args.watch.is_empty() {
        let mut list = config.monitored_processes();
        for name in &args.watch {
            list.add(name);
        }
        config.set_monitored_processes(&list);
    }
    config.save().context("cannot save configuration")?;

    let mut settings = SessionSettings::from_config(&config);
    settings.max_ticks = args.ticks;
    settings.validate()?;

    let collector = create_collector()?;
    let mut monitor = Monitor::new(collector);
    let interrupted = interrupt_flag()?;
    let session = monitor.start(&settings)?;
    println!(
        "recording {} every {}s into {}",
        settings.watch.to_vec().join(", "),
        settings.interval_secs,
        settings.output_dir.join(&session).display()
    );

    let mut last_report = Instant::now();
    while !interrupted.load(Ordering::Relaxed) {
        if monitor.poll() == &MonitorState::Idle {
            info!(session = %session, "tick limit reached");
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            if let (Some(at), Some(ago)) = (monitor.last_tick(), monitor.seconds_since_last_tick()) {
                eprint!("\rlatest record: {} ({}s ago)   ", format_timestamp(&at), ago);
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
    eprintln!();
    monitor.stop();
    println!("session saved: {}", settings.output_dir.join(&session).display());
    Ok(())
}

fn watch(config_path: Option<&Path>, action: WatchAction) -> Result<()> {
    let mut config = ConfigStore::load(config_path).context("cannot load configuration")?;
    let mut list = config.monitored_processes();
    match action {
        WatchAction::List => {
            for name in list.iter() {
                println!("{name}");
            }
            return Ok(());
        }
        WatchAction::Add { names } => {
            for name in &names {
                if !list.add(name) {
                    warn!(name = %name, "blank or already watched, skipped");
                }
            }
        }
        WatchAction::Remove { names } => {
            for name in &names {
                if !list.remove(name) {
                    warn!(name = %name, "not on the watch-list");
                }
            }
        }
    }
    config.set_monitored_processes(&list);
    config.save().context("cannot save configuration")?;
    for name in list.iter() {
        println!("{name}");
    }
    Ok(())
}

fn ps(follow: bool) -> Result<()> {
    let mut monitor = Monitor::new(create_collector()?);
    let Some(first) = monitor.refresh_process_list() else {
        bail!("process list is unavailable");
    };
    if !follow {
        for name in &first.added {
            println!("{name}");
        }
        return Ok(());
    }
    for name in &first.added {
        println!("+{name}");
    }

    let interrupted = interrupt_flag()?;
    while !interrupted.load(Ordering::Relaxed) {
        if let Some(diff) = monitor.refresh_if_due(Instant::now()) {
            for name in &diff.added {
                println!("+{name}");
            }
            for name in &diff.removed {
                println!("-{name}");
            }
        }
        thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}

fn sessions(config_path: Option<&Path>, dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => PathBuf::from(ConfigStore::load(config_path)?.output_dir()),
    };
    let stores = discover_stores(&dir)
        .with_context(|| format!("cannot list session stores in {}", dir.display()))?;
    if stores.is_empty() {
        println!("no sessions in {}", dir.display());
    }
    for path in stores {
        println!("{}", path.display());
    }
    Ok(())
}

fn open_existing(path: &Path) -> Result<MetricsStore> {
    if !path.is_file() {
        bail!("session store {} does not exist", path.display());
    }
    MetricsStore::open(path).with_context(|| format!("cannot open {}", path.display()))
}

fn inspect(path: &Path) -> Result<()> {
    let store = open_existing(path)?;
    match store.time_range()? {
        (Some(first), Some(last)) => {
            println!("{} .. {}", format_timestamp(&first), format_timestamp(&last))
        }
        _ => println!("no process samples"),
    }
    for (name, pids) in store.catalog()? {
        let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
        println!("{name}: {}", pids.join(", "));
    }
    Ok(())
}

fn report(args: ReportArgs) -> Result<()> {
    let store = open_existing(&args.store)?;
    let report = analysis::build_report(&store, args.pid, args.max_points)?;
    if report.summary.samples == 0 {
        bail!("no samples for pid {} in {}", args.pid, args.store.display());
    }
    if args.csv {
        print_csv(&report);
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn print_csv(report: &Report) {
    let p = &report.process;
    println!("seconds,cpu_percent,memory_mb,threads,handles,io_read_mb,io_write_mb");
    for i in 0..p.len() {
        println!(
            "{:.0},{:.2},{:.2},{},{},{:.3},{:.3}",
            p.x[i], p.cpu_percent[i], p.memory_mb[i], p.threads[i], p.handles[i], p.io_read_mb[i], p.io_write_mb[i]
        );
    }
}
