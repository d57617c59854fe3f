use anyhow::{Context, Result};
use clap::Parser;
use marketsim_core::profiling::{self, TraceLevel};
use marketsim_core::simd::log_simd_capabilities;
use marketsim_core::{
    advance_day, initialize, presimulate, Collaborators, EconomyDefines, EconomyEvent, EconomyMetrics, EventSink,
    KeepBudget, NoTriggers, ProfitAdvisor, SimConfig,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

mod scenario;

#[cfg(feature = "tracy")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of days to simulate after warm-up
    #[arg(short, long)]
    days: Option<u32>,

    /// Warm-up days with construction disabled
    #[arg(long)]
    presim_days: Option<u32>,

    /// Nations in the synthetic world
    #[arg(short, long, default_value_t = 4)]
    nations: usize,

    /// Seed for the synthetic world
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// JSON file overriding economy defines
    #[arg(long)]
    defines: Option<PathBuf>,

    /// JSON file with driver settings (days, presimulation, checksum frequency)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log the world checksum every N days (0 = never)
    #[arg(long)]
    checksum_frequency: Option<u32>,

    /// Write economy events as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Worker threads for the daily pass (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Tracy span level (info, debug, trace); only with the tracy feature
    #[arg(long, default_value = "info")]
    trace_level: String,
}

/// Streams events to a JSON-lines file, keeping the first write error.
struct JsonlSink {
    writer: Option<BufWriter<File>>,
    error: Option<std::io::Error>,
    posted: usize,
}

impl JsonlSink {
    fn new(path: Option<&PathBuf>) -> Result<Self> {
        let writer = match path {
            Some(path) => Some(BufWriter::new(
                File::create(path).with_context(|| format!("creating event log {}", path.display()))?,
            )),
            None => None,
        };
        Ok(Self {
            writer,
            error: None,
            posted: 0,
        })
    }

    fn finish(mut self) -> Result<usize> {
        if let Some(e) = self.error.take() {
            return Err(e).context("writing event log");
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().context("flushing event log")?;
        }
        Ok(self.posted)
    }
}

impl EventSink for JsonlSink {
    fn post(&mut self, event: EconomyEvent) {
        self.posted += 1;
        log::debug!("event: {:?}", event);
        if self.error.is_some() {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let line = serde_json::to_string(&event).map_err(std::io::Error::from);
        if let Err(e) = line.and_then(|line| writeln!(writer, "{line}")) {
            self.error = Some(e);
        }
    }
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(days) = args.days {
        config.days = days;
    }
    if let Some(days) = args.presim_days {
        config.presimulation_days = days;
    }
    if let Some(freq) = args.checksum_frequency {
        config.checksum_frequency = freq;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = std::str::FromStr::from_str(&args.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    let trace_level: TraceLevel = args.trace_level.parse().map_err(anyhow::Error::msg)?;
    profiling::init_tracy(trace_level);

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring worker threads")?;
    }

    log::info!("Starting marketsim...");
    log_simd_capabilities();

    let config = load_config(&args)?;
    let mut defines = match &args.defines {
        Some(path) => EconomyDefines::load(path).with_context(|| format!("loading defines {}", path.display()))?,
        None => EconomyDefines::default(),
    };
    defines.presimulation_days = config.presimulation_days;

    let mut world = scenario::synthetic_world(args.nations, args.seed);
    world.validate().context("synthetic world failed validation")?;
    log::info!(
        "World: {} nations, {} provinces, {} pops, {} factories",
        world.nations.len(),
        world.provinces.len(),
        world.pops.len(),
        world.factories.len()
    );

    initialize(&mut world, &defines);

    let mut sink = JsonlSink::new(args.events.as_ref())?;
    let mut metrics = EconomyMetrics::default();
    let wall = Instant::now();
    {
        let mut collaborators = Collaborators::new(&NoTriggers, &ProfitAdvisor, &mut sink);
        let presim = presimulate(&mut world, &defines, &mut collaborators, &mut KeepBudget);
        log::info!("Warm-up done in {:.2?}", presim.wall_time);

        for _ in 0..config.days {
            let report = advance_day(&mut world, &defines, &mut collaborators, &mut metrics);
            let ymd = world.calendar_date();
            if ymd.day == 1 {
                log::info!(
                    "{}-{:02}: taxes {:.1} | tariffs {:.1} | bankruptcies {} | projects done {} | started {}",
                    ymd.year,
                    ymd.month,
                    report.total_tax_income(),
                    report.total_tariff_income(),
                    report.bankruptcies.len(),
                    report.constructions_completed,
                    report.investments_started
                );
            }
            if config.checksum_frequency > 0 && world.date.0 % config.checksum_frequency == 0 {
                log::info!("Day {} checksum: {:016x}", world.date.0, world.checksum());
            }
        }
    }
    metrics.wall_time = wall.elapsed();
    let events = sink.finish()?;

    for (_, nation) in world.nations.iter() {
        log::debug!(
            "{}: treasury {:.1}, spending {:.2}",
            nation.name,
            nation.treasury(),
            nation.spending_level
        );
    }
    log::info!(
        "Simulated {} days ({:.3} ms/day, {:.1} years/s), {} events",
        metrics.total_days,
        metrics.day_avg_ms(),
        metrics.years_per_second(),
        events
    );
    println!("day {} checksum {:016x}", world.date.0, world.checksum());

    Ok(())
}
