mod sinks;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tripguard_nav::gnss::{NmeaInput, NmeaProvider};
use tripguard_nav::replay::ReplayProvider;
use tripguard_nav::{
    assess_danger, doctor, haversine_m, raise_sos, AlertMode, ClusterStore, Coordinate, DangerThresholds,
    LocationMonitor, LocationProvider, LocationSample, MonitorUpdate, Permission, ProviderError, SosConfig,
    Subscription, WatchOptions,
};
use tripguard_proto::{DangerLevel, EventKind, RouteStatus, TripEvent};

use sinks::{ConsoleAlerter, EventLog};

#[derive(Debug, Parser)]
#[command(name = "tripguard", version, about = "tripguard - trip safety monitor")]
struct Cli {
    /// TOML config; required by doctor, run and sos.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Monitor the trip until the stream ends or Ctrl-C.
    Run {
        #[arg(long, requires = "dest_lon", allow_hyphen_values = true)]
        dest_lat: Option<f64>,
        #[arg(long, requires = "dest_lat", allow_hyphen_values = true)]
        dest_lon: Option<f64>,
    },
    Sos,
    /// Great-circle distance in meters.
    Distance {
        #[arg(allow_hyphen_values = true)]
        lat1: f64,
        #[arg(allow_hyphen_values = true)]
        lon1: f64,
        #[arg(allow_hyphen_values = true)]
        lat2: f64,
        #[arg(allow_hyphen_values = true)]
        lon2: f64,
    },
    /// Classify a deviation distance (m) and optional speed (m/s).
    Assess {
        distance: f64,
        #[arg(long)]
        speed: Option<f64>,
    },
    /// File a trip's encoded polyline into the route clusters and print the match.
    Route {
        #[arg(long, allow_hyphen_values = true)]
        from_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        from_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lon: f64,
        /// JSON cluster store, created on first use.
        #[arg(long, default_value = "route-clusters.json")]
        store: PathBuf,
        polyline: String,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    location: LocationCfg,
    #[serde(default)]
    trip: TripCfg,
    #[serde(default)]
    danger: DangerThresholds,
    #[serde(default)]
    sos: SosConfig,
    #[serde(default)]
    events: EventsCfg,
}

#[derive(Debug, serde::Deserialize)]
struct LocationCfg {
    source: String,
    nmea_device: Option<String>,
    baud: Option<u32>,
    nmea_file: Option<PathBuf>,
    nmea_file_pace_ms: Option<u64>,
    replay_file: Option<PathBuf>,
    replay_pace_ms: Option<u64>,
    interval_ms: Option<u64>,
    distance_filter_m: Option<f64>,
}

impl LocationCfg {
    fn watch_options(&self) -> WatchOptions {
        let d = WatchOptions::default();
        WatchOptions {
            interval: self.interval_ms.map(Duration::from_millis).unwrap_or(d.interval),
            distance_filter_m: self.distance_filter_m.unwrap_or(d.distance_filter_m),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct TripCfg {
    destination: Option<Coordinate>,
    #[serde(default)]
    alert_mode: AlertMode,
}

#[derive(Debug, Default, serde::Deserialize)]
struct EventsCfg {
    jsonl_path: Option<PathBuf>,
}

fn load_config(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

fn required_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.as_deref().context("--config is required for this command")?;
    load_config(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match &cli.cmd {
        Command::Doctor => doctor_cmd(&required_config(&cli)?),
        Command::Run { dest_lat, dest_lon } => {
            let cfg = required_config(&cli)?;
            let dest = match (dest_lat, dest_lon) {
                (Some(lat), Some(lon)) => Coordinate::new(*lat, *lon).context("invalid --dest-lat/--dest-lon")?,
                _ => cfg.trip.destination.context("no destination: set [trip].destination or pass --dest-lat/--dest-lon")?,
            };
            run(&cfg, dest).await
        }
        Command::Sos => sos_cmd(&required_config(&cli)?).await,
        Command::Distance { lat1, lon1, lat2, lon2 } => {
            let a = Coordinate::new(*lat1, *lon1).context("first point")?;
            let b = Coordinate::new(*lat2, *lon2).context("second point")?;
            println!("{:.1} m", haversine_m(a.lat(), a.lon(), b.lat(), b.lon()));
            Ok(())
        }
        Command::Assess { distance, speed } => {
            anyhow::ensure!(distance.is_finite() && *distance >= 0.0, "distance must be a non-negative number");
            let d = assess_danger(*distance, *speed);
            println!("{} {}", d.danger_level, d.reason);
            Ok(())
        }
        Command::Route { from_lat, from_lon, to_lat, to_lon, store, polyline } => {
            let origin = Coordinate::new(*from_lat, *from_lon).context("origin")?;
            let dest = Coordinate::new(*to_lat, *to_lon).context("destination")?;
            route_cmd(store, origin, dest, polyline)
        }
    }
}

fn route_cmd(store_path: &Path, origin: Coordinate, dest: Coordinate, polyline: &str) -> Result<()> {
    let mut store = ClusterStore::load(store_path)?;
    let m = store
        .clusterize(origin, dest, polyline, time::OffsetDateTime::now_utc())
        .context("clusterize route")?;
    store.save(store_path)?;
    if m.status == RouteStatus::Unusual {
        warn!("route: unusual route (cluster {}, {} trip(s))", m.cluster_id, m.trips_count);
    }
    println!("{}", serde_json::to_string(&m)?);
    Ok(())
}

fn doctor_cmd(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    let _ = build_provider(&cfg.location)?;
    doctor::check_watch(&cfg.location.watch_options())?;
    doctor::check_thresholds(&cfg.danger)?;
    doctor::check_sos(&cfg.sos)?;
    if let Err(e) = doctor::check_destination(cfg.trip.destination.as_ref()) {
        // run can still take the destination from the command line
        warn!("doctor: {:#}", e);
    }

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config, dest: Coordinate) -> Result<()> {
    info!("run: starting");

    let mut events = cfg.events.jsonl_path.as_deref().map(EventLog::open).transpose()?;
    let provider = build_provider(&cfg.location)?;

    let mut monitor = LocationMonitor::new(provider, ConsoleAlerter)
        .with_thresholds(cfg.danger)
        .with_alert_mode(cfg.trip.alert_mode)
        .with_watch_options(cfg.location.watch_options());

    monitor.start(dest).await.context("start monitoring")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("run: interrupted");
                monitor.stop();
                break;
            }
            res = monitor.next_update() => {
                let Some(update) = res.context("location stream")? else {
                    info!("run: location stream ended");
                    break;
                };
                report(&update);
                if let Some(log) = events.as_mut() {
                    if let Err(e) = log.write(&trip_event(&update)) {
                        warn!("run: event log write failed: {:#}", e);
                    }
                }
            }
        }
    }

    Ok(())
}

fn report(u: &MonitorUpdate) {
    match &u.deviation {
        Some(d) => info!(
            "run: ({:.5}, {:.5}) {}m {} - {}",
            u.sample.coord.lat(),
            u.sample.coord.lon(),
            d.rounded_m(),
            d.danger_level,
            d.reason
        ),
        None => info!("run: ({:.5}, {:.5})", u.sample.coord.lat(), u.sample.coord.lon()),
    }
}

fn unix_ms(ts: time::OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

fn trip_event(u: &MonitorUpdate) -> TripEvent {
    let d = u.deviation.as_ref();
    let kind = if u.alerted {
        EventKind::Alert
    } else if d.map(|d| d.danger_level == DangerLevel::High).unwrap_or(false) {
        EventKind::Deviation
    } else {
        EventKind::Location
    };
    TripEvent {
        ts_unix_ms: unix_ms(u.sample.ts),
        kind,
        lat: u.sample.coord.lat(),
        lon: u.sample.coord.lon(),
        speed_mps: u.sample.speed(),
        distance_m: d.map(|d| d.distance_m),
        danger_level: d.map(|d| d.danger_level),
        msg: d.map(|d| d.reason.clone()).unwrap_or_default(),
    }
}

async fn sos_cmd(cfg: &Config) -> Result<()> {
    let mut provider = build_provider(&cfg.location)?;
    let mut alerter = ConsoleAlerter;
    let at = raise_sos(&mut provider, &mut alerter, &cfg.sos).await.context("sos")?;

    if let Some(path) = cfg.events.jsonl_path.as_deref() {
        EventLog::open(path)?.write(&TripEvent {
            ts_unix_ms: unix_ms(time::OffsetDateTime::now_utc()),
            kind: EventKind::Sos,
            lat: at.lat(),
            lon: at.lon(),
            speed_mps: None,
            distance_m: None,
            danger_level: None,
            msg: format!("sos sent to {} contact(s)", cfg.sos.contacts.len()),
        })?;
    }
    Ok(())
}

fn build_provider(loc: &LocationCfg) -> Result<AnyProvider> {
    Ok(match loc.source.as_str() {
        "nmea-serial" => AnyProvider::Nmea(NmeaProvider::new(NmeaInput::Serial {
            dev: loc.nmea_device.clone().context("location.nmea_device missing")?,
            baud: loc.baud.unwrap_or(115_200),
        })),
        "nmea-file" => AnyProvider::Nmea(NmeaProvider::new(NmeaInput::File {
            path: loc.nmea_file.clone().context("location.nmea_file missing")?,
            pace: Duration::from_millis(loc.nmea_file_pace_ms.unwrap_or(1000)),
        })),
        "replay" => {
            let path = loc.replay_file.as_deref().context("location.replay_file missing")?;
            let pace = Duration::from_millis(loc.replay_pace_ms.unwrap_or(1000));
            AnyProvider::Replay(ReplayProvider::from_jsonl(path, pace)?)
        }
        other => anyhow::bail!("unknown location.source: {}", other),
    })
}

enum AnyProvider {
    Nmea(NmeaProvider),
    Replay(ReplayProvider),
}

impl LocationProvider for AnyProvider {
    async fn request_permission(&mut self) -> Result<Permission, ProviderError> {
        match self {
            AnyProvider::Nmea(p) => p.request_permission().await,
            AnyProvider::Replay(p) => p.request_permission().await,
        }
    }

    async fn current_position(&mut self) -> Result<LocationSample, ProviderError> {
        match self {
            AnyProvider::Nmea(p) => p.current_position().await,
            AnyProvider::Replay(p) => p.current_position().await,
        }
    }

    async fn watch_position(&mut self, opts: WatchOptions) -> Result<Subscription, ProviderError> {
        match self {
            AnyProvider::Nmea(p) => p.watch_position(opts).await,
            AnyProvider::Replay(p) => p.watch_position(opts).await,
        }
    }
}
