use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::geo::Coordinate;
use crate::provider::{LocationProvider, LocationSample, Permission, ProviderError, Subscription, WatchOptions};

const KNOTS_TO_MPS: f64 = 0.514_444;
/// Nominal user-equivalent range error used to turn HDOP into meters.
const UERE_M: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub enum NmeaInput {
    Serial { dev: String, baud: u32 },
    /// Recorded log, replayed one fix per `pace` and then followed for appends.
    File { path: PathBuf, pace: Duration },
}

enum Reader {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
}

pub struct NmeaSource {
    reader: Reader,
    parser: NmeaParser,
    pace: Option<Duration>,
    last_fix: Option<Instant>,
}

impl NmeaSource {
    pub fn open(input: &NmeaInput) -> Result<Self> {
        let (reader, pace) = match input {
            NmeaInput::Serial { dev, baud } => {
                let port = tokio_serial::new(dev, *baud)
                    .open_native_async()
                    .with_context(|| format!("open serial {}", dev))?;
                (Reader::Serial(BufReader::new(port)), None)
            }
            NmeaInput::File { path, pace } => {
                let f = std::fs::File::open(path)
                    .with_context(|| format!("open nmea file {}", path.display()))?;
                (Reader::File(BufReader::new(File::from_std(f))), Some(*pace))
            }
        };
        Ok(Self { reader, parser: NmeaParser::default(), pace, last_fix: None })
    }

    pub async fn next_fix(&mut self) -> Result<LocationSample> {
        let mut line = String::new();
        loop {
            line.clear();
            match &mut self.reader {
                Reader::Serial(r) => {
                    let n = r.read_line(&mut line).await.context("read serial")?;
                    anyhow::ensure!(n > 0, "serial device closed");
                }
                Reader::File(r) => {
                    let n = r.read_line(&mut line).await.context("read nmea file")?;
                    if n == 0 {
                        // EOF: follow the file
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                }
            }
            if let Some(fix) = self.parser.feed(line.trim(), OffsetDateTime::now_utc()) {
                // a recorded log is read far faster than it was written
                if let (Some(pace), Some(last)) = (self.pace, self.last_fix) {
                    tokio::time::sleep_until(last + pace).await;
                }
                self.last_fix = Some(Instant::now());
                return Ok(fix);
            }
        }
    }
}

/// Minimal NMEA 0183 parsing:
/// - GGA: satellites + hdop
/// - RMC: status, lat/lon, speed over ground
#[derive(Debug, Default)]
pub struct NmeaParser {
    last_gga: Option<(u8, f32)>,
}

impl NmeaParser {
    pub fn feed(&mut self, s: &str, now: OffsetDateTime) -> Option<LocationSample> {
        let parts: Vec<&str> = s.split('*').next().unwrap_or("").split(',').collect();
        let talker = parts.first().copied().unwrap_or("");

        if talker.len() == 6 && talker.starts_with('$') && talker.ends_with("GGA") {
            if parts.len() > 8 {
                let sats: u8 = parts[7].parse().unwrap_or(0);
                let hdop: f32 = parts[8].parse().unwrap_or(99.9);
                self.last_gga = Some((sats, hdop));
            }
            return None;
        }

        if talker.len() == 6 && talker.starts_with('$') && talker.ends_with("RMC") {
            if parts.len() <= 7 {
                return None;
            }
            if parts[2] != "A" {
                debug!("nmea: void RMC skipped");
                return None;
            }
            let lat = parse_deg_min(parts[3], parts[4])?;
            let lon = parse_deg_min(parts[5], parts[6])?;
            let coord = match Coordinate::new(lat, lon) {
                Ok(c) => c,
                Err(e) => {
                    warn!("nmea: rejected fix: {}", e);
                    return None;
                }
            };
            let speed = parts[7].parse::<f64>().ok().map(|kn| kn * KNOTS_TO_MPS);
            let accuracy = self.last_gga.map(|(_, hdop)| hdop as f64 * UERE_M);
            return Some(LocationSample::new(coord, speed, now).with_accuracy(accuracy));
        }

        None
    }

    pub fn satellites(&self) -> Option<u8> {
        self.last_gga.map(|(sats, _)| sats)
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.').unwrap_or(v.len());
    if dot < 4 {
        return None;
    }
    let deg_len = dot - 2;
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let mut out = deg + (min / 60.0);
    match hemi {
        "S" | "W" => out = -out,
        "N" | "E" => {}
        _ => return None,
    }
    Some(out)
}

/// Location provider backed by an NMEA receiver or a recorded NMEA log.
/// The source is opened once and reused until a watch takes it over.
pub struct NmeaProvider {
    input: NmeaInput,
    source: Option<NmeaSource>,
}

impl NmeaProvider {
    pub fn new(input: NmeaInput) -> Self {
        Self { input, source: None }
    }

    fn source(&mut self) -> Result<&mut NmeaSource, ProviderError> {
        let src = match self.source.take() {
            Some(src) => src,
            None => NmeaSource::open(&self.input).map_err(|e| ProviderError::unavailable(&e))?,
        };
        Ok(self.source.insert(src))
    }
}

fn is_permission_denied(e: &anyhow::Error) -> bool {
    e.chain().any(|c| {
        c.downcast_ref::<std::io::Error>().map(|io| io.kind() == ErrorKind::PermissionDenied).unwrap_or(false)
            || c.downcast_ref::<tokio_serial::Error>()
                .map(|se| matches!(se.kind, tokio_serial::ErrorKind::Io(ErrorKind::PermissionDenied)))
                .unwrap_or(false)
    })
}

impl LocationProvider for NmeaProvider {
    async fn request_permission(&mut self) -> Result<Permission, ProviderError> {
        if self.source.is_some() {
            return Ok(Permission::Granted);
        }
        match NmeaSource::open(&self.input) {
            Ok(src) => {
                self.source = Some(src);
                Ok(Permission::Granted)
            }
            Err(e) if is_permission_denied(&e) => Ok(Permission::Denied),
            Err(e) => Err(ProviderError::unavailable(&e)),
        }
    }

    async fn current_position(&mut self) -> Result<LocationSample, ProviderError> {
        self.source()?.next_fix().await.map_err(|e| ProviderError::stream(&e))
    }

    async fn watch_position(&mut self, opts: WatchOptions) -> Result<Subscription, ProviderError> {
        let mut src = match self.source.take() {
            Some(src) => src,
            None => NmeaSource::open(&self.input).map_err(|e| ProviderError::unavailable(&e))?,
        };
        info!("gnss: watching {:?}", self.input);
        Ok(Subscription::spawn(opts, move |mut tx| async move {
            loop {
                match src.next_fix().await {
                    Ok(fix) => {
                        if !tx.send(fix) {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("gnss: stream ended: {:#}", e);
                        tx.fail(ProviderError::stream(&e));
                        break;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn rmc_yields_position_and_speed() {
        let mut p = NmeaParser::default();
        let fix = p.feed(RMC, OffsetDateTime::UNIX_EPOCH).unwrap();
        assert!((fix.coord.lat() - 48.1173).abs() < 1e-4);
        assert!((fix.coord.lon() - 11.516_666).abs() < 1e-4);
        assert!((fix.speed().unwrap() - 22.4 * KNOTS_TO_MPS).abs() < 1e-9);
        assert_eq!(fix.accuracy_m, None);
    }

    #[test]
    fn gga_feeds_accuracy() {
        let mut p = NmeaParser::default();
        assert!(p.feed(GGA, OffsetDateTime::UNIX_EPOCH).is_none());
        assert_eq!(p.satellites(), Some(8));
        let fix = p.feed(RMC, OffsetDateTime::UNIX_EPOCH).unwrap();
        assert!((fix.accuracy_m.unwrap() - 4.5).abs() < 1e-6);
    }

    #[test]
    fn void_and_empty_fixes_are_skipped() {
        let mut p = NmeaParser::default();
        let void = "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        assert!(p.feed(void, OffsetDateTime::UNIX_EPOCH).is_none());
        let empty = "$GNRMC,123519,A,,,,,,,230394,,*00";
        assert!(p.feed(empty, OffsetDateTime::UNIX_EPOCH).is_none());
        assert!(p.feed("$GPGSV,3,1,11*75", OffsetDateTime::UNIX_EPOCH).is_none());
    }

    #[test]
    fn southern_and_western_hemispheres_are_negative() {
        assert!((parse_deg_min("3352.128", "S").unwrap() + 33.8688).abs() < 1e-4);
        assert!((parse_deg_min("07400.360", "W").unwrap() + 74.006).abs() < 1e-4);
        assert!(parse_deg_min("3352.128", "X").is_none());
        assert!(parse_deg_min("12", "N").is_none());
    }

    #[test]
    fn out_of_range_fix_is_rejected() {
        let mut p = NmeaParser::default();
        let rmc = "$GPRMC,123519,A,9130.000,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        assert!(p.feed(rmc, OffsetDateTime::UNIX_EPOCH).is_none());
        // parser keeps going after a rejected line
        assert!(p.feed(RMC, OffsetDateTime::UNIX_EPOCH).is_some());
    }

    #[test]
    fn missing_speed_is_none() {
        let mut p = NmeaParser::default();
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,,084.4,230394,003.1,W*6A";
        assert_eq!(p.feed(rmc, OffsetDateTime::UNIX_EPOCH).unwrap().speed(), None);
    }

    fn rmc_at(lat: &str) -> String {
        format!("$GPRMC,123519,A,{},N,01131.000,E,022.4,084.4,230394,003.1,W*6A", lat)
    }

    fn nmea_file(lines: &[String]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{}", l).unwrap();
        }
        f.flush().unwrap();
        f
    }

    fn file_input(f: &tempfile::NamedTempFile) -> NmeaInput {
        NmeaInput::File { path: f.path().to_path_buf(), pace: Duration::from_secs(1) }
    }

    #[tokio::test]
    async fn file_provider_reads_first_fix() {
        let f = nmea_file(&[GGA.to_string(), RMC.to_string()]);

        let mut provider = NmeaProvider::new(file_input(&f));
        assert_eq!(provider.request_permission().await.unwrap(), Permission::Granted);
        let fix = provider.current_position().await.unwrap();
        assert!((fix.coord.lat() - 48.1173).abs() < 1e-4);
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_fixes_are_paced_through_the_throttle() {
        // ~1.8 km apart
        let f = nmea_file(&[rmc_at("4807.038"), rmc_at("4808.038"), rmc_at("4809.038")]);

        let mut provider = NmeaProvider::new(file_input(&f));
        let mut sub = provider.watch_position(WatchOptions::default()).await.unwrap();
        let mut lats = Vec::new();
        for _ in 0..3 {
            let fix = tokio::time::timeout(Duration::from_secs(10), sub.next())
                .await
                .expect("fix delivered")
                .unwrap()
                .unwrap();
            lats.push(fix.coord.lat());
        }
        assert!(lats.windows(2).all(|w| w[1] > w[0]));
        assert!((lats[2] - 48.150_633).abs() < 1e-4);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_continues_from_the_opened_source() {
        let f = nmea_file(&[rmc_at("4807.038"), rmc_at("4808.038")]);

        let mut provider = NmeaProvider::new(file_input(&f));
        assert_eq!(provider.request_permission().await.unwrap(), Permission::Granted);
        let first = provider.current_position().await.unwrap();
        let mut sub = provider.watch_position(WatchOptions::default()).await.unwrap();
        let next = sub.next().await.unwrap().unwrap();
        assert!((first.coord.lat() - 48.1173).abs() < 1e-4);
        assert!(next.coord.lat() > first.coord.lat());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let mut provider = NmeaProvider::new(NmeaInput::File {
            path: "/nonexistent/track.nmea".into(),
            pace: Duration::from_secs(1),
        });
        let err = provider.request_permission().await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
