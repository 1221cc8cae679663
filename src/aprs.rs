use crate::wx::WxReport;
use chrono::{Datelike, Timelike};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub const APRS_IS_ADDR: &str = "rotate.aprs.net:14580";
const DESTINATION: &str = "APRS";
// Single fixed hop, marked as already repeated.
const PATH: &str = "TCPIP*";
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AprsError {
    #[error("relay i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("relay rejected login: {0}")]
    LoginRejected(String),
    #[error("relay exchange timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct Address {
    pub call: String,
    pub ssid: u8,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid == 0 {
            write!(f, "{}", self.call)
        } else {
            write!(f, "{}-{}", self.call, self.ssid)
        }
    }
}

/// TNC2-format frame as sent over APRS-IS.
#[derive(Debug, Clone)]
pub struct Frame {
    pub source: Address,
    pub text: String,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{},{}:{}", self.source, DESTINATION, PATH, self.text)
    }
}

/// APRS-IS passcode for a callsign. The SSID suffix and letter case do not
/// participate in the hash.
pub fn passcode(callsign: &str) -> u16 {
    let base = match callsign.split_once('-') {
        Some((base, _)) => base,
        None => callsign,
    };
    let base = base.to_ascii_uppercase();
    let mut hash: u16 = 0x73e2;
    for pair in base.as_bytes().chunks(2) {
        hash ^= u16::from(pair[0]) << 8;
        if let Some(low) = pair.get(1) {
            hash ^= u16::from(*low);
        }
    }
    hash & 0x7fff
}

/// Renders a complete weather report: zulu timestamp, position, then the
/// wind/temperature block with `...` placeholders for unset values,
/// followed by humidity and luminosity when present and the station
/// comment.
pub fn weather_report(wx: &WxReport) -> String {
    let mut out = String::new();
    match wx.time {
        Some(time) => out.push_str(&format!(
            "@{:02}{:02}{:02}z",
            time.day(),
            time.hour(),
            time.minute()
        )),
        None => out.push('!'),
    }
    out.push_str(&format_latitude(wx.lat));
    out.push('/');
    out.push_str(&format_longitude(wx.lon));
    out.push('_');
    out.push_str(&coded(wx.wind_dir_deg));
    out.push('/');
    out.push_str(&coded(wx.wind_speed_mph));
    out.push('g');
    out.push_str(&coded(wx.wind_gust_mph));
    out.push('t');
    match wx.temperature_f {
        Some(temp) => out.push_str(&format!("{:03}", temp.clamp(-99, 999))),
        None => out.push_str("..."),
    }
    if let Some(humidity) = wx.humidity_pct {
        // h00 encodes 100%.
        out.push_str(&format!("h{:02}", humidity.clamp(0, 100) % 100));
    }
    if let Some(solar) = wx.solar_rad_wm2 {
        let solar = solar.clamp(0, 1999);
        if solar >= 1000 {
            out.push_str(&format!("l{:03}", solar - 1000));
        } else {
            out.push_str(&format!("L{:03}", solar));
        }
    }
    out.push_str(&wx.comment);
    out
}

fn coded(value: Option<i32>) -> String {
    match value {
        Some(v) => format!("{:03}", v.clamp(0, 999)),
        None => "...".to_string(),
    }
}

fn format_latitude(lat: f64) -> String {
    let hemisphere = if lat < 0.0 { 'S' } else { 'N' };
    let lat = lat.abs();
    let degrees = lat.trunc() as u32;
    let minutes = (lat - lat.trunc()) * 60.0;
    format!("{degrees:02}{minutes:05.2}{hemisphere}")
}

fn format_longitude(lon: f64) -> String {
    let hemisphere = if lon < 0.0 { 'W' } else { 'E' };
    let lon = lon.abs();
    let degrees = lon.trunc() as u32;
    let minutes = (lon - lon.trunc()) * 60.0;
    format!("{degrees:03}{minutes:05.2}{hemisphere}")
}

/// Sends one frame to the relay: connect, read the server banner, log in
/// with the computed passcode, then write the frame and drop the
/// connection.
pub async fn send_is(frame: &Frame) -> Result<(), AprsError> {
    tokio::time::timeout(EXCHANGE_TIMEOUT, exchange(frame))
        .await
        .map_err(|_| AprsError::Timeout)?
}

async fn exchange(frame: &Frame) -> Result<(), AprsError> {
    let stream = TcpStream::connect(APRS_IS_ADDR).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half);

    let mut banner = String::new();
    lines.read_line(&mut banner).await?;
    tracing::debug!(banner = banner.trim(), "connected to APRS-IS");

    let login = format!(
        "user {} pass {} vers {} {}\r\n",
        frame.source,
        passcode(&frame.source.call),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    write_half.write_all(login.as_bytes()).await?;

    let mut logresp = String::new();
    lines.read_line(&mut logresp).await?;
    if logresp.contains("unverified") {
        return Err(AprsError::LoginRejected(logresp.trim().to_string()));
    }

    write_half
        .write_all(format!("{frame}\r\n").as_bytes())
        .await?;
    write_half.flush().await?;
    Ok(())
}
