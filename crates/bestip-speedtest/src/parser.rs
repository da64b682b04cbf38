//! CSV result parser
//!
//! Two layouts are accepted:
//!
//! ```text
//! IP 地址,已发送,已接收,丢包率,平均延迟,下载速度(MB/s),地区码
//! 104.17.110.237,4,4,0.00,31.60,18.75,HKG
//!
//! IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)
//! 1.1.1.1,443,LAX,US-West,Los Angeles,5.2,15.5
//! ```
//!
//! The first layout is what the tool writes; it has no port column, so the
//! port the measurement ran against is filled in. A header mentioning `Port`
//! selects the second layout. A file whose first row is already data is read
//! in the tool layout.

use bestip_core::traits::ResultParser;
use bestip_core::{Error, MeasurementRecord, Result, ResultSet};

use std::net::IpAddr;
use std::path::Path;

/// Column layout of a result file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// ip, sent, received, loss, latency, speed, region
    Tool,
    /// ip, port, data center, region, city, speed, latency
    Labeled,
}

impl Layout {
    fn min_columns(self) -> usize {
        match self {
            Layout::Tool => 6,
            Layout::Labeled => 7,
        }
    }
}

/// Reads the speed-test CSV artifact
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvResultParser;

impl CsvResultParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }

    /// Parse CSV text
    ///
    /// # Errors
    ///
    /// `Error::Parse` for empty content or a header without data rows.
    pub fn parse_str(&self, content: &str, default_port: u16) -> Result<ResultSet> {
        let content = content.trim_start_matches('\u{feff}');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut rows = Vec::new();
        for (index, row) in reader.records().enumerate() {
            match row {
                Ok(row) => rows.push((index + 1, row)),
                Err(e) => tracing::warn!("Skipping unreadable result line {}: {}", index + 1, e),
            }
        }
        rows.retain(|(_, row)| row.iter().any(|field| !field.is_empty()));

        let Some((_, first)) = rows.first() else {
            return Err(Error::parse("results file is empty"));
        };

        let first_is_data = first.get(0).is_some_and(is_ip_or_cidr);
        let (layout, data) = if first_is_data {
            (Layout::Tool, &rows[..])
        } else {
            let labeled = first.iter().any(|field| field.contains("Port"));
            let layout = if labeled { Layout::Labeled } else { Layout::Tool };
            (layout, &rows[1..])
        };

        if data.is_empty() {
            return Err(Error::parse("results file has a header but no data rows"));
        }

        tracing::debug!("Reading {} result row(s) in {:?} layout", data.len(), layout);

        let records: ResultSet = data
            .iter()
            .filter_map(|(line, row)| match parse_row(row, layout, default_port) {
                Ok(record) => Some(record),
                Err(reason) => {
                    tracing::warn!("Skipping result line {}: {}", line, reason);
                    None
                }
            })
            .collect();

        Ok(records)
    }
}

#[async_trait::async_trait]
impl ResultParser for CsvResultParser {
    async fn parse(&self, path: &Path, default_port: u16) -> Result<ResultSet> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::parse(format!(
                    "results file not found: {}",
                    path.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(Error::parse(format!(
                    "results file {} is not valid UTF-8",
                    path.display()
                )));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        self.parse_str(&content, default_port)
            .map_err(|e| match e {
                Error::Parse(message) => Error::parse(format!("{}: {}", path.display(), message)),
                other => other,
            })
    }
}

fn parse_row(
    row: &csv::StringRecord,
    layout: Layout,
    default_port: u16,
) -> std::result::Result<MeasurementRecord, String> {
    if row.len() < layout.min_columns() {
        return Err(format!(
            "expected at least {} columns, found {}",
            layout.min_columns(),
            row.len()
        ));
    }

    let field = |i: usize| row.get(i).unwrap_or("");

    let endpoint = field(0);
    if !is_ip_or_cidr(endpoint) {
        return Err(format!("invalid IP '{}'", endpoint));
    }

    match layout {
        Layout::Tool => Ok(MeasurementRecord::new(
            endpoint,
            default_port,
            field(6),
            number(field(5), "speed")?,
            number(field(4), "latency")?,
        )),
        Layout::Labeled => Ok(MeasurementRecord::new(
            endpoint,
            port(field(1), default_port)?,
            field(2),
            number(field(5), "speed")?,
            number(field(6), "latency")?,
        )),
    }
}

/// Non-negative number; empty and `N/A` read as 0
fn number(raw: &str, what: &str) -> std::result::Result<f64, String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") {
        return Ok(0.0);
    }
    match raw.parse::<f64>() {
        // Adding 0.0 turns -0.0 into 0.0 so zero speeds tie in ranking
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value + 0.0),
        _ => Err(format!("invalid {} '{}'", what, raw)),
    }
}

fn port(raw: &str, default_port: u16) -> std::result::Result<u16, String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") {
        return Ok(default_port);
    }
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(format!("invalid port '{}'", raw)),
    }
}

/// Whether `value` is an IP address or CIDR block
pub fn is_ip_or_cidr(value: &str) -> bool {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };
    let Ok(ip) = addr.parse::<IpAddr>() else {
        return false;
    };
    match prefix {
        None => true,
        Some(prefix) => {
            let max = if ip.is_ipv4() { 32 } else { 128 };
            prefix.parse::<u8>().is_ok_and(|p| p <= max)
        }
    }
}
