/// Report formats written by the scanner.
///
/// Two renditions of the same pass report:
/// - the text line `Frequency: <int>, Power: <float>`, one per reported
///   candidate. Wrappers parse this from stdout, so its shape is fixed.
/// - newline-delimited JSON (NDJSON) messages for machine consumers,
///   serialized with `serde_json_core` into fixed-size `heapless` buffers.
use core::fmt;

use heapless::Vec;
use serde::Serialize;

use crate::filter::Candidate;

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

// ── Text report line ───────────────────────────────────────────────────

/// One reported frequency. `Display` renders the text report line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyPower {
    pub frequency: i64,
    pub power: f64,
}

impl From<Candidate> for FrequencyPower {
    fn from(c: Candidate) -> Self {
        Self {
            frequency: c.frequency,
            power: c.power,
        }
    }
}

impl fmt::Display for FrequencyPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frequency: {}, Power: {:.2}", self.frequency, self.power)
    }
}

/// Parse a text report line, as a process reading the scanner's stdout
/// or log would.
///
/// This is the inverse of the [`FrequencyPower`] display and pins the line
/// format. Anything before `Frequency:` (a log prefix, say) is skipped.
/// Returns `None` for lines that are not reports.
pub fn parse_report_line(line: &str) -> Option<FrequencyPower> {
    let start = line.find("Frequency:")?;
    let (freq_part, power_part) = line[start..].split_once(',')?;
    let frequency = freq_part.split_once(':')?.1.trim().parse().ok()?;
    let power = power_part
        .trim()
        .strip_prefix("Power:")?
        .trim()
        .parse()
        .ok()?;
    Some(FrequencyPower { frequency, power })
}

// ── NDJSON messages ────────────────────────────────────────────────────

/// Messages emitted in `--json` mode.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ReportMessage {
    /// Scanner configuration summary, sent once at startup
    #[serde(rename = "status")]
    Status {
        version: &'static str,
        ranges: usize,
        bandwidth: i64,
        /// Fixed noise level, or null for auto
        noise_level: Option<f64>,
    },
    /// A reported candidate of a finished pass
    #[serde(rename = "candidate")]
    Candidate { pass: u64, frequency: i64, power: f64 },
    /// A sub-band whose best signal cleared the noise floor
    #[serde(rename = "trigger")]
    Trigger {
        pass: u64,
        frequency: i64,
        power: f64,
        noise_level: f64,
    },
    /// End-of-pass summary
    #[serde(rename = "pass")]
    Pass {
        pass: u64,
        sub_bands: usize,
        triggered: usize,
        reported: usize,
    },
}

/// Serialize a message as one NDJSON line into `buf`.
/// Returns the number of bytes written including the trailing newline, or
/// `None` if the message does not fit.
pub fn serialize_message(msg: &ReportMessage, buf: &mut [u8]) -> Option<usize> {
    let len = serde_json_core::to_slice(msg, buf).ok()?;
    let newline = buf.get_mut(len)?;
    *newline = b'\n';
    Some(len + 1)
}

/// Serialize a message into an owned NDJSON buffer.
pub fn to_ndjson(msg: &ReportMessage) -> Option<MsgBuffer> {
    let mut buf = [0u8; MAX_MSG_LEN];
    let len = serialize_message(msg, &mut buf)?;
    MsgBuffer::from_slice(&buf[..len]).ok()
}
