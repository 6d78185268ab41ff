use derive_more::Display;
use serde::Serialize;
use tracing::warn;

const CGNSINF_MARKER: &str = "+CGNSINF:";

/// Minimum number of comma separated fields after the marker that carry all
/// positional values we read (run status up to speed).
const MIN_FIELDS: usize = 7;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixStatus {
    #[display("fix")]
    HasFix,
    #[display("no fix")]
    NoFix,
    #[display("unknown")]
    Unknown,
}

/// A single GNSS reading as reported by `AT+CGNSINF`.
///
/// Values are kept as the exact tokens the modem emitted. Empty tokens are
/// mapped to `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub fix_status: FixStatus,
    /// UTC in `yyyyMMddhhmmss.sss`
    pub timestamp: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    /// meters
    pub altitude: Option<String>,
    /// km/h
    pub speed: Option<String>,
    /// The complete response the fix was parsed from.
    pub raw: String,
}

impl GpsFix {
    fn unset(raw: &str) -> Self {
        Self {
            fix_status: FixStatus::Unknown,
            timestamp: None,
            latitude: None,
            longitude: None,
            altitude: None,
            speed: None,
            raw: raw.to_owned(),
        }
    }

    pub fn has_fix(&self) -> bool {
        self.fix_status == FixStatus::HasFix
    }

    /// Latitude and longitude in decimal degrees, only when the modem reports a fix.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        if !self.has_fix() {
            return None;
        }

        let lat = self.latitude.as_deref()?.parse().ok()?;
        let lon = self.longitude.as_deref()?.parse().ok()?;

        Some((lat, lon))
    }
}

impl std::fmt::Display for GpsFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());

        write!(
            f,
            "GPS {}, timestamp: {}, latitude: {}, longitude: {}, altitude: {} m, speed: {} km/h",
            self.fix_status,
            or_dash(&self.timestamp),
            or_dash(&self.latitude),
            or_dash(&self.longitude),
            or_dash(&self.altitude),
            or_dash(&self.speed),
        )
    }
}

/// Parses the response of `AT+CGNSINF`.
///
/// Field positions after the marker: 0 run status, 1 fix status, 2 UTC,
/// 3 latitude, 4 longitude, 5 altitude, 6 speed. Anything that does not
/// match this shape yields a fix with every field unset and `raw` kept.
pub fn parse_cgnsinf(raw: &str) -> GpsFix {
    let Some(idx) = raw.find(CGNSINF_MARKER) else {
        warn!("no {CGNSINF_MARKER} marker in response: {raw:?}");
        return GpsFix::unset(raw);
    };

    let line = raw[idx + CGNSINF_MARKER.len()..]
        .lines()
        .next()
        .unwrap_or_default();

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        warn!(
            "expected at least {MIN_FIELDS} fields in {CGNSINF_MARKER} line, got {}: {line:?}",
            fields.len()
        );
        return GpsFix::unset(raw);
    }

    let token = |i: usize| {
        let t = fields[i];
        (!t.is_empty()).then(|| t.to_owned())
    };

    let fix_status = if fields[1] == "1" {
        FixStatus::HasFix
    } else {
        FixStatus::NoFix
    };

    GpsFix {
        fix_status,
        timestamp: token(2),
        latitude: token(3),
        longitude: token(4),
        altitude: token(5),
        speed: token(6),
        raw: raw.to_owned(),
    }
}
