use anyhow::{bail, Result};
use chrono_tz::Tz;
use tracing::warn;

/// Pick the zone request times are interpreted in.
///
/// An explicit `--timezone` must name a valid IANA zone. Otherwise the `TZ`
/// environment value is used when it parses (a leading `:` is allowed, as in
/// `TZ=:Europe/Berlin`), and UTC is the last resort. The system zone from
/// `/etc/localtime` is never read: a host without `TZ` set gets UTC.
pub fn resolve_timezone(explicit: Option<&str>, env_tz: Option<&str>) -> Result<Tz> {
    if let Some(name) = explicit {
        return match name.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(e) => bail!("Unknown time zone {:?}: {}", name, e),
        };
    }

    match env_tz.map(|v| v.trim_start_matches(':')).filter(|v| !v.is_empty()) {
        Some(name) => Ok(name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(tz = name, "TZ is not an IANA zone name, falling back to UTC");
            chrono_tz::UTC
        })),
        None => Ok(chrono_tz::UTC),
    }
}
