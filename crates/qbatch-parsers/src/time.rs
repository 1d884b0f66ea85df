//! Durations, timestamps and exit codes as printed by batch schedulers.

use crate::ParseError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Duration layouts emitted by the supported tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationFormat {
    /// SLURM: `[D-]H:M:S`, `M:S` or plain minutes. "UNLIMITED" and "NOT_SET" mean no limit.
    Slurm,
    /// `ps` etime: `[[D-]H:]M:S`.
    Etime,
    /// PBS/SGE: `[[[D:]H:]M:]S`.
    Qsub,
}

/// Parse an ISO-like `YYYY-MM-DDTHH:MM:SS` timestamp as UTC.
///
/// Empty fields and the placeholders `N/A`, `Unknown` and `None` give `None`.
pub fn parse_slurm_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() || s == "N/A" || s == "Unknown" || s == "None" {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
}

/// Parse a duration string to seconds.
///
/// Empty input yields `Ok(None)`, as do the SLURM placeholders for an
/// unset limit. Malformed input is an error.
pub fn parse_duration_secs(s: &str, format: DurationFormat) -> Result<Option<u64>, ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    let invalid = || ParseError::InvalidDuration(s.to_string());
    let int = |v: &str| v.trim().parse::<u64>().map_err(|_| invalid());

    match format {
        DurationFormat::Slurm | DurationFormat::Etime => {
            if format == DurationFormat::Slurm && (s == "UNLIMITED" || s == "NOT_SET") {
                return Ok(None);
            }

            let mut parts: Vec<&str> = s.split(':').collect();
            let mut days = 0;
            if let Some((d, rest)) = parts[0].split_once('-') {
                days = int(d)?;
                parts[0] = rest;
            }

            let (hours, minutes, seconds) = match (format, parts.as_slice()) {
                (_, &[h, m, sec]) => (int(h)?, int(m)?, int(sec)?),
                (_, &[m, sec]) => (0, int(m)?, int(sec)?),
                (DurationFormat::Slurm, &[m]) => (0, int(m)?, 0),
                _ => return Err(invalid()),
            };
            let total = [(days, 86400), (hours, 3600), (minutes, 60), (seconds, 1)]
                .into_iter()
                .try_fold(0u64, |acc, (value, unit)| {
                    value.checked_mul(unit).and_then(|v| acc.checked_add(v))
                })
                .ok_or_else(invalid)?;
            Ok(Some(total))
        }
        DurationFormat::Qsub => {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() > 4 {
                return Err(invalid());
            }
            let multipliers = [1, 60, 3600, 86400];
            let mut total = 0u64;
            for (value, multiplier) in parts.iter().copied().rev().zip(multipliers) {
                total = int(value)?
                    .checked_mul(multiplier)
                    .and_then(|v| total.checked_add(v))
                    .ok_or_else(invalid)?;
            }
            Ok(Some(total))
        }
    }
}

/// Exit code from a `code:signal` pair.
///
/// Unparseable input counts as 0.
pub fn parse_exit_code(s: &str) -> i32 {
    s.split(':')
        .next()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Compact display form: `1d 02:30:00`, `01:30:00` or `05:30`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours >= 24 {
        let days = hours / 24;
        let hours = hours % 24;
        format!("{}d {:02}:{:02}:{:02}", days, hours, mins, secs)
    } else if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Format seconds as a SLURM time limit (D-H:M:S, no zero padding).
pub fn format_duration_slurm(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}-{}:{}:{}", days, hours, mins, secs)
}

/// Format seconds as a PBS/SGE walltime (H:M:S, hours unbounded).
pub fn format_duration_qsub(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}:{}:{}", hours, mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slurm_timestamp() {
        let dt = parse_slurm_timestamp("2023-11-02T08:05:09").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2023-11-02 08:05");

        assert!(parse_slurm_timestamp("N/A").is_none());
        assert!(parse_slurm_timestamp("Unknown").is_none());
        assert!(parse_slurm_timestamp("None").is_none());
        assert!(parse_slurm_timestamp("").is_none());
    }

    #[test]
    fn test_parse_slurm_duration() {
        let parse = |s| parse_duration_secs(s, DurationFormat::Slurm);
        assert_eq!(parse("3-10:51:13"), Ok(Some(298273)));
        assert_eq!(parse("2:10:02"), Ok(Some(7802)));
        assert_eq!(parse("10:02"), Ok(Some(602)));
        assert_eq!(parse("45"), Ok(Some(2700)));
        assert_eq!(parse("1-5"), Ok(Some(86400 + 300)));
        assert_eq!(parse("UNLIMITED"), Ok(None));
        assert_eq!(parse("NOT_SET"), Ok(None));
        assert_eq!(parse(""), Ok(None));
        assert!(parse("1:2:3:4").is_err());
        assert!(parse("ab:cd").is_err());
    }

    #[test]
    fn test_parse_etime_duration() {
        let parse = |s| parse_duration_secs(s, DurationFormat::Etime);
        assert_eq!(parse("2-11:21:32"), Ok(Some(213692)));
        assert_eq!(parse("11:21:32"), Ok(Some(40892)));
        assert_eq!(parse("21:32"), Ok(Some(1292)));
        assert!(parse("32").is_err());
        assert!(parse("UNLIMITED").is_err());
    }

    #[test]
    fn test_parse_qsub_duration() {
        let parse = |s| parse_duration_secs(s, DurationFormat::Qsub);
        assert_eq!(parse("1:10:51:13"), Ok(Some(125473)));
        assert_eq!(parse("10:51:13"), Ok(Some(39073)));
        assert_eq!(parse("51:13"), Ok(Some(3073)));
        assert_eq!(parse("13"), Ok(Some(13)));
        assert!(parse("1:1:10:51:13").is_err());
        assert!(parse("1:x").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let slurm = |s| parse_duration_secs(s, DurationFormat::Slurm);
        assert_eq!(
            slurm("999999999999999999-0:0:0"),
            Err(ParseError::InvalidDuration("999999999999999999-0:0:0".into()))
        );
        assert!(slurm("1-18446744073709551615:0:0").is_err());
        assert!(parse_duration_secs("213503982334601-0:0:0", DurationFormat::Etime).is_ok());
        assert!(parse_duration_secs("213503982334602-0:0:0", DurationFormat::Etime).is_err());

        let qsub = |s| parse_duration_secs(s, DurationFormat::Qsub);
        assert_eq!(
            qsub("999999999999999999:0:0:0"),
            Err(ParseError::InvalidDuration("999999999999999999:0:0:0".into()))
        );
        assert!(qsub("0:0:1:18446744073709551615").is_err());
        assert_eq!(qsub("0:0:0:18446744073709551615"), Ok(Some(u64::MAX)));
    }

    #[test]
    fn test_parse_exit_code() {
        assert_eq!(parse_exit_code("0:0"), 0);
        assert_eq!(parse_exit_code("2:15"), 2);
        assert_eq!(parse_exit_code("137:9"), 137);
        assert_eq!(parse_exit_code(""), 0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(330), "05:30");
        assert_eq!(format_duration(5400), "01:30:00");
        assert_eq!(format_duration(95400), "1d 02:30:00");
    }

    #[test]
    fn test_format_duration_slurm() {
        assert_eq!(format_duration_slurm(10), "0-0:0:10");
        assert_eq!(format_duration_slurm(298273), "3-10:51:13");
    }

    #[test]
    fn test_format_duration_qsub() {
        assert_eq!(format_duration_qsub(10), "0:0:10");
        assert_eq!(format_duration_qsub(39073), "10:51:13");
        assert_eq!(format_duration_qsub(298273), "82:51:13");
    }
}
