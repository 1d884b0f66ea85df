//! Memory parsing utilities for scheduler output.
//!
//! All values are normalized to kilobytes, scaling by powers of 1024.

use crate::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Memory format variants for different schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFormat {
    /// SLURM format: "4G", "1000M", "4096K", "4096" (no spaces, megabytes by default)
    Slurm,
    /// SLURM sacct format: "4Gn", "1000Mc" (with per-node/per-core suffix)
    SlurmSacct,
    /// PBS format: "4gb", "1000mb", "512kb" (megabytes by default)
    Pbs,
    /// SGE format: "4G", "1000M", "512K" (megabytes by default)
    Sge,
}

/// Unit labels accepted by PBS, lowercased, with their power of 1024 above kilobytes.
const PBS_UNITS: &[(&str, u32)] = &[
    ("kb", 0),
    ("mb", 1),
    ("gb", 2),
    ("tb", 3),
    ("k", 0),
    ("m", 1),
    ("g", 2),
    ("t", 3),
];

const SGE_UNITS: &[(&str, u32)] = &[("k", 0), ("m", 1), ("g", 2), ("t", 3)];

static QSUB_MEMORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)([a-zA-Z]*)$").expect("valid memory regex"));

impl MemoryFormat {
    fn unit_table(self) -> &'static [(&'static str, u32)] {
        match self {
            Self::Pbs => PBS_UNITS,
            Self::Sge => SGE_UNITS,
            Self::Slurm | Self::SlurmSacct => &[("k", 0), ("m", 1), ("g", 2), ("t", 3)],
        }
    }

    fn default_unit(self) -> &'static str {
        match self {
            Self::Pbs => "mb",
            _ => "m",
        }
    }
}

/// Parse memory string to kilobytes.
///
/// Handles the formats emitted by the supported schedulers:
/// - SLURM: "4G", "1000M", "4096K", "4096" (no spaces)
/// - SLURM sacct: "4Gn", "1000Mc" (n=per node, c=per core)
/// - PBS: "4gb", "1000mb", "96G"
/// - SGE: "96G", "1000M"
///
/// Returns `Ok(None)` for empty strings and an error for values that
/// cannot be read.
pub fn parse_memory_kb(s: &str, format: MemoryFormat) -> Result<Option<u64>, ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }

    match format {
        MemoryFormat::Slurm => parse_slurm_memory(s).map(Some),
        MemoryFormat::SlurmSacct => {
            parse_slurm_memory(s.trim_end_matches('n').trim_end_matches('c')).map(Some)
        }
        MemoryFormat::Pbs | MemoryFormat::Sge => parse_qsub_memory(s, format).map(Some),
    }
}

/// Parse SLURM memory format (e.g., "4G", "1000M", "4096").
fn parse_slurm_memory(s: &str) -> Result<u64, ParseError> {
    let (number, power) = match s.char_indices().last() {
        Some((idx, unit @ ('K' | 'M' | 'G' | 'T'))) => {
            let power = match unit {
                'K' => 0,
                'M' => 1,
                'G' => 2,
                _ => 3,
            };
            (&s[..idx], power)
        }
        // Assume MB if no suffix
        _ => (s, 1),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| ParseError::InvalidMemory(s.to_string()))?;
    scale_kb(value, power, s)
}

/// Parse PBS/SGE memory format with the scheduler's unit table.
fn parse_qsub_memory(s: &str, format: MemoryFormat) -> Result<u64, ParseError> {
    let caps = QSUB_MEMORY_RE
        .captures(s)
        .ok_or_else(|| ParseError::InvalidMemory(s.to_string()))?;

    let units = caps.get(2).map_or("", |m| m.as_str()).to_lowercase();
    let units = if units.is_empty() {
        format.default_unit().to_string()
    } else {
        units
    };

    let power = format
        .unit_table()
        .iter()
        .find(|(label, _)| *label == units)
        .map(|(_, power)| *power)
        .ok_or_else(|| ParseError::UnknownUnit {
            unit: units.clone(),
            value: s.to_string(),
        })?;

    let value: u64 = caps[1]
        .parse()
        .map_err(|_| ParseError::InvalidMemory(s.to_string()))?;
    scale_kb(value, power, s)
}

/// `value * 1024^power`, rejecting results that do not fit in a u64.
fn scale_kb(value: u64, power: u32, s: &str) -> Result<u64, ParseError> {
    value
        .checked_mul(1024u64.pow(power))
        .ok_or_else(|| ParseError::InvalidMemory(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FORMATS: [MemoryFormat; 4] = [
        MemoryFormat::Slurm,
        MemoryFormat::SlurmSacct,
        MemoryFormat::Pbs,
        MemoryFormat::Sge,
    ];

    #[test]
    fn test_unit_scaling_for_every_format() {
        for format in ALL_FORMATS {
            assert_eq!(parse_memory_kb("12M", format), Ok(Some(12288)));
            assert_eq!(parse_memory_kb("13K", format), Ok(Some(13)));
            assert_eq!(parse_memory_kb("5G", format), Ok(Some(5242880)));
            assert_eq!(parse_memory_kb("1T", format), Ok(Some(1073741824)));
            assert_eq!(parse_memory_kb("", format), Ok(None));
            assert!(parse_memory_kb("aT", format).is_err());
        }
    }

    #[test]
    fn test_parse_slurm_memory() {
        assert_eq!(parse_memory_kb("4096", MemoryFormat::Slurm), Ok(Some(4096 * 1024)));
        assert!(parse_memory_kb("4.5G", MemoryFormat::Slurm).is_err());
    }

    #[test]
    fn test_parse_slurm_sacct_memory() {
        assert_eq!(
            parse_memory_kb("4Gn", MemoryFormat::SlurmSacct),
            Ok(Some(4 * 1024 * 1024))
        );
        assert_eq!(
            parse_memory_kb("1000Mc", MemoryFormat::SlurmSacct),
            Ok(Some(1000 * 1024))
        );
    }

    #[test]
    fn test_parse_pbs_memory() {
        assert_eq!(parse_memory_kb("1024kb", MemoryFormat::Pbs), Ok(Some(1024)));
        assert_eq!(parse_memory_kb("2gb", MemoryFormat::Pbs), Ok(Some(2097152)));
        assert_eq!(parse_memory_kb("100", MemoryFormat::Pbs), Ok(Some(102400)));
        assert!(matches!(
            parse_memory_kb("3pw", MemoryFormat::Pbs),
            Err(ParseError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_parse_sge_memory() {
        assert_eq!(parse_memory_kb("96G", MemoryFormat::Sge), Ok(Some(100663296)));
        assert_eq!(parse_memory_kb("100", MemoryFormat::Sge), Ok(Some(102400)));
        assert!(matches!(
            parse_memory_kb("2gb", MemoryFormat::Sge),
            Err(ParseError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_oversized_values_are_rejected() {
        for format in ALL_FORMATS {
            for value in ["99999999999999999T", "99999999999999999G", "99999999999999999999K"] {
                assert_eq!(
                    parse_memory_kb(value, format),
                    Err(ParseError::InvalidMemory(value.to_string()))
                );
            }
        }
        assert!(parse_memory_kb("99999999999999999tb", MemoryFormat::Pbs).is_err());
        assert!(parse_memory_kb("9999999999999999", MemoryFormat::Pbs).is_ok());
        assert_eq!(
            parse_memory_kb("16777215T", MemoryFormat::Slurm),
            Ok(Some(16777215 * 1024u64.pow(3)))
        );
    }
}
