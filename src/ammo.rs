//! Ammunition readers

use crate::error::{AppError, Result};
use crate::types::Missile;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Layout of an ammo file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmmoFormat {
    /// One payload per line, no marker
    Line,
    /// `marker<TAB>payload` per line
    CaseLine,
}

impl AmmoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmmoFormat::Line => "line",
            AmmoFormat::CaseLine => "caseline",
        }
    }

    /// Parse one line; blank lines yield nothing
    pub fn parse_line(&self, line: &str) -> Option<Missile> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }
        match self {
            AmmoFormat::Line => Some(Missile::unmarked(line)),
            AmmoFormat::CaseLine => Some(match line.split_once('\t') {
                Some((marker, payload)) => Missile::new(payload, marker),
                None => Missile::unmarked(line),
            }),
        }
    }
}

impl fmt::Display for AmmoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmmoFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "line" => Ok(AmmoFormat::Line),
            "caseline" => Ok(AmmoFormat::CaseLine),
            _ => Err(AppError::config(format!("Unknown ammo format: {}", s))),
        }
    }
}

/// Cycles through the missiles of an ammo file
#[derive(Debug, Clone)]
pub struct AmmoReader {
    missiles: Vec<Missile>,
    loops: Option<u64>,
    pass: u64,
    index: usize,
}

impl AmmoReader {
    /// Load `path`; `loops = None` cycles until the consumer stops pulling
    pub fn open<P: AsRef<Path>>(path: P, format: AmmoFormat, loops: Option<u64>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read ammo file {}: {}", path.display(), e)))?;
        let reader = Self::from_text(&content, format, loops)
            .map_err(|e| AppError::validation(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), missiles = reader.len(), %format, "Loaded ammo");
        Ok(reader)
    }

    /// Parse ammo held in memory
    pub fn from_text(content: &str, format: AmmoFormat, loops: Option<u64>) -> Result<Self> {
        let missiles: Vec<Missile> = content.lines().filter_map(|l| format.parse_line(l)).collect();
        Self::from_missiles(missiles, loops)
    }

    pub fn from_missiles(missiles: Vec<Missile>, loops: Option<u64>) -> Result<Self> {
        if missiles.is_empty() {
            return Err(AppError::validation("Ammo contains no missiles"));
        }
        Ok(Self {
            missiles,
            loops,
            pass: 0,
            index: 0,
        })
    }

    /// Distinct missiles per pass
    pub fn len(&self) -> usize {
        self.missiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missiles.is_empty()
    }

    /// Missiles this reader will yield in total, if bounded
    pub fn total(&self) -> Option<u64> {
        self.loops.map(|loops| loops * self.missiles.len() as u64)
    }
}

impl Iterator for AmmoReader {
    type Item = Missile;

    fn next(&mut self) -> Option<Missile> {
        if self.index == self.missiles.len() {
            self.index = 0;
            self.pass += 1;
        }
        if self.loops.is_some_and(|loops| self.pass >= loops) {
            return None;
        }
        let missile = self.missiles.get(self.index).cloned();
        self.index += 1;
        missile
    }
}
