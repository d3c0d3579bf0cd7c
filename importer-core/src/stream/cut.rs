use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::config::ConfigError;

/// Index of a partition within a stream
pub type Partition = i32;
/// Position of an event within a single partition
pub type Offset = i64;

const UNBOUNDED: &str = "UNBOUNDED";

/// A position marker within a stream, usable as the start or end of a read.
///
/// As a start cut [StreamCut::Unbounded] means "from the earliest retained
/// event", as an end cut it means "never stop reading".
/// [StreamCut::Positions] pins every listed partition to an offset. An end
/// offset is exclusive, i.e. the event at that offset is not read.
///
/// The text form is `UNBOUNDED` or `partition:offset` pairs joined by commas,
/// e.g. `0:15,1:42`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamCut {
    /// No bound on this side of the read
    #[default]
    Unbounded,
    /// Explicit offset per partition
    Positions(BTreeMap<Partition, Offset>),
}

impl StreamCut {
    /// Build a bounded cut from `(partition, offset)` pairs
    pub fn from_positions(positions: impl IntoIterator<Item = (Partition, Offset)>) -> Self {
        Self::Positions(positions.into_iter().collect())
    }

    /// True if this cut pins partitions to offsets
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Positions(_))
    }

    /// Offset of the given partition, `None` if the cut is unbounded or does
    /// not contain the partition
    pub fn offset(&self, partition: Partition) -> Option<Offset> {
        match self {
            Self::Unbounded => None,
            Self::Positions(p) => p.get(&partition).copied(),
        }
    }

    /// Check if a read from `self` to `end` is a valid range.
    /// This is always true if either side is unbounded, otherwise every
    /// partition present in both cuts must not start after it ends.
    pub fn precedes(&self, end: &StreamCut) -> bool {
        match (self, end) {
            (Self::Positions(start), Self::Positions(end)) => {
                start.iter().all(|(partition, start_offset)| match end.get(partition) {
                    Some(end_offset) => start_offset <= end_offset,
                    None => true,
                })
            }
            _ => true,
        }
    }
}

impl Display for StreamCut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbounded => f.write_str(UNBOUNDED),
            Self::Positions(p) => {
                let joined = p.iter().map(|(part, off)| format!("{part}:{off}")).join(",");
                f.write_str(&joined)
            }
        }
    }
}

impl FromStr for StreamCut {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(UNBOUNDED) {
            return Ok(Self::Unbounded);
        }
        let mut positions = BTreeMap::new();
        for pair in s.split(',').filter(|x| !x.is_empty()) {
            let (part, off) = pair
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidCut(s.to_owned()))?;
            let part: Partition = part
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidCut(s.to_owned()))?;
            let off: Offset = off
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidCut(s.to_owned()))?;
            if positions.insert(part, off).is_some() {
                return Err(ConfigError::InvalidCut(s.to_owned()));
            }
        }
        if positions.is_empty() {
            // a bounded cut names at least one partition
            return Err(ConfigError::InvalidCut(s.to_owned()));
        }
        Ok(Self::Positions(positions))
    }
}
