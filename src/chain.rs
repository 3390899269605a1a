use std::{fmt, str::FromStr};

use serde::Serialize;

/// Literal used for a missing chain. It never matches anything, not even itself.
pub const MISSING: &str = "nan";

#[inline]
pub fn is_missing(sequence: &str) -> bool {
    sequence.is_empty() || sequence.eq_ignore_ascii_case(MISSING)
}

/// Turns a raw cell value into an optional sequence, mapping the sentinel to `None`.
#[inline]
pub fn parse_sequence(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!is_missing(trimmed)).then_some(trimmed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arm {
    Vj,
    Vdj,
}

impl Arm {
    pub const ALL: [Self; 2] = [Self::Vj, Self::Vdj];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vj => "VJ",
            Self::Vdj => "VDJ",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Primary,
    Secondary,
}

impl Priority {
    pub const ALL: [Self; 2] = [Self::Primary, Self::Secondary];

    #[inline]
    fn rank(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

/// One of the (up to) four chains a receptor record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainSlot {
    pub arm: Arm,
    pub priority: Priority,
}

impl ChainSlot {
    #[inline]
    pub const fn new(arm: Arm, priority: Priority) -> Self {
        Self { arm, priority }
    }

    /// Name of the cell-table column holding this slot, e.g. `IR_VJ_1_junction_aa`.
    pub fn column_name(self, sequence: SequenceKind) -> String {
        format!(
            "IR_{}_{}_{}",
            self.arm,
            self.priority.rank(),
            sequence.column_suffix()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SequenceKind {
    #[default]
    #[serde(rename = "aa")]
    AminoAcid,
    #[serde(rename = "nt")]
    Nucleotide,
}

impl SequenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AminoAcid => "aa",
            Self::Nucleotide => "nt",
        }
    }

    pub fn column_suffix(self) -> &'static str {
        match self {
            Self::AminoAcid => "junction_aa",
            Self::Nucleotide => "junction",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid receptor arm {0:?}, expected one of VJ, VDJ, all, any")]
    ReceptorArms(String),

    #[error("invalid dual IR mode {0:?}, expected one of primary_only, any, all")]
    DualIr(String),

    #[error("invalid sequence kind {0:?}, expected aa or nt")]
    SequenceKind(String),
}

impl FromStr for SequenceKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aa" => Ok(Self::AminoAcid),
            "nt" => Ok(Self::Nucleotide),
            _ => Err(ParseError::SequenceKind(s.to_owned())),
        }
    }
}

/// Which receptor arms take part in the comparison of two clonotypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReceptorArms {
    Vj,
    Vdj,
    #[default]
    All,
    Any,
}

impl ReceptorArms {
    pub fn arms(self) -> &'static [Arm] {
        match self {
            Self::Vj => &[Arm::Vj],
            Self::Vdj => &[Arm::Vdj],
            Self::All | Self::Any => &Arm::ALL,
        }
    }
}

impl FromStr for ReceptorArms {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VJ" => Ok(Self::Vj),
            "VDJ" => Ok(Self::Vdj),
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            _ => Err(ParseError::ReceptorArms(s.to_owned())),
        }
    }
}

impl fmt::Display for ReceptorArms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vj => "VJ",
            Self::Vdj => "VDJ",
            Self::All => "all",
            Self::Any => "any",
        })
    }
}

/// How primary and secondary chains within one arm are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DualIr {
    PrimaryOnly,
    #[default]
    Any,
    All,
}

impl DualIr {
    pub fn priorities(self) -> &'static [Priority] {
        match self {
            Self::PrimaryOnly => &[Priority::Primary],
            Self::Any | Self::All => &Priority::ALL,
        }
    }
}

impl FromStr for DualIr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary_only" => Ok(Self::PrimaryOnly),
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            _ => Err(ParseError::DualIr(s.to_owned())),
        }
    }
}

impl fmt::Display for DualIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrimaryOnly => "primary_only",
            Self::Any => "any",
            Self::All => "all",
        })
    }
}

/// The slots a `receptor_arms`/`dual_ir` configuration looks at, arm-major.
pub fn selected_slots(receptor_arms: ReceptorArms, dual_ir: DualIr) -> Vec<ChainSlot> {
    receptor_arms
        .arms()
        .iter()
        .flat_map(|&arm| {
            dual_ir
                .priorities()
                .iter()
                .map(move |&priority| ChainSlot::new(arm, priority))
        })
        .collect()
}
