use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ContractError;

/// A closed label set produced by one classifier stage.
///
/// `ALL` fixes the enumeration order; it is the order of the model's logits and
/// the tie-break order of the argmax.
pub trait ClassLabel: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn index(&self) -> usize;

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parse a wire label; anything outside the set is a contract violation.
    fn parse(raw: &str) -> Result<Self, ContractError> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == raw)
            .ok_or_else(|| ContractError::InvalidLabel(raw.to_string()))
    }
}

/// First-stage otoscopy triage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage1Label {
    Normal,
    Abnormal,
    Earwax,
}

impl ClassLabel for Stage1Label {
    const ALL: &'static [Self] = &[Stage1Label::Normal, Stage1Label::Abnormal, Stage1Label::Earwax];

    fn as_str(&self) -> &'static str {
        match self {
            Stage1Label::Normal => "Normal",
            Stage1Label::Abnormal => "Abnormal",
            Stage1Label::Earwax => "Earwax",
        }
    }

    fn index(&self) -> usize {
        match self {
            Stage1Label::Normal => 0,
            Stage1Label::Abnormal => 1,
            Stage1Label::Earwax => 2,
        }
    }
}

/// Second-stage otitis media sub-classes (acute vs chronic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage2Label {
    #[serde(rename = "AOM")]
    Aom,
    #[serde(rename = "COM")]
    Com,
}

impl ClassLabel for Stage2Label {
    const ALL: &'static [Self] = &[Stage2Label::Aom, Stage2Label::Com];

    fn as_str(&self) -> &'static str {
        match self {
            Stage2Label::Aom => "AOM",
            Stage2Label::Com => "COM",
        }
    }

    fn index(&self) -> usize {
        match self {
            Stage2Label::Aom => 0,
            Stage2Label::Com => 1,
        }
    }
}

impl fmt::Display for Stage1Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Stage2Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_enumeration_order() {
        for (i, label) in Stage1Label::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(Stage1Label::from_index(i), Some(*label));
        }
        for (i, label) in Stage2Label::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
        }
        assert_eq!(Stage1Label::from_index(3), None);
    }

    #[test]
    fn parse_rejects_unknown_labels() {
        assert_eq!(Stage1Label::parse("Earwax").unwrap(), Stage1Label::Earwax);
        assert_eq!(Stage2Label::parse("COM").unwrap(), Stage2Label::Com);
        let err = Stage1Label::parse("normal").unwrap_err();
        assert!(matches!(err, ContractError::InvalidLabel(ref l) if l == "normal"));
        assert!(Stage1Label::parse("AOM").is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Stage2Label::Aom).unwrap(), "\"AOM\"");
        assert_eq!(serde_json::to_string(&Stage1Label::Earwax).unwrap(), "\"Earwax\"");
    }
}
