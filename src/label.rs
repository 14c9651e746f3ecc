//! Slot status label interpretation.
//!
//! The booking widget renders each slot with a free-text status such as
//! `"3/4 Open"`, `"Waitlist"` or `"(1/2 Open)"`. This module turns that text
//! into a count of booked bays without any knowledge of how the text was
//! retrieved.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// Label text for a private event holding a two-bay block.
const PRIVATE_BLOCK_LABEL: &str = "(1/2 open)";
const PRIVATE_BLOCK_BOOKED: u32 = 2;
const PRIVATE_BLOCK_TOTAL: u32 = 2;

fn open_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*/\s*(\d+)\s*open").expect("open-count pattern is valid")
    })
}

/// Which rule produced a booked count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Waitlist,
    OpenCount,
    PrivateBlock,
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelInterpretation {
    pub booked: u32,
    pub kind: LabelKind,
}

impl LabelInterpretation {
    /// True when no rule matched and `booked` is the zero fallback.
    pub fn is_flagged(&self) -> bool {
        self.kind == LabelKind::Unrecognized
    }
}

#[derive(Debug, Clone)]
pub struct LabelInterpreter {
    default_capacity: u32,
    known_capacities: Vec<u32>,
}

impl LabelInterpreter {
    /// Interpreter whose only known slot capacity is `default_capacity`.
    pub fn new(default_capacity: u32) -> Self {
        Self {
            default_capacity,
            known_capacities: vec![default_capacity],
        }
    }

    pub fn with_known_capacities(mut self, capacities: impl IntoIterator<Item = u32>) -> Self {
        self.known_capacities = capacities.into_iter().collect();
        self
    }

    pub fn default_capacity(&self) -> u32 {
        self.default_capacity
    }

    /// Rules are tried in order: waitlist, `<open>/<total> open` with a known
    /// total, the private two-bay block, then the zero fallback.
    pub fn interpret(&self, label: &str) -> LabelInterpretation {
        let text = label.trim().to_lowercase();

        if text.contains("waitlist") {
            return LabelInterpretation {
                booked: self.default_capacity,
                kind: LabelKind::Waitlist,
            };
        }

        let open_count = parse_open_count(&text);
        if let Some((open, total)) = open_count {
            if self.known_capacities.contains(&total) {
                if let Some(booked) = total.checked_sub(open) {
                    return LabelInterpretation {
                        booked,
                        kind: LabelKind::OpenCount,
                    };
                }
            }
        }

        // Any "<n>/2 open" reaching here has an unknown total of 2 and reads as the block.
        // TODO: confirm with the facility whether a plain 1-of-2 open slot should read as 1 booked.
        let two_bay_total = matches!(open_count, Some((_, PRIVATE_BLOCK_TOTAL)));
        if text.contains(PRIVATE_BLOCK_LABEL) || two_bay_total {
            return LabelInterpretation {
                booked: PRIVATE_BLOCK_BOOKED,
                kind: LabelKind::PrivateBlock,
            };
        }

        warn!(label = %label, "Unrecognized slot label, counting as 0 booked");
        LabelInterpretation {
            booked: 0,
            kind: LabelKind::Unrecognized,
        }
    }
}

/// `(open, total)` from the first `<open>/<total> open` in lowercased text.
fn parse_open_count(text: &str) -> Option<(u32, u32)> {
    let caps = open_count_pattern().captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Booked bays for `label` against a slot of `default_capacity` bays.
pub fn interpret(label: &str, default_capacity: u32) -> u32 {
    LabelInterpreter::new(default_capacity).interpret(label).booked
}
