use serde::Serialize;

use crate::transform::DroppedRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Succeeded { rows: u64, dropped: Vec<DroppedRow> },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub label: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

/// Per-unit result of one ingestion batch, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub units: Vec<UnitReport>,
}

impl IngestReport {
    pub fn push(&mut self, unit: UnitReport) {
        self.units.push(unit);
    }

    pub fn get(&self, label: &str) -> Option<&UnitOutcome> {
        self.units
            .iter()
            .find(|u| u.label == label)
            .map(|u| &u.outcome)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Failed { .. }))
    }

    pub fn total_rows(&self) -> u64 {
        self.units
            .iter()
            .map(|u| match u.outcome {
                UnitOutcome::Succeeded { rows, .. } => rows,
                UnitOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}
