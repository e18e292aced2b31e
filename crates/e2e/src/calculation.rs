//! Calculation records as rendered in the dashboard history table

use std::fmt;

use serde::{Deserialize, Serialize};

/// Values accepted by the `#calcType` select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Addition,
        OperationKind::Subtraction,
        OperationKind::Multiplication,
        OperationKind::Division,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Addition => "addition",
            OperationKind::Subtraction => "subtraction",
            OperationKind::Multiplication => "multiplication",
            OperationKind::Division => "division",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Left fold over the operands. `None` for fewer than two operands or a
    /// division by zero, which the server rejects.
    pub fn evaluate(&self, operands: &[f64]) -> Option<f64> {
        let (first, rest) = operands.split_first()?;
        if rest.is_empty() {
            return None;
        }

        rest.iter().try_fold(*first, |acc, &x| match self {
            OperationKind::Addition => Some(acc + x),
            OperationKind::Subtraction => Some(acc - x),
            OperationKind::Multiplication => Some(acc * x),
            OperationKind::Division if x == 0.0 => None,
            OperationKind::Division => Some(acc / x),
        })
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a number the way the history table shows it: integers without a
/// trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Parse the comma-separated `#calcInputs` text.
pub fn parse_operands(input: &str) -> Option<Vec<f64>> {
    input
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect()
}

/// One row of the history table. Owned by the server; the harness only
/// derives expectations from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRecord {
    pub operation: OperationKind,
    pub operands: Vec<f64>,
    pub result: f64,
}

impl CalculationRecord {
    pub fn new(operation: OperationKind, operands: Vec<f64>) -> Option<Self> {
        let result = operation.evaluate(&operands)?;
        Some(Self {
            operation,
            operands,
            result,
        })
    }

    /// The `#calcInputs` text that produces this record.
    pub fn input_text(&self) -> String {
        self.operands
            .iter()
            .map(|x| format_number(*x))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn result_text(&self) -> String {
        format_number(self.result)
    }

    /// Cell texts in table order: operation, operands, result.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.operation.to_string(),
            self.operands
                .iter()
                .map(|x| format_number(*x))
                .collect::<Vec<_>>()
                .join(", "),
            self.result_text(),
        ]
    }
}
