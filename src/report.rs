use std::fmt;

use serde::Serialize;

use crate::processor::ProcessResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub input: String,
    pub message: String,
}

/// Counts and failure reasons of one batch, derived from its results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailureEntry>,
}

impl BatchReport {
    pub const fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Summarizes `results`; failures are listed in the order they occur.
pub fn summarize(results: &[ProcessResult]) -> BatchReport {
    let failures = results
        .iter()
        .filter_map(|result| match result {
            ProcessResult::Failure { input, message, .. } => Some(FailureEntry {
                input: input.clone(),
                message: message.clone(),
            }),
            ProcessResult::Success { .. } => None,
        })
        .collect::<Vec<_>>();

    BatchReport {
        total: results.len(),
        succeeded: results.len() - failures.len(),
        failed: failures.len(),
        failures,
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(35);
        writeln!(f, "{rule}")?;
        writeln!(f, "Batch report")?;
        writeln!(f, "  processed: {}", self.total)?;
        writeln!(f, "  succeeded: {}, failed: {}", self.succeeded, self.failed)?;
        if self.has_failures() {
            writeln!(f)?;
            writeln!(f, "Failures:")?;
            for failure in &self.failures {
                writeln!(f, "  - {}: {}", failure.input, failure.message)?;
            }
        }
        writeln!(f, "{rule}")
    }
}
