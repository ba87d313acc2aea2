use serde::{Deserialize, Serialize};

use crate::CallRecord;

/// Totals for one decoding session, functions in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Calls decoded up to their return record.
    pub calls: u64,
    /// The stream ended inside a call.
    pub truncated: bool,
    /// Calls with no schema, skipped in keep-going mode.
    pub unknown_calls: u64,
    /// Lines outside any call, skipped in keep-going mode.
    pub skipped_lines: u64,
    pub functions: Vec<FunctionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub function: String,
    pub calls: u64,
    /// Calls whose return code is not `SCARD_S_SUCCESS`.
    pub failures: u64,
    pub total_elapsed_usec: i64,
    pub max_elapsed_usec: i64,
}

impl TraceSummary {
    pub(crate) fn record(&mut self, record: &CallRecord) {
        self.calls += 1;
        let index = match self
            .functions
            .binary_search_by(|entry| entry.function.as_str().cmp(&record.function))
        {
            Ok(index) => index,
            Err(index) => {
                self.functions.insert(
                    index,
                    FunctionSummary {
                        function: record.function.clone(),
                        calls: 0,
                        failures: 0,
                        total_elapsed_usec: 0,
                        max_elapsed_usec: 0,
                    },
                );
                index
            }
        };
        let entry = &mut self.functions[index];
        let elapsed = record.elapsed.as_micros();
        entry.calls += 1;
        if !record.success {
            entry.failures += 1;
        }
        entry.total_elapsed_usec = entry.total_elapsed_usec.saturating_add(elapsed);
        entry.max_elapsed_usec = entry.max_elapsed_usec.max(elapsed);
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSummary> {
        self.functions.iter().find(|entry| entry.function == name)
    }
}
