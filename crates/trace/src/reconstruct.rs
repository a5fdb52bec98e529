// SimTrace - EVM call simulation and trace decoding
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Runs extraction and decoding over a whole trace.

use serde::{Deserialize, Serialize};
use simtrace_common::{ExecutionStep, TraceCallResponse};
use tracing::{debug, warn};

use crate::{
    catalog::EventCatalog,
    decode::{decode_frame, DecodedEvent, EventOutcome},
    error::{ExtractError, TraceError},
    extract::{extract_log_frame, LogFrame},
};

/// What to do with a `LOGn` step whose operands cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Fail the whole trace on the first bad step
    Strict,
    /// Skip the step, log it and keep going
    #[default]
    Lenient,
}

/// One emitted log, with the step it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedLog {
    /// Position of the step in the struct-log list
    pub index: usize,
    /// The `LOGn` step itself
    pub step: ExecutionStep,
    /// Topics and data read from the step
    pub frame: LogFrame,
    /// Catalog match and decoded fields
    pub outcome: EventOutcome,
}

/// A `LOGn` step that could not be turned into a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStep {
    /// Position of the step in the struct-log list
    pub index: usize,
    /// The malformed step
    pub step: ExecutionStep,
    /// Why it was skipped
    pub error: ExtractError,
}

impl From<SkippedStep> for TraceError {
    fn from(skipped: SkippedStep) -> Self {
        Self::Extract { index: skipped.index, op: skipped.step.op, source: skipped.error }
    }
}

/// Lazily rebuild and decode every log in `steps`, in execution order.
///
/// Only steps whose opcode starts with `LOG` are looked at. In lenient mode
/// malformed steps are logged and left out; in strict mode the first one is
/// yielded as an error and ends the iteration.
pub fn reconstruct_logs<'a>(
    steps: &'a [ExecutionStep],
    catalog: &'a EventCatalog,
    mode: ExtractionMode,
) -> impl Iterator<Item = Result<TracedLog, TraceError>> + 'a {
    log_steps(steps, catalog)
        .scan(false, move |aborted, result| {
            if *aborted {
                return None;
            }
            Some(match result {
                Ok(log) => Some(Ok(log)),
                Err(bad) if mode == ExtractionMode::Strict => {
                    *aborted = true;
                    Some(Err(bad.into()))
                }
                Err(bad) => {
                    warn_skipped(&bad);
                    None
                }
            })
        })
        .flatten()
}

fn log_steps<'a>(
    steps: &'a [ExecutionStep],
    catalog: &'a EventCatalog,
) -> impl Iterator<Item = Result<TracedLog, SkippedStep>> + 'a {
    steps.iter().enumerate().filter(|(_, step)| step.is_log()).map(move |(index, step)| {
        match extract_log_frame(step) {
            Ok(frame) => {
                let outcome = decode_frame(&frame, catalog);
                debug!(index, %step, ?outcome, "Reconstructed log");
                Ok(TracedLog { index, step: step.clone(), frame, outcome })
            }
            Err(error) => Err(SkippedStep { index, step: step.clone(), error }),
        }
    })
}

fn warn_skipped(bad: &SkippedStep) {
    warn!(index = bad.index, step = %bad.step, error = %bad.error, "Skipping malformed log step");
}

/// Everything learned from one traced call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceReport {
    /// Whether the call reverted
    pub failed: bool,
    /// Gas used by the call
    pub gas: u64,
    /// Return data as reported by the node
    pub return_value: String,
    /// Every readable `LOGn` step, in execution order
    pub logs: Vec<TracedLog>,
    /// Malformed log steps, only filled in lenient mode
    pub skipped: Vec<SkippedStep>,
}

impl TraceReport {
    /// Reconstruct every log of a `debug_traceCall` response.
    pub fn from_response(
        response: &TraceCallResponse,
        catalog: &EventCatalog,
        mode: ExtractionMode,
    ) -> Result<Self, TraceError> {
        let mut logs = Vec::new();
        let mut skipped = Vec::new();

        for result in log_steps(&response.struct_logs, catalog) {
            match result {
                Ok(log) => logs.push(log),
                Err(bad) if mode == ExtractionMode::Strict => return Err(bad.into()),
                Err(bad) => {
                    warn_skipped(&bad);
                    skipped.push(bad);
                }
            }
        }

        debug!(
            steps = response.struct_logs.len(),
            logs = logs.len(),
            skipped = skipped.len(),
            "Trace reconstructed"
        );

        Ok(Self {
            failed: response.failed,
            gas: response.gas,
            return_value: response.return_value.clone(),
            logs,
            skipped,
        })
    }

    /// Decoded events, in emission order.
    pub fn events(&self) -> impl Iterator<Item = &DecodedEvent> {
        self.logs.iter().filter_map(|log| log.outcome.decoded())
    }

    /// Logs whose selector is not in the catalog.
    pub fn unmatched(&self) -> impl Iterator<Item = &TracedLog> {
        self.logs.iter().filter(|log| log.outcome.is_unmatched())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_dyn_abi::DynSolValue;
    use crate::error::DecodeError;
    use alloy_primitives::{b256, hex, U256};
    use simtrace_common::{encode_word, EvmStack};

    const TRANSFER: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

    fn step(op: &str, stack: &[&str], memory: Vec<String>) -> ExecutionStep {
        ExecutionStep {
            op: op.to_string(),
            stack: stack.iter().copied().collect::<EvmStack>(),
            memory,
            ..Default::default()
        }
    }

    fn value_memory(value: u64) -> Vec<String> {
        vec![hex::encode(U256::from(value).to_be_bytes::<32>())]
    }

    fn transfer_step(value: u64) -> ExecutionStep {
        step("LOG3", &["0xb2", "0xa1", TRANSFER, "0x20", "0x0"], value_memory(value))
    }

    fn trace(struct_logs: Vec<ExecutionStep>) -> TraceCallResponse {
        TraceCallResponse { gas: 50_000, struct_logs, ..Default::default() }
    }

    #[test]
    fn test_no_log_steps() {
        let response = trace(vec![step("PUSH1", &[], vec![]), step("STOP", &["0x1"], vec![])]);
        let catalog = EventCatalog::erc20();
        let logs = reconstruct_logs(&response.struct_logs, &catalog, ExtractionMode::Lenient);
        assert_eq!(logs.count(), 0);

        let report =
            TraceReport::from_response(&response, &EventCatalog::erc20(), ExtractionMode::Strict)
                .unwrap();
        assert!(report.logs.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(report.gas, 50_000);
    }

    #[test]
    fn test_unmatched_does_not_affect_neighbours() {
        let unknown = encode_word(U256::from(0xdead));
        let response = trace(vec![
            step("PUSH1", &[], vec![]),
            transfer_step(5),
            step("LOG1", &[&unknown, "0x0", "0x0"], vec![]),
            transfer_step(6),
        ]);

        let report =
            TraceReport::from_response(&response, &EventCatalog::erc20(), ExtractionMode::default())
                .unwrap();

        assert_eq!(report.logs.iter().map(|log| log.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(report.logs[1].outcome.is_unmatched());
        assert_eq!(report.unmatched().count(), 1);

        let values: Vec<_> = report.events().map(|e| e.get("value").cloned()).collect();
        assert_eq!(
            values,
            vec![
                Some(DynSolValue::Uint(U256::from(5), 256)),
                Some(DynSolValue::Uint(U256::from(6), 256)),
            ]
        );
        assert_eq!(
            report.logs[0].frame.topics[0],
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_length_mismatch_is_local() {
        let mut short = transfer_step(1);
        // length 0x10 instead of a full word
        short.stack = ["0xb2", "0xa1", TRANSFER, "0x10", "0x0"].into_iter().collect();
        let response = trace(vec![short, transfer_step(2)]);

        let report =
            TraceReport::from_response(&response, &EventCatalog::erc20(), ExtractionMode::Strict)
                .unwrap();

        assert!(matches!(report.logs[0].outcome, EventOutcome::Invalid(_)));
        assert!(report.logs[1].outcome.decoded().is_some());
    }

    #[test]
    fn test_zero_length_transfer_is_local_mismatch() {
        // No memory captured at all: a zero-length log must not read it.
        let empty = step("LOG3", &["0xb2", "0xa1", TRANSFER, "0x0", "0x0"], vec![]);
        let response = trace(vec![empty, transfer_step(4)]);

        let report =
            TraceReport::from_response(&response, &EventCatalog::erc20(), ExtractionMode::Strict)
                .unwrap();

        assert_eq!(report.logs.len(), 2);
        assert!(report.logs[0].frame.data.is_empty());
        assert_eq!(report.logs[0].frame.topics.len(), 3);
        assert_eq!(
            report.logs[0].outcome,
            EventOutcome::Invalid(DecodeError::LengthMismatch {
                event: "Transfer".into(),
                expected: 32,
                actual: 0,
            })
        );
        assert_eq!(
            report.logs[1].outcome.decoded().and_then(|event| event.get("value")),
            Some(&DynSolValue::Uint(U256::from(4), 256))
        );
    }

    #[test]
    fn test_lenient_skips_malformed() {
        let response = trace(vec![step("LOG2", &["0x0", "0x0"], vec![]), transfer_step(9)]);

        let report =
            TraceReport::from_response(&response, &EventCatalog::erc20(), ExtractionMode::Lenient)
                .unwrap();

        assert_eq!(report.logs.len(), 1);
        assert_eq!(report.logs[0].index, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].error,
            ExtractError::StackUnderflow { op: "LOG2".into(), needed: 4, found: 2 }
        );
    }

    #[test]
    fn test_strict_aborts() {
        let response = trace(vec![transfer_step(9), step("LOG2", &["0x0", "0x0"], vec![])]);

        let err =
            TraceReport::from_response(&response, &EventCatalog::erc20(), ExtractionMode::Strict)
                .unwrap_err();
        assert!(matches!(err, TraceError::Extract { index: 1, .. }));
    }

    #[test]
    fn test_lazy_iteration_stops_early() {
        let response = trace(vec![transfer_step(1), step("LOG9", &[], vec![])]);
        let catalog = EventCatalog::erc20();
        let mut logs = reconstruct_logs(&response.struct_logs, &catalog, ExtractionMode::Strict);

        assert!(logs.next().unwrap().is_ok());
        assert!(matches!(logs.next(), Some(Err(TraceError::Extract { index: 1, .. }))));
        assert!(logs.next().is_none());
    }

    #[test]
    fn test_lenient_iteration_drops_malformed() {
        let response = trace(vec![
            step("LOG2", &["0x0"], vec![]),
            transfer_step(1),
            step("LOG9", &[], vec![]),
            transfer_step(2),
        ]);
        let catalog = EventCatalog::erc20();

        let indices: Vec<_> =
            reconstruct_logs(&response.struct_logs, &catalog, ExtractionMode::Lenient)
                .map(|log| log.unwrap().index)
                .collect();
        assert_eq!(indices, vec![1, 3]);
    }
}
