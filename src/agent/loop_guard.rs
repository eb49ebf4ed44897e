//! Loop guard for the ReAct loop
//!
//! Detects when the LLM keeps emitting the same action with the same
//! parameters and escalates: first a warning observation telling the model
//! to change approach, then a forced stop of the task.

use std::collections::VecDeque;

use serde_json::Value;

/// How many recent action signatures are retained
const HISTORY_LIMIT: usize = 10;

/// Verdict for an action about to be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    /// Dispatch normally
    Proceed,
    /// Skip the dispatch and warn the model
    Warn,
    /// Terminate the task
    Abort,
}

/// Tracks recent `(tool, params)` signatures within one task.
pub struct LoopGuard {
    /// Recent `tool:params` signatures, oldest first
    recent: VecDeque<String>,
    /// Prior occurrences at which a warning fires
    warn_threshold: u32,
}

impl LoopGuard {
    /// Create a guard. `warn_threshold` is how many prior identical
    /// emissions trigger the warning; one more triggers the abort.
    pub fn new(warn_threshold: u32) -> Self {
        LoopGuard {
            recent: VecDeque::with_capacity(HISTORY_LIMIT + 1),
            warn_threshold,
        }
    }

    /// Record an emitted action and judge it.
    pub fn record(&mut self, tool_name: &str, params: &Value) -> LoopVerdict {
        let signature = Self::signature(tool_name, params);
        let prior = self.recent.iter().filter(|s| **s == signature).count() as u32;

        self.recent.push_back(signature);
        while self.recent.len() > HISTORY_LIMIT {
            self.recent.pop_front();
        }

        if prior > self.warn_threshold {
            LoopVerdict::Abort
        } else if prior == self.warn_threshold {
            LoopVerdict::Warn
        } else {
            LoopVerdict::Proceed
        }
    }

    /// The observation injected on a warning
    pub fn warning_observation(tool_name: &str) -> String {
        format!(
            "LOOP DETECTED: You have already called '{}' with the same parameters. \
             Do NOT repeat this action. Change your approach or respond with \
             Action: Final Answer: <answer>.",
            tool_name
        )
    }

    /// The synthetic final answer used on an abort
    pub fn abort_answer(tool_name: &str) -> String {
        format!(
            "Task stopped due to repeated actions. Last action: {}",
            tool_name
        )
    }

    /// Reset between tasks
    pub fn reset(&mut self) {
        self.recent.clear();
    }

    fn signature(tool_name: &str, params: &Value) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(tool_name);
        out.push(':');
        canonical_json(params, &mut out);
        out
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Render JSON with object keys sorted so equal params always produce the
/// same signature.
fn canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                canonical_json(map.get(key.as_str()).unwrap_or(&Value::Null), out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_json(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
