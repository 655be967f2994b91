//! The uniform result envelope returned from every sandbox execution.
//!
//! Nothing escapes the executor as a thrown error: timeout, budget
//! exhaustion, validation failures, user errors, and backend errors all
//! arrive here, distinguishable via the classifier methods.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error payload of a failed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error kind, e.g. "TypeError", "SyntaxError", "Error".
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Stack trace, when the isolate produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetail {
    /// A generic "Error"-kind detail with no stack.
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            name: "Error".into(),
            message: message.into(),
            stack: None,
        }
    }

    /// A named detail with no stack.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

/// Resource accounting for one execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    /// Wall-clock duration, computed on every exit path.
    pub duration_ms: u64,
    /// Number of billable `mcp.*` calls that began.
    pub mcp_calls: u32,
}

/// Discriminated result of one sandbox execution.
///
/// `success=true` carries `result` (a JSON value, with `undefined`
/// normalized to `null`); `success=false` carries `error`. Both carry the
/// run's ordered log lines and stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the fragment ran to completion.
    pub success: bool,
    /// Fulfilment value on success; absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure detail; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Caller-seeded lines followed by sandbox output, in insertion order.
    pub logs: Vec<String>,
    /// Resource accounting.
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    /// A successful envelope. `undefined` returns must be normalized to
    /// `Value::Null` before reaching here.
    pub fn ok(result: Value, logs: Vec<String>, stats: ExecutionStats) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            logs,
            stats,
        }
    }

    /// A failed envelope.
    pub fn failed(error: ErrorDetail, logs: Vec<String>, stats: ExecutionStats) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            logs,
            stats,
        }
    }

    /// The fragment ran to completion.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The deadline expired before the fragment settled.
    pub fn is_timeout(&self) -> bool {
        !self.success
            && self
                .error
                .as_ref()
                .is_some_and(|e| e.message.contains("timed out"))
    }

    /// The `mcp.*` call budget was exhausted.
    pub fn is_call_limit_exceeded(&self) -> bool {
        !self.success
            && self
                .error
                .as_ref()
                .is_some_and(|e| e.message.contains("call limit exceeded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> ExecutionStats {
        ExecutionStats {
            duration_ms: 12,
            mcp_calls: 3,
        }
    }

    #[test]
    fn success_envelope_shape() {
        let r = ExecutionResult::ok(serde_json::json!(2), vec!["a".into()], stats());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["result"], 2);
        assert!(v.get("error").is_none());
        assert_eq!(v["stats"]["durationMs"], 12);
        assert_eq!(v["stats"]["mcpCalls"], 3);
    }

    #[test]
    fn failure_envelope_omits_result() {
        let r = ExecutionResult::failed(ErrorDetail::generic("boom"), vec![], stats());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], false);
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["name"], "Error");
        assert_eq!(v["error"]["message"], "boom");
        assert!(v["error"].get("stack").is_none());
    }

    #[test]
    fn null_result_is_serialized_not_omitted() {
        let r = ExecutionResult::ok(Value::Null, vec![], stats());
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"result\":null"), "json: {json}");
    }

    #[test]
    fn classifiers_are_mutually_exclusive() {
        let ok = ExecutionResult::ok(Value::Null, vec![], stats());
        let timeout = ExecutionResult::failed(
            ErrorDetail::generic("Execution timed out after 500ms"),
            vec![],
            stats(),
        );
        let budget = ExecutionResult::failed(
            ErrorDetail::generic("Maximum mcp.* call limit exceeded (5)"),
            vec![],
            stats(),
        );
        let other = ExecutionResult::failed(ErrorDetail::generic("boom"), vec![], stats());

        for (r, expect) in [(&ok, [true, false, false]), (&timeout, [false, true, false]), (&budget, [false, false, true]), (&other, [false, false, false])] {
            assert_eq!(r.is_success(), expect[0]);
            assert_eq!(r.is_timeout(), expect[1]);
            assert_eq!(r.is_call_limit_exceeded(), expect[2]);
        }
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let r = ExecutionResult::ok(serde_json::json!({"k": [1, 2]}), vec!["x".into()], stats());
        let json = serde_json::to_string(&r).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.result, r.result);
        assert_eq!(back.logs, r.logs);
    }
}
