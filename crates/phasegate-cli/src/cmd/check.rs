use crate::output::print_json;
use anyhow::Context;
use phasegate_core::gate::{self, OperationRequest, Verdict};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

pub const BLOCK_EXIT_CODE: i32 = 2;

// ---------------------------------------------------------------------------
// Blocked: typed non-zero exit, handled in main
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Blocked {
    pub gate: String,
}

impl Blocked {
    pub fn exit_code(&self) -> i32 {
        BLOCK_EXIT_CODE
    }
}

impl std::fmt::Display for Blocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation blocked by gate '{}'", self.gate)
    }
}

impl std::error::Error for Blocked {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Decode a request. Hook payloads that wrap the request in `tool_input`
/// are unwrapped first. Empty input is an empty request.
fn decode_request(raw: &str) -> anyhow::Result<OperationRequest> {
    if raw.trim().is_empty() {
        return Ok(OperationRequest::default());
    }
    let mut value: Value =
        serde_json::from_str(raw).context("operation request is not valid JSON")?;
    if let Some(inner) = value.get_mut("tool_input").map(Value::take) {
        value = inner;
    }
    serde_json::from_value(value).context("operation request has an unexpected shape")
}

pub fn run(root: &Path, input: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read operation request from stdin")?;
            buf
        }
    };
    let request = decode_request(&raw)?;
    tracing::debug!(role = %request.role, "checking operation");

    let verdict = gate::check_operation(root, &request, chrono::Utc::now());
    match &verdict {
        Verdict::Allow => {}
        _ if json => print_json(&verdict)?,
        _ => {
            if let Some(message) = verdict.message() {
                println!("{message}");
            }
        }
    }

    if let Verdict::Block { gate, .. } = verdict {
        return Err(Blocked { gate }.into());
    }
    Ok(())
}
