use mostrador_agent::tool_schema;

/// Prints the function declarations the orchestrator registers with every
/// run. Useful when editing the assistant's instructions so they stay in step
/// with the contract the dispatcher actually implements.
pub fn run() -> String {
    serde_json::to_string_pretty(&tool_schema())
        .unwrap_or_else(|error| format!("tool schema serialization failed: {error}"))
}
