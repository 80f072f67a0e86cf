/// Tool output longer than this is cut before it re-enters the conversation.
pub const MAX_TOOL_RESULT_CHARS: usize = 1200;

/// Keep the first `max_chars` characters of `result` and append a marker that
/// names how much was dropped. Shorter input is returned unchanged.
pub fn truncate_tool_result(result: &str, max_chars: usize) -> String {
    let Some((cut, _)) = result.char_indices().nth(max_chars) else {
        return result.to_string();
    };
    let total = result.chars().count();
    format!(
        "{}\n\n... [truncated - showed {} of {} chars. Do NOT re-run this tool to see more.]",
        &result[..cut],
        max_chars,
        total
    )
}
