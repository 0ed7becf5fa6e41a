// src/utils/html.rs

/// Cleans authored text before it is sent to the backend.
///
/// Uses ammonia's whitelist: safe inline tags survive, `<script>` (with its
/// content), event-handler attributes and other dangerous markup are removed.
/// Leading and trailing whitespace is trimmed.
pub fn clean_text(input: &str) -> String {
    ammonia::clean(input.trim()).trim().to_string()
}
