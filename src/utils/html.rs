// src/utils/html.rs

use std::collections::HashSet;

/// Strips every tag from a user-supplied message before it is relayed.
///
/// Messages are shown to the opponent as plain text, so no tag is
/// whitelisted; `<script>` and `<style>` lose their content entirely,
/// other tags keep their text. Blank results become `None`.
pub fn sanitize_message(input: &str) -> Option<String> {
    let cleaned = ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string();
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(sanitize_message(" gg, rematch? ").as_deref(), Some("gg, rematch?"));
    }

    #[test]
    fn script_is_removed() {
        assert_eq!(sanitize_message("<script>alert(1)</script>"), None);
        assert_eq!(sanitize_message("<b>bye</b>").as_deref(), Some("bye"));
    }
}
