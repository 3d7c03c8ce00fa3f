/// Extract the JSON payload from a model reply that may wrap it in prose
/// or markdown fences. Returns the best candidate slice; callers own the
/// actual deserialization error.
pub fn extract_json_payload(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }

    if let Some(inner) = fenced_block(trimmed) {
        let inner = inner.trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }

    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    (end >= start).then(|| trimmed[start..=end].trim())
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naked_json_passes_through() {
        assert_eq!(
            extract_json_payload(r#"{"verdict": "A"}"#),
            Some(r#"{"verdict": "A"}"#)
        );
        assert_eq!(extract_json_payload("[1, 2]"), Some("[1, 2]"));
    }

    #[test]
    fn json_fence_is_unwrapped() {
        let reply = "```json\n{\"verdict\": \"B\"}\n```";
        assert_eq!(extract_json_payload(reply), Some("{\"verdict\": \"B\"}"));
    }

    #[test]
    fn bare_fence_is_unwrapped() {
        let reply = "```\n[{\"prompt\": \"x\"}]\n```";
        assert_eq!(extract_json_payload(reply), Some("[{\"prompt\": \"x\"}]"));
    }

    #[test]
    fn prose_around_object_is_stripped() {
        let reply = "Here is my judgment:\n{\"verdict\": \"TIE\"}\nHope that helps.";
        assert_eq!(extract_json_payload(reply), Some("{\"verdict\": \"TIE\"}"));
    }

    #[test]
    fn no_json_yields_none() {
        assert_eq!(extract_json_payload("I could not decide."), None);
    }
}
