//! The small, explicit registry of parameters that get special treatment
//! during parsing, instead of the generic first-closing-tag rule.
//!
//! Per the open question in spec §9: the "last closing tag before the
//! tool's own closing tag wins" rule is applied only to parameters listed
//! here as [`ParamKind::RawContent`], not to every parameter of every tool.
//! Widening this registry should wait on test evidence, not guesswork.

/// How a tool parameter's inner text should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Plain text, closed by the first matching closing tag.
    PlainText,
    /// Verbatim text (including embedded occurrences of its own closing
    /// tag), closed by the *last* matching closing tag that appears before
    /// the enclosing tool's own closing tag.
    RawContent,
    /// Raw JSON text, parsed into a `serde_json::Value`. Closed by the
    /// first matching closing tag, like `PlainText`.
    Json,
}

/// Look up how `param_name` should be parsed within `tool_name`.
pub fn param_kind(tool_name: &str, param_name: &str) -> ParamKind {
    match (tool_name, param_name) {
        ("write_to_file", "content") => ParamKind::RawContent,
        ("use_mcp_tool", "arguments") => ParamKind::Json,
        _ => ParamKind::PlainText,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_to_file_content_is_raw() {
        assert_eq!(param_kind("write_to_file", "content"), ParamKind::RawContent);
    }

    #[test]
    fn use_mcp_tool_arguments_is_json() {
        assert_eq!(param_kind("use_mcp_tool", "arguments"), ParamKind::Json);
    }

    #[test]
    fn unregistered_param_is_plain_text() {
        assert_eq!(param_kind("read_file", "path"), ParamKind::PlainText);
    }

    #[test]
    fn content_param_on_other_tools_is_plain_text() {
        assert_eq!(param_kind("some_other_tool", "content"), ParamKind::PlainText);
    }
}
