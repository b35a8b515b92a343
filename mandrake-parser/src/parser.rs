//! The incremental tool-call parser itself.
//!
//! Grounded on the grammar in spec §4.7: tool invocations look like
//! `<toolName>...<paramName>value</paramName>...</toolName>`; everything
//! else is plain text. The parser is re-run over the whole accumulated
//! buffer on every [`StreamParser::feed`] call rather than maintaining
//! incremental scan state — simpler to reason about and fast enough at the
//! buffer sizes one model turn produces, at the cost of being O(n) per feed
//! instead of O(chunk) amortized.

use std::collections::BTreeMap;

use crate::registry::{self, ParamKind};

/// The value of one tool parameter: either plain text, or (for parameters
/// registered as JSON, e.g. `use_mcp_tool`'s `arguments`) a parsed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Plain or raw-content text, trimmed of a single leading/trailing
    /// newline.
    Str(String),
    /// A successfully parsed JSON value.
    Json(serde_json::Value),
}

/// One segment of parsed model output.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// A run of plain text outside any tool tag.
    Text {
        /// The text itself.
        content: String,
        /// `true` while this block may still grow on the next feed.
        partial: bool,
    },
    /// One tool invocation.
    Tool {
        /// The tag name, e.g. `"write_to_file"` or `"use_mcp_tool"`.
        tool_name: String,
        /// Parameters parsed so far, in the order their closing tags were
        /// resolved.
        tool_params: BTreeMap<String, ParamValue>,
        /// `true` while the tool's closing tag has not yet been seen.
        partial: bool,
    },
}

enum TagAttempt {
    Complete(Block, usize),
    /// The tool's name and opening `>` were seen but its closing tag
    /// hasn't arrived yet. Carries the tool name and the buffer offset
    /// where its inner content begins.
    IncompleteNamed(String, usize),
    /// A `<` was seen but not enough has arrived to tell whether it starts
    /// a tag at all.
    IncompleteUnnamed,
    /// Definitely not a tag (e.g. `<` followed by whitespace or another
    /// `<`); the `<` is literal text.
    Invalid,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn try_parse_tag(buf: &str, lt_abs: usize) -> TagAttempt {
    let after_lt = lt_abs + 1;
    if after_lt >= buf.len() {
        return TagAttempt::IncompleteUnnamed;
    }
    let name_end = after_lt
        + buf[after_lt..]
            .chars()
            .take_while(|c| is_ident_char(*c))
            .map(|c| c.len_utf8())
            .sum::<usize>();
    if name_end == after_lt {
        return TagAttempt::Invalid;
    }
    if name_end >= buf.len() {
        return TagAttempt::IncompleteUnnamed;
    }
    let tool_name = buf[after_lt..name_end].to_string();
    let next_char = buf[name_end..].chars().next().unwrap();
    if next_char != '>' {
        return TagAttempt::Invalid;
    }
    let inner_start = name_end + next_char.len_utf8();
    let close_tag = format!("</{tool_name}>");
    match buf[inner_start..].find(close_tag.as_str()) {
        None => TagAttempt::IncompleteNamed(tool_name, inner_start),
        Some(rel) => {
            let inner_end = inner_start + rel;
            let after_close = inner_end + close_tag.len();
            let params = parse_params(&buf[inner_start..inner_end], &tool_name);
            TagAttempt::Complete(
                Block::Tool {
                    tool_name,
                    tool_params: params,
                    partial: false,
                },
                after_close,
            )
        }
    }
}

/// Strip at most one leading and one trailing newline (`\n` or `\r\n`).
fn trim_edge_newlines(s: &str) -> String {
    let s = s.strip_prefix("\r\n").or_else(|| s.strip_prefix('\n')).unwrap_or(s);
    let s = s.strip_suffix("\r\n").or_else(|| s.strip_suffix('\n')).unwrap_or(s);
    s.to_string()
}

fn parse_params(inner: &str, tool_name: &str) -> BTreeMap<String, ParamValue> {
    let mut params = BTreeMap::new();
    let mut pos = 0usize;

    while pos < inner.len() {
        let Some(rel_lt) = inner[pos..].find('<') else {
            break;
        };
        let lt_abs = pos + rel_lt;
        let after_lt = lt_abs + 1;
        if after_lt >= inner.len() {
            break;
        }
        let name_end = after_lt
            + inner[after_lt..]
                .chars()
                .take_while(|c| is_ident_char(*c))
                .map(|c| c.len_utf8())
                .sum::<usize>();
        if name_end == after_lt || name_end >= inner.len() {
            pos = lt_abs + 1;
            continue;
        }
        let param_name = inner[after_lt..name_end].to_string();
        let next_char = inner[name_end..].chars().next().unwrap();
        if next_char != '>' {
            pos = name_end;
            continue;
        }
        let value_start = name_end + next_char.len_utf8();
        let kind = registry::param_kind(tool_name, &param_name);
        let close_tag = format!("</{param_name}>");

        let found = match kind {
            ParamKind::RawContent => rfind(&inner[value_start..], &close_tag),
            ParamKind::PlainText | ParamKind::Json => inner[value_start..].find(close_tag.as_str()),
        };

        match found {
            None => break,
            Some(rel) => {
                let value_end = value_start + rel;
                let raw = trim_edge_newlines(&inner[value_start..value_end]);
                let value = if kind == ParamKind::Json {
                    match serde_json::from_str(&raw) {
                        Ok(v) => ParamValue::Json(v),
                        Err(_) => ParamValue::Str(raw),
                    }
                } else {
                    ParamValue::Str(raw)
                };
                params.insert(param_name, value);
                pos = value_end + close_tag.len();
            }
        }
    }

    params
}

fn rfind(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.rmatch_indices(needle).next().map(|(i, _)| i)
}

/// Parse the full buffer accumulated so far into blocks, the last of which
/// may be `partial`.
fn parse_all(buf: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pos = 0usize;

    while pos < buf.len() {
        let Some(rel_lt) = buf[pos..].find('<') else {
            blocks.push(Block::Text {
                content: buf[pos..].to_string(),
                partial: true,
            });
            pos = buf.len();
            break;
        };
        let lt_abs = pos + rel_lt;
        if lt_abs > pos {
            blocks.push(Block::Text {
                content: buf[pos..lt_abs].to_string(),
                partial: false,
            });
        }

        match try_parse_tag(buf, lt_abs) {
            TagAttempt::Complete(block, new_pos) => {
                blocks.push(block);
                pos = new_pos;
            }
            TagAttempt::IncompleteNamed(tool_name, inner_start) => {
                let params = parse_params(&buf[inner_start..], &tool_name);
                blocks.push(Block::Tool {
                    tool_name,
                    tool_params: params,
                    partial: true,
                });
                pos = buf.len();
            }
            TagAttempt::IncompleteUnnamed => {
                blocks.push(Block::Text {
                    content: buf[lt_abs..].to_string(),
                    partial: true,
                });
                pos = buf.len();
            }
            TagAttempt::Invalid => {
                blocks.push(Block::Text {
                    content: "<".to_string(),
                    partial: false,
                });
                pos = lt_abs + 1;
            }
        }
    }

    merge_adjacent_text(blocks)
}

fn merge_adjacent_text(blocks: Vec<Block>) -> Vec<Block> {
    let mut merged: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match (merged.last_mut(), &block) {
            (
                Some(Block::Text {
                    content: prev,
                    partial: prev_partial,
                }),
                Block::Text { content, partial },
            ) if !*prev_partial => {
                prev.push_str(content);
                *prev_partial = *partial;
            }
            _ => merged.push(block),
        }
    }
    merged
        .into_iter()
        .filter(|b| !matches!(b, Block::Text { content, partial: false } if content.is_empty()))
        .collect()
}

/// Incremental parser: accumulates text chunks and re-derives the block
/// sequence after each feed.
#[derive(Debug, Default)]
pub struct StreamParser {
    buf: String,
}

impl StreamParser {
    /// A fresh parser with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of provider text and return the full, current
    /// block sequence for everything fed so far. The last block is
    /// `partial` if its construct (a text run or a tool tag) has not yet
    /// been definitively closed.
    pub fn feed(&mut self, chunk: &str) -> Vec<Block> {
        self.buf.push_str(chunk);
        parse_all(&self.buf)
    }

    /// The accumulated raw text fed so far.
    pub fn raw(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str, partial: bool) -> Block {
        Block::Text {
            content: content.to_string(),
            partial,
        }
    }

    #[test]
    fn plain_text_with_no_tags_is_one_partial_block() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed("hello there");
        assert_eq!(blocks, vec![text("hello there", true)]);
    }

    #[test]
    fn empty_text_blocks_are_never_emitted() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed("<read_file><path>a.txt</path></read_file>");
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn simple_tool_call_parses_params() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed("<read_file><path>/a.txt</path></read_file>");
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Tool {
                tool_name,
                tool_params,
                partial,
            } => {
                assert_eq!(tool_name, "read_file");
                assert!(!partial);
                assert_eq!(
                    tool_params.get("path"),
                    Some(&ParamValue::Str("/a.txt".into()))
                );
            }
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn use_mcp_tool_arguments_parsed_as_json() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed(
            "<use_mcp_tool><server_name>fs</server_name><tool_name>read_file</tool_name>\
             <arguments>{\"path\":\"/a.txt\"}</arguments></use_mcp_tool>",
        );
        match &blocks[0] {
            Block::Tool { tool_params, .. } => {
                assert_eq!(
                    tool_params.get("arguments"),
                    Some(&ParamValue::Json(serde_json::json!({"path": "/a.txt"})))
                );
                assert_eq!(
                    tool_params.get("server_name"),
                    Some(&ParamValue::Str("fs".into()))
                );
            }
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn write_to_file_content_keeps_embedded_closing_tag() {
        let mut parser = StreamParser::new();
        let input = "<write_to_file><path>x.js</path><content>\n// </content> in a comment\nreturn 1;\n</content></write_to_file>";
        let blocks = parser.feed(input);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Tool { tool_params, .. } => {
                assert_eq!(
                    tool_params.get("content"),
                    Some(&ParamValue::Str(
                        "// </content> in a comment\nreturn 1;".into()
                    ))
                );
                assert_eq!(tool_params.get("path"), Some(&ParamValue::Str("x.js".into())));
            }
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn text_before_and_after_tool_call_is_separate_blocks() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed("Sure, reading it now.<read_file><path>a</path></read_file>Done.");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], text("Sure, reading it now.", false));
        assert!(matches!(blocks[1], Block::Tool { .. }));
        assert_eq!(blocks[2], text("Done.", true));
    }

    #[test]
    fn unrecognized_tool_name_still_parses() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed("<frobnicate><widget>1</widget></frobnicate>");
        match &blocks[0] {
            Block::Tool { tool_name, .. } => assert_eq!(tool_name, "frobnicate"),
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn partial_tool_call_is_refined_across_feeds() {
        let mut parser = StreamParser::new();
        let first = parser.feed("<read_file><path>a.txt</path>");
        match &first[0] {
            Block::Tool {
                tool_name,
                tool_params,
                partial,
            } => {
                assert_eq!(tool_name, "read_file");
                assert!(partial);
                assert_eq!(tool_params.get("path"), Some(&ParamValue::Str("a.txt".into())));
            }
            _ => panic!("expected partial tool block"),
        }

        let second = parser.feed("</read_file>");
        match &second[0] {
            Block::Tool { partial, .. } => assert!(!partial),
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn stray_angle_bracket_is_literal_text() {
        let mut parser = StreamParser::new();
        let blocks = parser.feed("a < b and c > d");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], text("a < b and c > d", true));
    }

    #[test]
    fn re_parsing_emitted_blocks_is_stable() {
        let input = "Hi <read_file><path>a</path></read_file> there";
        let mut first_parser = StreamParser::new();
        let first = first_parser.feed(input);

        let mut second_parser = StreamParser::new();
        let second = second_parser.feed(input);
        assert_eq!(first, second);
    }
}
