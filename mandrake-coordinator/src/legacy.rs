//! Resolution of tool-call blocks into `{server, tool}` targets.
//!
//! Mirrors `mandrake-parser`'s `registry` module: a small, explicit table
//! rather than a convention-based guess, grounded on the same open
//! question spec §9 raises for tool-call parsing. `use_mcp_tool` names its
//! server and tool explicitly and needs no table lookup; every other tool
//! tag is a "legacy short-form" invocation and is resolved here against a
//! single implied server. Spec §4.4/§4.8 say this mapping is "known to the
//! manager" but leave its shape unspecified; widening it is a matter of
//! adding rows, not changing the resolution algorithm.

use mandrake_core::ServerId;

/// The envelope tag used for explicit `{server, tool}` invocations.
pub const USE_MCP_TOOL: &str = "use_mcp_tool";

const LEGACY_TOOLS: &[(&str, &str)] = &[
    ("read_file", "fs"),
    ("write_to_file", "fs"),
    ("list_files", "fs"),
    ("search_files", "fs"),
    ("execute_command", "shell"),
];

/// The fallback server for a legacy tool tag with no table entry.
pub const DEFAULT_SERVER: &str = "default";

/// Resolve the server a legacy (non-`use_mcp_tool`) tool tag dispatches
/// against. Unrecognized tags still resolve, against [`DEFAULT_SERVER`];
/// the manager decides whether that server actually exists.
pub fn resolve_legacy_server(tool_name: &str) -> ServerId {
    LEGACY_TOOLS
        .iter()
        .find(|(name, _)| *name == tool_name)
        .map(|(_, server)| ServerId::from(*server))
        .unwrap_or_else(|| ServerId::from(DEFAULT_SERVER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_legacy_tool_resolves_its_server() {
        assert_eq!(resolve_legacy_server("read_file").as_str(), "fs");
    }

    #[test]
    fn unknown_legacy_tool_falls_back_to_default_server() {
        assert_eq!(resolve_legacy_server("frobnicate").as_str(), DEFAULT_SERVER);
    }
}
