//! # mandrake-prompt — deterministic system-prompt assembly
//!
//! A pure function, [`build`], that renders the sections of a session's
//! system prompt from workspace configuration, the tool catalog, and an
//! injected clock (per spec §4.6). No section is ever reordered or
//! reformatted conditionally beyond the presence/absence rules below, so
//! the same inputs always produce byte-identical output — this is what
//! lets the coordinator cache and diff prompts across turns.

#![deny(missing_docs)]

use chrono::{DateTime, Utc};
use mandrake_mcp::CatalogedTool;
use serde::{Deserialize, Serialize};

/// The workspace's `prompt.json` configuration (spec §6 on-disk layout).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Literal instruction text, rendered verbatim inside `<instructions>`.
    #[serde(default)]
    pub instructions: String,
    /// Whether to render the `<workspace>` section.
    #[serde(default)]
    pub include_workspace_metadata: bool,
    /// Whether to render the `<system>` section.
    #[serde(default)]
    pub include_system_info: bool,
    /// Whether to render the `<datetime>` section.
    #[serde(default)]
    pub include_date_time: bool,
}

/// Identity and metadata for the workspace the session is running in.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceInfo {
    /// The workspace's display name.
    pub name: String,
    /// The workspace's root path, as configured.
    pub path: String,
    /// Free-form `key: value` metadata pairs, rendered in insertion order.
    pub metadata: Vec<(String, String)>,
}

/// Operating system and architecture the coordinator process runs on.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// e.g. `"linux"`, `"macos"`, `"windows"`.
    pub os: String,
    /// e.g. `"x86_64"`, `"aarch64"`.
    pub arch: String,
}

impl SystemInfo {
    /// `SystemInfo` for the platform this binary was compiled for.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Everything [`build`] needs to render one system prompt.
#[derive(Debug, Clone)]
pub struct BuildInput<'a> {
    /// The workspace's prompt configuration.
    pub config: &'a PromptConfig,
    /// The tool catalog to advertise, already filtered to what this
    /// session's config set enables.
    pub tools: &'a [CatalogedTool],
    /// Workspace identity, used only when `include_workspace_metadata`.
    pub workspace: &'a WorkspaceInfo,
    /// Platform info, used only when `include_system_info`.
    pub system: &'a SystemInfo,
    /// The injected clock reading, used only when `include_date_time`.
    pub now: DateTime<Utc>,
}

/// Render the system prompt for `input`.
///
/// Sections are emitted in a fixed order — `<instructions>`, `<tools>`,
/// `<workspace>`, `<system>`, `<datetime>` — each separated from its
/// neighbors by exactly one blank line, skipping any section whose inputs
/// are empty or disabled. Never panics; an empty `BuildInput` renders to
/// the empty string.
pub fn build(input: &BuildInput<'_>) -> String {
    let mut sections = Vec::new();

    if !input.config.instructions.is_empty() {
        sections.push(wrap_tag("instructions", &input.config.instructions));
    }

    if !input.tools.is_empty() {
        sections.push(wrap_tag("tools", &render_tools(input.tools)));
    }

    if input.config.include_workspace_metadata {
        sections.push(wrap_tag("workspace", &render_workspace(input.workspace)));
    }

    if input.config.include_system_info {
        sections.push(wrap_tag("system", &render_system(input.system)));
    }

    if input.config.include_date_time {
        sections.push(wrap_tag("datetime", &render_datetime(input.now)));
    }

    sections.join("\n\n")
}

fn wrap_tag(tag: &str, content: &str) -> String {
    format!("<{tag}>\n{content}\n</{tag}>")
}

fn render_tools(tools: &[CatalogedTool]) -> String {
    tools
        .iter()
        .map(|tool| {
            let description = tool.spec.description.as_deref().unwrap_or("");
            format!(
                "{}: {}\n{}",
                tool.spec.name,
                description,
                tool.spec.input_schema
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_workspace(workspace: &WorkspaceInfo) -> String {
    let mut lines = vec![format!("name: {}", workspace.name), format!("path: {}", workspace.path)];
    lines.extend(
        workspace
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}: {value}")),
    );
    lines.join("\n")
}

fn render_system(system: &SystemInfo) -> String {
    format!("os: {}\narch: {}", system.os, system.arch)
}

fn render_datetime(now: DateTime<Utc>) -> String {
    now.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        "2026-07-27T12:00:00Z".parse().unwrap()
    }

    fn tool(name: &str) -> CatalogedTool {
        CatalogedTool {
            server: "fs".to_string(),
            spec: mandrake_mcp::ToolSpec {
                name: name.to_string(),
                description: Some("does a thing".to_string()),
                input_schema: json!({"type": "object"}),
            },
        }
    }

    #[test]
    fn empty_input_renders_empty_string() {
        let config = PromptConfig::default();
        let workspace = WorkspaceInfo::default();
        let system = SystemInfo::current();
        let input = BuildInput {
            config: &config,
            tools: &[],
            workspace: &workspace,
            system: &system,
            now: fixed_now(),
        };
        assert_eq!(build(&input), "");
    }

    #[test]
    fn instructions_only() {
        let config = PromptConfig {
            instructions: "Be helpful.".to_string(),
            ..Default::default()
        };
        let workspace = WorkspaceInfo::default();
        let system = SystemInfo::current();
        let input = BuildInput {
            config: &config,
            tools: &[],
            workspace: &workspace,
            system: &system,
            now: fixed_now(),
        };
        assert_eq!(build(&input), "<instructions>\nBe helpful.\n</instructions>");
    }

    #[test]
    fn all_sections_in_order() {
        let config = PromptConfig {
            instructions: "Be helpful.".to_string(),
            include_workspace_metadata: true,
            include_system_info: true,
            include_date_time: true,
        };
        let workspace = WorkspaceInfo {
            name: "demo".to_string(),
            path: "/ws/demo".to_string(),
            metadata: vec![("owner".to_string(), "alice".to_string())],
        };
        let system = SystemInfo {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        };
        let tools = vec![tool("read_file")];
        let input = BuildInput {
            config: &config,
            tools: &tools,
            workspace: &workspace,
            system: &system,
            now: fixed_now(),
        };
        let rendered = build(&input);
        let instructions_pos = rendered.find("<instructions>").unwrap();
        let tools_pos = rendered.find("<tools>").unwrap();
        let workspace_pos = rendered.find("<workspace>").unwrap();
        let system_pos = rendered.find("<system>").unwrap();
        let datetime_pos = rendered.find("<datetime>").unwrap();
        assert!(instructions_pos < tools_pos);
        assert!(tools_pos < workspace_pos);
        assert!(workspace_pos < system_pos);
        assert!(system_pos < datetime_pos);
        assert!(rendered.contains("owner: alice"));
        assert!(rendered.contains("os: linux"));
        assert!(rendered.contains("2026-07-27T12:00:00+00:00"));
    }

    #[test]
    fn disabled_sections_are_omitted() {
        let config = PromptConfig {
            instructions: "Be helpful.".to_string(),
            include_workspace_metadata: false,
            include_system_info: false,
            include_date_time: false,
        };
        let workspace = WorkspaceInfo::default();
        let system = SystemInfo::current();
        let input = BuildInput {
            config: &config,
            tools: &[],
            workspace: &workspace,
            system: &system,
            now: fixed_now(),
        };
        let rendered = build(&input);
        assert!(!rendered.contains("<workspace>"));
        assert!(!rendered.contains("<system>"));
        assert!(!rendered.contains("<datetime>"));
    }

    #[test]
    fn build_is_deterministic_given_fixed_inputs() {
        let config = PromptConfig {
            instructions: "Be helpful.".to_string(),
            include_date_time: true,
            ..Default::default()
        };
        let workspace = WorkspaceInfo::default();
        let system = SystemInfo::current();
        let input = BuildInput {
            config: &config,
            tools: &[],
            workspace: &workspace,
            system: &system,
            now: fixed_now(),
        };
        assert_eq!(build(&input), build(&input));
    }
}
