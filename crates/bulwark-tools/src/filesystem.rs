//! Filesystem tools over the worker's sandbox.

use bulwark_approval::RiskLevel;
use bulwark_vfs::{SandboxError, SandboxResult};
use serde_json::{Value, json};

use crate::toolset::str_arg;
use crate::{
    ApprovalDescription, ApprovalRequirement, NeedsApproval, ToolContext, ToolDefinition, ToolError,
    ToolResult, Toolset,
};

const READ_FILE: &str = "read_file";
const WRITE_FILE: &str = "write_file";
const LIST_FILES: &str = "list_files";
const DELETE_FILE: &str = "delete_file";
const FILE_EXISTS: &str = "file_exists";
const STAT_FILE: &str = "stat_file";
const MAKE_DIR: &str = "make_dir";

fn is_mutation(tool_name: &str) -> bool {
    matches!(tool_name, WRITE_FILE | DELETE_FILE | MAKE_DIR)
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": description }
        },
        "required": ["path"]
    })
}

/// Read, write, list, delete, stat, existence and mkdir tools.
///
/// Reads run without asking by default; writes, deletes and mkdir go through
/// approval. A mutation aimed at a read-only or invalid path is blocked before
/// anyone is asked.
#[derive(Debug, Clone, Copy)]
pub struct FilesystemToolset {
    read_approval: bool,
    write_approval: bool,
}

impl Default for FilesystemToolset {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesystemToolset {
    /// Reads pre-approved, mutations require approval.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_approval: false,
            write_approval: true,
        }
    }

    /// Whether reads, listings and stats ask for approval.
    #[must_use]
    pub fn with_read_approval(mut self, required: bool) -> Self {
        self.read_approval = required;
        self
    }

    /// Whether writes, deletes and mkdir ask for approval.
    #[must_use]
    pub fn with_write_approval(mut self, required: bool) -> Self {
        self.write_approval = required;
        self
    }
}

#[async_trait::async_trait]
impl Toolset for FilesystemToolset {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                READ_FILE,
                "Read a UTF-8 text file from the sandbox.",
                path_schema("Absolute sandbox path of the file"),
            ),
            ToolDefinition::new(
                WRITE_FILE,
                "Create or overwrite a text file. Missing parent directories are created.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Absolute sandbox path of the file" },
                        "content": { "type": "string", "description": "Full new content" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolDefinition::new(
                LIST_FILES,
                "List the entries of a directory, sorted by name.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Directory to list (default '/')" }
                    }
                }),
            ),
            ToolDefinition::new(
                DELETE_FILE,
                "Delete a file or a directory and everything in it.",
                path_schema("Absolute sandbox path to delete"),
            ),
            ToolDefinition::new(
                FILE_EXISTS,
                "Check whether a file or directory exists.",
                path_schema("Absolute sandbox path to check"),
            ),
            ToolDefinition::new(
                STAT_FILE,
                "Get size, timestamps and type of a file or directory.",
                path_schema("Absolute sandbox path to inspect"),
            ),
            ToolDefinition::new(
                MAKE_DIR,
                "Create a directory and any missing parents.",
                path_schema("Absolute sandbox path of the directory"),
            ),
        ]
    }

    async fn call(&self, tool_name: &str, args: &Value, ctx: &ToolContext) -> ToolResult<Value> {
        let sandbox = &ctx.sandbox;
        match tool_name {
            READ_FILE => {
                let path = str_arg(args, "path")?;
                let content = sandbox.read(path).await?;
                Ok(json!({ "path": path, "content": content }))
            },
            WRITE_FILE => {
                let path = str_arg(args, "path")?;
                let content = str_arg(args, "content")?;
                sandbox.write(path, content).await?;
                Ok(json!({ "path": path, "bytes": content.len() }))
            },
            LIST_FILES => {
                let path = args.get("path").and_then(Value::as_str).unwrap_or("/");
                let entries = sandbox.list(path).await?;
                Ok(json!({ "path": path, "entries": entries }))
            },
            DELETE_FILE => {
                let path = str_arg(args, "path")?;
                sandbox.delete(path).await?;
                Ok(json!({ "path": path, "deleted": true }))
            },
            FILE_EXISTS => {
                let path = str_arg(args, "path")?;
                let exists = sandbox.exists(path).await?;
                Ok(json!({ "path": path, "exists": exists }))
            },
            STAT_FILE => {
                let path = str_arg(args, "path")?;
                let stat = sandbox.stat(path).await?;
                Ok(json!({
                    "path": path,
                    "size": stat.size,
                    "createdAt": stat.created_at.to_rfc3339(),
                    "modifiedAt": stat.modified_at.to_rfc3339(),
                    "isDirectory": stat.is_directory,
                }))
            },
            MAKE_DIR => {
                let path = str_arg(args, "path")?;
                sandbox.mkdir(path).await?;
                Ok(json!({ "path": path, "created": true }))
            },
            other => Err(ToolError::UnknownTool(other.to_owned())),
        }
    }

    fn needs_approval(&self) -> Option<&dyn NeedsApproval> {
        Some(self)
    }

    fn approval_description(&self) -> Option<&dyn ApprovalDescription> {
        Some(self)
    }
}

fn writable(ctx: &ToolContext, path: &str) -> SandboxResult<()> {
    if ctx.sandbox.can_write(path)? {
        Ok(())
    } else {
        Err(SandboxError::ReadOnly(path.to_owned()))
    }
}

impl NeedsApproval for FilesystemToolset {
    fn approval_requirement(&self, tool_name: &str, args: &Value, ctx: &ToolContext) -> ApprovalRequirement {
        if !is_mutation(tool_name) {
            return if self.read_approval {
                ApprovalRequirement::Required
            } else {
                ApprovalRequirement::PreApproved
            };
        }

        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return ApprovalRequirement::blocked(&ToolError::InvalidArguments("missing 'path' argument".into()));
        };
        if let Err(e) = writable(ctx, path) {
            return ApprovalRequirement::blocked(&ToolError::Sandbox(e));
        }
        if self.write_approval {
            ApprovalRequirement::Required
        } else {
            ApprovalRequirement::PreApproved
        }
    }
}

impl ApprovalDescription for FilesystemToolset {
    fn describe(&self, tool_name: &str, args: &Value) -> String {
        let path = args.get("path").and_then(Value::as_str).unwrap_or("/");
        match tool_name {
            WRITE_FILE => {
                let bytes = args.get("content").and_then(Value::as_str).map_or(0, str::len);
                format!("Write {bytes} bytes to {path}")
            },
            DELETE_FILE => format!("Delete {path}"),
            MAKE_DIR => format!("Create directory {path}"),
            READ_FILE => format!("Read {path}"),
            LIST_FILES => format!("List {path}"),
            other => format!("{other} {path}"),
        }
    }

    fn risk(&self, tool_name: &str, _args: &Value) -> RiskLevel {
        match tool_name {
            DELETE_FILE => RiskLevel::High,
            WRITE_FILE | MAKE_DIR => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}
