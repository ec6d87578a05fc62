use std::collections::HashMap;
use std::sync::Arc;

use crate::{ToolDefinition, ToolError, ToolResult, Toolset};

/// Maps tool names to the toolsets that provide them.
///
/// An explicit object passed to each executor; there is no global registry.
#[derive(Default)]
pub struct ToolRegistry {
    toolsets: Vec<Arc<dyn Toolset>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool of `toolset`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if any of its tool names is
    /// already registered; nothing is registered in that case.
    pub fn register(&mut self, toolset: Arc<dyn Toolset>) -> ToolResult<()> {
        let names: Vec<String> = toolset.definitions().into_iter().map(|d| d.name).collect();
        for name in &names {
            if let Some(&existing) = self.index.get(name) {
                let owner = self.toolsets.get(existing).map_or("", |t| t.name());
                return Err(ToolError::DuplicateTool {
                    tool: name.clone(),
                    toolset: owner.to_owned(),
                });
            }
        }
        let slot = self.toolsets.len();
        tracing::debug!(toolset = toolset.name(), tools = names.len(), "Registered toolset");
        self.toolsets.push(toolset);
        for name in names {
            self.index.insert(name, slot);
        }
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with(mut self, toolset: Arc<dyn Toolset>) -> ToolResult<Self> {
        self.register(toolset)?;
        Ok(self)
    }

    /// The toolset providing `tool_name`.
    #[must_use]
    pub fn get(&self, tool_name: &str) -> Option<&Arc<dyn Toolset>> {
        self.index.get(tool_name).and_then(|&i| self.toolsets.get(i))
    }

    /// Every tool definition, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.toolsets.iter().flat_map(|t| t.definitions()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.index.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
