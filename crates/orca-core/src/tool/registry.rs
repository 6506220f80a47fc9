//! Tool registration table
//!
//! Keeps tools in registration order so definitions reach the model in a
//! stable order. Names are unique: registering a second tool under an
//! existing name is an error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::ToolDefinition;
use crate::tool::Tool;
use crate::{Error, Result};

/// Name to capability table
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list, rejecting duplicate names
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool
    ///
    /// # Errors
    /// [`Error::DuplicateTool`] if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Tool definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// New registry with only the tools whose name passes the predicate
    pub fn filtered(&self, keep: impl Fn(&str) -> bool) -> Self {
        let mut registry = Self::new();
        for tool in self.tools.iter().filter(|t| keep(t.name())) {
            registry.index.insert(tool.name().to_string(), registry.tools.len());
            registry.tools.push(Arc::clone(tool));
        }
        registry
    }

    /// New registry without the named tools
    pub fn without(&self, names: &[&str]) -> Self {
        self.filtered(|name| !names.contains(&name))
    }

    /// New registry with extra tools appended, rejecting duplicate names
    pub fn extended(&self, extra: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = self.clone();
        for tool in extra {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Check if a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if no tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names in registration order
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Iterate over tools in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
