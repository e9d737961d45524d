//! Named callables that role profiles may reference

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ConclaveError, Result};
use crate::tools::function::{Tool, ToolSpec};

/// Library of tools, looked up by name when participants are built
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every tool a spec contributes; names must be unique
    pub fn add(&mut self, spec: ToolSpec) -> Result<()> {
        let tools = spec.expand();
        for tool in &tools {
            if self.tools.contains_key(tool.name()) {
                return Err(ConclaveError::config(format!(
                    "tool '{}' is already in the catalog",
                    tool.name()
                )));
            }
        }
        for tool in tools {
            self.tools.insert(tool.name().to_string(), tool);
        }
        Ok(())
    }

    /// Builder-style `add`
    pub fn with(mut self, spec: ToolSpec) -> Result<Self> {
        self.add(spec)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
