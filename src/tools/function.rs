//! Callable tools and the shapes they can be registered in
//!
//! A [`Tool`] is the unit the registry binds. [`FunctionTool`] turns a closure
//! plus declared parameters into one; a [`Toolkit`] exposes several at once.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use crate::core::{ConclaveError, Result, ToolDefinition};
use crate::tools::output::ToolOutput;

/// A callable exposed to participants
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool
    fn name(&self) -> &str;

    /// Natural-language description for the model
    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    /// Run the tool with JSON arguments
    async fn call(&self, args: Value) -> Result<ToolOutput>;

    /// Definition advertised to the model backend
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters_schema())
    }
}

/// A capability-bearing object; each callable it exposes becomes one tool
pub trait Toolkit: Send + Sync {
    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn as_schema(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// One declared parameter of a function tool
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

/// A tool built from a closure and its declared parameters
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    params: Vec<Param>,
    handler: Handler,
}

impl FunctionTool {
    /// Start a tool with no parameters and a handler that always fails
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let missing = name.clone();
        Self {
            name,
            description: description.into(),
            params: Vec::new(),
            handler: Arc::new(move |_: Value| -> BoxFuture<'static, Result<ToolOutput>> {
                let missing = missing.clone();
                Box::pin(async move {
                    Err(ConclaveError::tool(format!("tool '{}' has no handler", missing)))
                })
            }),
        }
    }

    /// Declare a required parameter
    pub fn param(self, name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        self.push_param(name.into(), kind, description.into(), true)
    }

    /// Declare an optional parameter
    pub fn optional_param(
        self,
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.push_param(name.into(), kind, description.into(), false)
    }

    fn push_param(mut self, name: String, kind: ParamType, description: String, required: bool) -> Self {
        self.params.push(Param {
            name,
            kind,
            description,
            required,
        });
        self
    }

    /// Set an async handler
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        self.handler = Arc::new(move |args: Value| -> BoxFuture<'static, Result<ToolOutput>> {
            Box::pin(f(args))
        });
        self
    }

    /// Set a synchronous handler
    pub fn sync_handler<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Result<ToolOutput> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.handler(move |args| {
            let f = Arc::clone(&f);
            async move { f(args) }
        })
    }

    /// Declared parameters, in order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Reject missing required arguments and mistyped ones
    fn validate(&self, args: &Value) -> Result<()> {
        let empty = Map::new();
        let provided = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ConclaveError::tool(format!(
                    "arguments for '{}' must be an object, got {}",
                    self.name, other
                )))
            }
        };

        for param in &self.params {
            match provided.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ConclaveError::tool(format!(
                        "missing required argument '{}' for '{}'",
                        param.name, self.name
                    )))
                }
                Some(value) if !value.is_null() && !param.kind.accepts(value) => {
                    return Err(ConclaveError::tool(format!(
                        "argument '{}' for '{}' must be {}",
                        param.name,
                        self.name,
                        param.kind.as_schema()
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.kind.as_schema(), "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    async fn call(&self, args: Value) -> Result<ToolOutput> {
        self.validate(&args)?;
        (self.handler)(args).await
    }
}

/// Presents an existing callable under a different name or description
pub struct RenamedTool {
    inner: Arc<dyn Tool>,
    name: String,
    description: String,
}

impl RenamedTool {
    pub fn new(inner: Arc<dyn Tool>, name: Option<String>, description: Option<String>) -> Self {
        Self {
            name: name.unwrap_or_else(|| inner.name().to_string()),
            description: description.unwrap_or_else(|| inner.description().to_string()),
            inner,
        }
    }
}

#[async_trait]
impl Tool for RenamedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn call(&self, args: Value) -> Result<ToolOutput> {
        self.inner.call(args).await
    }
}

/// The shapes a registration can take
#[derive(Clone)]
pub enum ToolSpec {
    /// A single callable
    Function(Arc<dyn Tool>),
    /// Every callable of a toolkit
    Toolkit(Arc<dyn Toolkit>),
    /// A callable under a custom name and/or description
    Override {
        tool: Arc<dyn Tool>,
        name: Option<String>,
        description: Option<String>,
    },
}

impl ToolSpec {
    pub fn function(tool: impl Tool + 'static) -> Self {
        ToolSpec::Function(Arc::new(tool))
    }

    pub fn toolkit(toolkit: impl Toolkit + 'static) -> Self {
        ToolSpec::Toolkit(Arc::new(toolkit))
    }

    pub fn renamed(
        tool: impl Tool + 'static,
        name: Option<impl Into<String>>,
        description: Option<impl Into<String>>,
    ) -> Self {
        ToolSpec::Override {
            tool: Arc::new(tool),
            name: name.map(Into::into),
            description: description.map(Into::into),
        }
    }

    /// Flatten into the individual tools this spec contributes
    pub fn expand(self) -> Vec<Arc<dyn Tool>> {
        match self {
            ToolSpec::Function(tool) => vec![tool],
            ToolSpec::Toolkit(kit) => kit.tools(),
            ToolSpec::Override {
                tool,
                name,
                description,
            } => vec![Arc::new(RenamedTool::new(tool, name, description))],
        }
    }
}

/// Fetch a required numeric argument
pub fn arg_f64(args: &Value, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ConclaveError::tool(format!("argument '{}' must be a number", key)))
}

/// Fetch a required integer argument
pub fn arg_i64(args: &Value, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ConclaveError::tool(format!("argument '{}' must be an integer", key)))
}

/// Fetch a required string argument
pub fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ConclaveError::tool(format!("argument '{}' must be a string", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_tool() -> FunctionTool {
        FunctionTool::new("add", "Add two integers")
            .param("a", ParamType::Integer, "first addend")
            .param("b", ParamType::Integer, "second addend")
            .sync_handler(|args| Ok(ToolOutput::from(arg_i64(&args, "a")? + arg_i64(&args, "b")?)))
    }

    #[test]
    fn test_schema_derived_from_params() {
        let schema = add_tool().parameters_schema();
        assert_eq!(schema["properties"]["a"]["type"], "integer");
        assert_eq!(schema["required"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_call_validates_arguments() {
        let tool = add_tool();
        let ok = tool.call(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(ok.to_canonical_text(), "5");

        let missing = tool.call(json!({"a": 2})).await.unwrap_err();
        assert!(missing.to_string().contains("missing required argument 'b'"));

        let mistyped = tool.call(json!({"a": "two", "b": 3})).await.unwrap_err();
        assert!(mistyped.to_string().contains("must be integer"));
    }

    #[tokio::test]
    async fn test_unset_handler_fails() {
        let err = FunctionTool::new("noop", "").call(Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("has no handler"));
    }

    #[test]
    fn test_override_expands_to_renamed_tool() {
        let tools = ToolSpec::renamed(add_tool(), Some("sum"), None::<String>).expand();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "sum");
        assert_eq!(tools[0].description(), "Add two integers");
    }
}
