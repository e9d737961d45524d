//! Tools module - callable tools and their registry
//!
//! Contains the tool trait, function tools, the catalog that role profiles
//! reference, and the registry that binds tools to callers and executors.

pub mod catalog;
pub mod function;
pub mod output;
pub mod registry;

pub use catalog::ToolCatalog;
pub use function::{arg_f64, arg_i64, arg_str, FunctionTool, ParamType, Tool, ToolSpec, Toolkit};
pub use output::ToolOutput;
pub use registry::{ToolDescriptor, ToolRegistry};
