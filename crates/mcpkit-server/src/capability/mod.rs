//! Features a server exposes: tools, prompts, resources and resource
//! templates.

pub mod prompts;
pub mod resources;
pub mod template;
pub mod tools;

pub use prompts::{PromptHandler, ServerPrompt};
pub use resources::{ResourceHandler, ServerResource, ServerResourceTemplate, file_resource_handler};
pub use template::UriTemplate;
pub use tools::{ServerTool, ToolHandler, input_schema};
