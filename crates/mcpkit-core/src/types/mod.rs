//! MCP params, results and payload types.
//!
//! Every params and result type carries a `_meta` field (see
//! [`Meta`](crate::meta::Meta)) that survives a serialize/deserialize
//! round trip unchanged.

pub mod content;
pub mod logging;
pub mod notification;
pub mod prompt;
pub mod resource;
pub mod roots;
pub mod sampling;
pub mod tool;

pub use content::*;
pub use logging::*;
pub use notification::*;
pub use prompt::*;
pub use resource::*;
pub use roots::*;
pub use sampling::*;
pub use tool::*;
