//! MCP method names.

/// `initialize` request.
pub const INITIALIZE: &str = "initialize";
/// `ping` request.
pub const PING: &str = "ping";
/// `tools/list` request.
pub const TOOLS_LIST: &str = "tools/list";
/// `tools/call` request.
pub const TOOLS_CALL: &str = "tools/call";
/// `prompts/list` request.
pub const PROMPTS_LIST: &str = "prompts/list";
/// `prompts/get` request.
pub const PROMPTS_GET: &str = "prompts/get";
/// `resources/list` request.
pub const RESOURCES_LIST: &str = "resources/list";
/// `resources/read` request.
pub const RESOURCES_READ: &str = "resources/read";
/// `resources/templates/list` request.
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// `roots/list` request.
pub const ROOTS_LIST: &str = "roots/list";
/// `sampling/createMessage` request.
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// `logging/setLevel` request.
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// `notifications/initialized`.
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
/// `notifications/cancelled`.
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// `notifications/progress`.
pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
/// `notifications/message`.
pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
/// `notifications/tools/list_changed`.
pub const NOTIFICATION_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// `notifications/prompts/list_changed`.
pub const NOTIFICATION_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// `notifications/resources/list_changed`.
pub const NOTIFICATION_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// `notifications/roots/list_changed`.
pub const NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

/// Whether `method` is a notification rather than a request.
#[must_use]
pub fn is_notification(method: &str) -> bool {
    method.starts_with("notifications/")
}
