pub mod command_executor;
pub mod redaction;

pub use command_executor::{CommandError, SafeCommandExecutor};
pub use redaction::{mask_token, redact};
