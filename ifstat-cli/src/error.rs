//! CLI-specific error types and exit code mapping

use ifstat_core::error::{AttachError, ConfigError, DetachError, IfstatError};

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The hook could not be attached; nothing was left on the interface.
    #[error("attach failed: {0}")]
    Attach(#[from] AttachError),

    /// The hook may still be attached after the process exits.
    #[error(
        "{0}\nthe XDP program may still be attached; remove it with `ip link set dev {iface} xdp off`",
        iface = .0.interface()
    )]
    Detach(#[from] DetachError),

    /// Logging or metrics initialisation failed.
    #[error("setup failed: {0}")]
    Setup(#[from] anyhow::Error),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (config read, stdout write, signal handler install).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IfstatError> for CliError {
    fn from(e: IfstatError) -> Self {
        match e {
            IfstatError::Config(e) => Self::Config(e),
            IfstatError::Attach(e) => Self::Attach(e),
            IfstatError::Detach(e) => Self::Detach(e),
            IfstatError::Io(e) => Self::Io(e),
        }
    }
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Clean shutdown after a successful detach |
    /// | 1    | Attach or runtime error                  |
    /// | 2    | Usage or configuration error             |
    /// | 3    | Detach failed                            |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Detach(_) => 3,
            Self::Attach(_) | Self::Setup(_) | Self::JsonSerialize(_) | Self::Io(_) => 1,
        }
    }
}
