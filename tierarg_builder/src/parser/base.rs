use thiserror::Error;

/// A problem with the command line definition itself.
///
/// These are detected when the definition is registered, never deferred to parse time.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Config error: {0}")]
pub struct ConfigError(pub(crate) String);

impl ConfigError {
    /// The message, without the `Config error:` prefix.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A problem resolving a value after the Cli has been tokenized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// An environment variable could not be coerced.
    #[error("invalid value for '{dest}' from environment variable '{envvar}': {message}.")]
    Environment {
        /// The canonical key.
        dest: String,
        /// The environment variable name.
        envvar: String,
        /// The coercion failure.
        message: String,
    },
    /// A configuration value could not be coerced.
    #[error("invalid value for '{dest}' from configuration path '{path}': {message}.")]
    Configuration {
        /// The canonical key.
        dest: String,
        /// The configuration path.
        path: String,
        /// The coercion failure.
        message: String,
    },
    /// A static default could not be coerced.
    #[error("invalid default value for '{dest}': {message}.")]
    Default {
        /// The canonical key.
        dest: String,
        /// The coercion failure.
        message: String,
    },
    /// The configuration reader produced something other than a mapping.
    #[error("read_config returned {0} when a mapping or nothing was expected.")]
    InvalidConfig(&'static str),
}

impl ResolveError {
    /// The exit code to use when this error ends the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::InvalidConfig(_) => 1,
            _ => 2,
        }
    }
}
