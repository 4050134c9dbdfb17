use std::io;

use surreal_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("failed to resolve hostname for the database name: {0}")]
    Hostname(#[source] io::Error),
    #[error("invalid database name pattern: {0}")]
    Pattern(#[source] regex::Error),
    #[error("no command given")]
    MissingCommand,
}

#[derive(Debug, Error)]
pub enum SurreallogError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for the child process: {0}")]
    Wait(#[source] io::Error),
    #[error("child {0} was not captured")]
    MissingPipe(&'static str),
}

impl SurreallogError {
    /// Exit status reported when no child exit code is available. Spawn
    /// failures follow shell conventions.
    pub fn exit_code(&self) -> i32 {
        match self {
            SurreallogError::Spawn { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_error(kind: io::ErrorKind) -> SurreallogError {
        SurreallogError::Spawn {
            program: "tool".into(),
            source: io::Error::from(kind),
        }
    }

    #[test]
    fn spawn_failures_follow_shell_exit_codes() {
        assert_eq!(spawn_error(io::ErrorKind::NotFound).exit_code(), 127);
        assert_eq!(spawn_error(io::ErrorKind::PermissionDenied).exit_code(), 126);
        assert_eq!(spawn_error(io::ErrorKind::Other).exit_code(), 1);
        assert_eq!(SurreallogError::Rpc(RpcError::NotConnected).exit_code(), 1);
    }
}
