use std::{ffi::OsString, io, process::ExitStatus, process::Stdio, time::Duration};

use tokio::process::{Child, Command};

use crate::{config::ENV_PREFIX, SurreallogError};

/// Builds the child command: stdin inherited, output piped, and none of our
/// own `SURREALLOG_*` variables passed through.
pub fn command(argv: &[OsString]) -> Option<Command> {
    let (program, args) = argv.split_first()?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, _) in std::env::vars_os() {
        if key.to_string_lossy().starts_with(ENV_PREFIX) {
            command.env_remove(key);
        }
    }
    Some(command)
}

/// Spawns `command`, retrying briefly while the executable is still busy
/// being written (ETXTBSY).
pub async fn spawn_with_retry(command: &mut Command) -> Result<Child, SurreallogError> {
    let mut backoff = Duration::from_millis(2);
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                if is_text_busy(&source) && attempt < 4 {
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(SurreallogError::Spawn {
                    program: command
                        .as_std()
                        .get_program()
                        .to_string_lossy()
                        .into_owned(),
                    source,
                });
            }
        }
    }
}

fn is_text_busy(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::ExecutableFileBusy) || err.raw_os_error() == Some(26)
}

/// The code to exit with on behalf of the child. A child killed by a signal
/// reports `128 + signal`, as shells do.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
