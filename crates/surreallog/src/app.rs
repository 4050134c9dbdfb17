use std::sync::Arc;

use surreal_rpc::{RpcError, SurrealClient};
use tracing::{error, info, warn};

use crate::{
    config::Options,
    runner::{self, RunOptions},
    schema::{self, RunTable},
    sender::{BatchingSender, SurrealSink},
};

/// Connects, runs the child and records the outcome. Returns the process
/// exit code: the child's own code once it has run, 1 for startup failures.
pub async fn run(options: Options) -> i32 {
    let client = Arc::new(SurrealClient::new());
    let table = match start(&client, &options).await {
        Ok(table) => table,
        Err(err) => {
            error!(endpoint = %options.endpoint, "failed to prepare SurrealDB: {err}");
            if let Err(err) = client.close().await {
                warn!("failed to close the rpc connection: {err}");
            }
            return 1;
        }
    };

    let sender = BatchingSender::new(
        SurrealSink::new(Arc::clone(&client), table.insert_statement()),
        options.flush,
    );
    let code = match runner::run(&options.command, &sender, RunOptions::default()).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    };

    if let Err(err) = schema::mark_completed(&client, &table, code).await {
        warn!(table = %table.ident, "failed to record completion: {err}");
    }
    if let Err(err) = client.close().await {
        warn!("failed to close the rpc connection: {err}");
    }
    info!(table = %table.ident, code, "command finished");
    code
}

async fn start(client: &SurrealClient, options: &Options) -> Result<RunTable, RpcError> {
    client.connect(&options.endpoint).await?;
    schema::bootstrap(client, options).await
}
