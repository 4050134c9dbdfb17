//! Remote schema setup and the per-run catalog record.
//!
//! Each run gets its own table `#N`, where `N` comes from a counter record
//! that the setup script bumps. The `catalog` table keeps one record per run
//! with its start time, completion time and exit code.

use serde::Serialize;
use surreal_rpc::{quote_ident, quote_record_id, RpcError, SurrealClient, Value};
use tracing::{debug, info};

use crate::config::Options;

/// Statement index of the counter upsert in the setup script.
const COUNTER_STATEMENT: usize = 6;

fn setup_script(namespace: &str, database: &str) -> String {
    let ns = quote_ident(namespace);
    let db = quote_ident(database);
    format!(
        "DEFINE NAMESPACE IF NOT EXISTS {ns};
USE NS {ns};
DEFINE DATABASE IF NOT EXISTS {db};
USE DB {db};
DEFINE TABLE IF NOT EXISTS counter SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS value ON counter TYPE int;
UPSERT ONLY counter:tb SET value += 1 RETURN VALUE value;
DEFINE TABLE IF NOT EXISTS catalog SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS startedAt ON catalog TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS completedAt ON catalog TYPE option<datetime>;
DEFINE FIELD IF NOT EXISTS exitCode ON catalog TYPE option<int>;"
    )
}

/// The table holding one run's events.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RunTable {
    /// Run number handed out by the counter.
    pub number: i64,
    /// Quoted record id of the run's catalog entry.
    pub rid: String,
    /// Quoted table identifier.
    pub ident: String,
}

impl RunTable {
    pub fn new(number: i64) -> Self {
        let name = format!("#{number}");
        Self {
            number,
            rid: quote_record_id(&name),
            ident: quote_ident(&name),
        }
    }

    fn define_script(&self) -> String {
        let Self { rid, ident, .. } = self;
        format!(
            "CREATE catalog:{rid} RETURN NONE;
DEFINE TABLE {ident} SCHEMAFULL;
DEFINE FIELD kind ON {ident} TYPE -1 | 1 | 2;
DEFINE FIELD time ON {ident} TYPE datetime;
DEFINE FIELD text ON {ident} TYPE string;
DEFINE FIELD data ON {ident} TYPE option<string>;
DEFINE FIELD opts ON {ident} FLEXIBLE TYPE option<object>;"
        )
    }

    fn start_statement(&self) -> String {
        format!(
            "UPDATE catalog:{} SET startedAt = time::now() RETURN NONE;",
            self.rid
        )
    }

    fn complete_statement(&self) -> String {
        format!(
            "UPDATE catalog:{} SET completedAt = time::now(), exitCode = $code RETURN NONE;",
            self.rid
        )
    }

    /// Statement used for every batch insert; expects a `$data` array.
    pub fn insert_statement(&self) -> String {
        format!("INSERT INTO {} $data RETURN NONE;", self.ident)
    }
}

fn no_vars() -> Value {
    Value::Map(Vec::new())
}

/// Signs in, prepares namespace, database and catalog, and creates this
/// run's table. Any statement-level failure aborts the bootstrap.
pub async fn bootstrap(client: &SurrealClient, options: &Options) -> Result<RunTable, RpcError> {
    client.signin(&options.user, &options.pass).await?;
    debug!(user = %options.user, "signed in");

    let setup = client
        .query(&setup_script(&options.namespace, &options.database), no_vars())
        .await?;
    setup.ensure_ok()?;
    let number: i64 = setup.at(COUNTER_STATEMENT)?;

    client
        .use_namespace(&options.namespace, &options.database)
        .await?;

    let table = RunTable::new(number);
    client
        .query(&table.define_script(), no_vars())
        .await?
        .ensure_ok()?;
    client
        .query(&table.start_statement(), no_vars())
        .await?
        .ensure_ok()?;

    info!(
        namespace = %options.namespace,
        database = %options.database,
        table = %table.ident,
        "run table ready"
    );
    Ok(table)
}

#[derive(Serialize)]
struct CompleteVars {
    code: i32,
}

/// Records the child's exit code and completion time on the catalog entry.
pub async fn mark_completed(
    client: &SurrealClient,
    table: &RunTable,
    code: i32,
) -> Result<(), RpcError> {
    client
        .query(&table.complete_statement(), CompleteVars { code })
        .await?
        .ensure_ok()
}
