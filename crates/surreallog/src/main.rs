use clap::Parser;
use surreallog::{app, Cli};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_new(format!("tungstenite=off,tokio_tungstenite=off,{directive}"))
        .unwrap_or_else(|err| {
            eprintln!("surreallog: invalid log level {directive:?} ({err}), using info");
            EnvFilter::new("info")
        });
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("surreallog: failed to install logger: {err}");
    }
    debug!("logging enabled");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let options = match cli.into_options() {
        Ok(options) => options,
        Err(err) => {
            error!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let code = app::run(options).await;
    std::process::exit(code);
}
