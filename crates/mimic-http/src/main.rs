use anyhow::Context;
use clap::Parser;
use mimic_http::dump::DumpSource;
use mimic_http::hooks::{HookDispatcher, HookProgram, RhaiHook};
use mimic_http::{Cli, Server, ServerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::load(&cli).context("failed to load configuration")?;
    let dumps = config.existing_dumps();
    if dumps.is_empty() {
        warn!("No dump files loaded, every request will be answered with 400");
    }
    let hooks = compile_hooks(&config.existing_hooks());

    if cli.check {
        return Ok(check(&config.dumps, config.hooks.len(), hooks.len()).await);
    }

    let dispatcher =
        HookDispatcher::new(hooks, &config.hook_pool).context("failed to start hook workers")?;
    let server = Server::start(&config, dumps, dispatcher)
        .await
        .context("failed to start server")?;

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Mimic listening on http://{}", listener.local_addr()?);

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    server.shutdown().await;

    info!("Mimic stopped");
    Ok(ExitCode::SUCCESS)
}

/// Compile every hook. One that cannot be read or compiled is skipped.
fn compile_hooks(paths: &[PathBuf]) -> Vec<Arc<dyn HookProgram>> {
    paths
        .iter()
        .filter_map(|path| match RhaiHook::from_file(path) {
            Ok(hook) => {
                info!(hook = %path.display(), "Hook compiled");
                Some(Arc::new(hook) as Arc<dyn HookProgram>)
            }
            Err(e) => {
                warn!(error = %e, "Skipping hook");
                None
            }
        })
        .collect()
}

/// `--check`: report what would be served, without serving it.
async fn check(dumps: &[PathBuf], configured_hooks: usize, compiled_hooks: usize) -> ExitCode {
    let mut failed = 0;
    let mut total = 0;

    for path in dumps {
        let result = match DumpSource::read(path).await {
            Ok(source) => source.parse(),
            Err(e) => Err(e),
        };
        match result {
            Ok(rules) => {
                println!("{}: {} rule(s)", path.display(), rules.len());
                total += rules.len();
            }
            Err(e) => {
                println!("{}: FAILED: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    println!(
        "{} dump(s), {} rule(s), {} of {} hook(s) compiled",
        dumps.len(),
        total,
        compiled_hooks,
        configured_hooks
    );

    if failed > 0 || compiled_hooks < configured_hooks {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
