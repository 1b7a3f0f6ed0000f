mod cli;
mod exit;
mod logging;
mod output;

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use clap::Parser;
use nativebridge_host::{ProcessLifecycleManager, ProcessMarker, ShutdownTrigger};

use crate::cli::Cli;
use crate::exit::{host_error, io_error, CliResult, FAILURE, SUCCESS};
use crate::logging::{init_logging, install_panic_hook};
use crate::output::{print_status, OutputFormat, StatusReport};

// Blocking stdin reads are abandoned after this on exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);
    install_panic_hook();

    let result = if cli.status {
        run_status(&cli)
    } else {
        run_bridge(&cli)
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "nativebridge failed");
            std::process::exit(err.code);
        }
    }
}

fn run_status(cli: &Cli) -> CliResult<i32> {
    let path = cli.marker_path();
    let status = ProcessMarker::new(&path)
        .status()
        .map_err(|err| host_error("failed to read marker", err))?;
    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    print_status(&StatusReport::new(&path, status), format);
    Ok(if status.is_live() { SUCCESS } else { FAILURE })
}

fn run_bridge(cli: &Cli) -> CliResult<i32> {
    let config = cli.bridge_config();
    if !cli.browser_args.is_empty() {
        tracing::debug!(args = ?cli.browser_args, "ignoring browser-supplied arguments");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))?;

    let manager = ProcessLifecycleManager::new(config);
    let coordinator = manager.coordinator();

    // A panic escaping the bridge future unwinds through the marker guard,
    // which removes the marker on drop.
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(manager.run_stdio())
    }));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    match outcome {
        Ok(code) => Ok(code),
        Err(_) => {
            coordinator.trigger(ShutdownTrigger::Fatal("bridge panicked".to_string()));
            Ok(FAILURE)
        }
    }
}
