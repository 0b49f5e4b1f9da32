use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use crate::monitor::logic::start_monitor;
use crate::system::domain::{init_tracing, start_signal_listener, System,
                            EXIT_RUNTIME_FAILURE, EXIT_STARTUP_FAILURE};

mod alerts;
mod circuit;
mod config;
mod context;
mod database;
mod monitor;
mod room;
mod sensors;
mod status;
mod system;

#[cfg(test)]
mod test_support;


#[tokio::main]
async fn main() -> ExitCode {

    let system = match System::new() {
        Ok(system) => system,
        Err(e) => {
            // Sin configuración aún no hay subscriber de tracing
            eprintln!("Error: configuración inválida: {e}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    init_tracing(&system);
    info!("Info: iniciando monitor de calefacción ({})", system.environment);

    let (tx_shutdown, rx_shutdown) = watch::channel(false);
    start_signal_listener(tx_shutdown);

    let outcome = match tokio::spawn(start_monitor(system, rx_shutdown)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Error: el monitor terminó inesperadamente: {e}");
            return ExitCode::from(EXIT_RUNTIME_FAILURE);
        }
    };

    info!(cycles = outcome.cycles, failed_cycles = outcome.failed_cycles,
          "Info: monitor detenido ({})", outcome.state.as_str());

    ExitCode::from(outcome.exit_code)
}
