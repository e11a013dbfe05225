use guardload_api::{run_server, telemetry};
use guardload_service::Config;

#[tokio::main]
async fn main() {
    let config = match Config::load().and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = telemetry::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(err) = run_server(config).await {
        tracing::error!(error = %err, "Server terminated with error");
        std::process::exit(1);
    }
}
