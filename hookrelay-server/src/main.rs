use clap::Parser;
use hookrelay_config::ServerSettings;
use hookrelay_log::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// HookRelay server
#[derive(Parser, Debug)]
#[command(name = "hookrelay-server", version, about)]
struct Args {
    /// Config file (TOML or JSON); defaults to the first server.toml found
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match ServerSettings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("hookrelay-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match LogConfig::for_server(&settings.log_level, &settings.log_format, settings.debug).init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("hookrelay-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    match hookrelay_server::run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}
