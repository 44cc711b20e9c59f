//! taskexec binary entry point.

use std::io::Write;
use std::process::ExitCode;

use taskexec::cli::{self, Args};
use taskexec::config::Config;
use taskexec::{logging, ExecContext};
use tracing::{debug, error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'taskexec --help' for usage");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::try_init(config.log_filter()) {
        eprintln!("warning: logging already initialized: {}", e);
    }

    run(&args, &config).await
}

async fn run(args: &Args, config: &Config) -> ExitCode {
    let Some(command) = args.to_command() else {
        return ExitCode::from(2);
    };

    let executor = config.to_executor();

    if args.show_timeout {
        let timeout = executor
            .timeouts()
            .resolve(&command.name, command.args.as_slice());
        println!("{}", timeout.as_secs());
        return ExitCode::SUCCESS;
    }

    let ctx = ExecContext::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; canceling");
            interrupt.cancel();
        }
    });

    debug!(?config, "loaded configuration");

    match executor
        .run_with_retry(&ctx, &config.retry_policy(), &command)
        .await
    {
        Ok(outcome) => {
            if args.output {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = stdout
                    .write_all(&outcome.raw_stdout)
                    .and_then(|()| stdout.flush())
                {
                    error!("failed to write output: {}", e);
                    return ExitCode::from(cli::EXIT_FAILURE);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(cli::exit_status(&e))
        }
    }
}
