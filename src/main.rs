//! Binary entry point for the snapdump CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use clap::error::ErrorKind;
use thiserror::Error;

use snapdump::{
    DumpConfig, DumpOrchestrator, Dumper, RdsConfig, RdsControlPlane, RdsControlPlaneError,
    RunError, RunSettings, WriteProgress,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Run(#[from] RunError<RdsControlPlaneError>),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Run(err) => err.exit_code(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // A missing operand exits 1 with the usage message per the
            // CLI contract; help and version requests exit 0.
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            err.print().ok();
            process::exit(code);
        }
    };

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let rds_config =
        RdsConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    rds_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let dump_config =
        DumpConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    dump_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let control = RdsControlPlane::connect(&rds_config).await;
    let dumper = Dumper::with_process_runner(
        Utf8PathBuf::from(dump_config.output_dir.clone()),
        dump_config.credential_rules(),
    );
    let settings = RunSettings {
        instance_class: rds_config.instance_class.clone(),
        subnet_group: rds_config.subnet_group.clone(),
        databases: dump_config.databases.clone(),
    };
    let orchestrator = DumpOrchestrator::new(
        control,
        dumper,
        rds_config.poller(),
        rds_config.control_retry(),
        dump_config.dump_retry(&rds_config),
        settings,
    );

    let mut progress = WriteProgress::new(io::stdout());
    orchestrator
        .execute(&cli.source_instance, &cli.databases, &mut progress)
        .await?;

    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
