use clap::Parser;
use dotenv::dotenv;
use nnunet_relay::config::{normalize_args, Cli};
use nnunet_relay::pipeline::Pipeline;
use nnunet_relay::predictor::NnUnetCli;
use nnunet_relay::restorer::UnmappedReason;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    nnunet_relay::init_tracing(cli.verbose);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let predictor =
        NnUnetCli::new(config.predictor_program.clone(), config.environment.clone());
    let mut pipeline = Pipeline::new(config, predictor);
    match pipeline.run() {
        Ok(summary) => {
            let unknown = summary
                .unmapped
                .iter()
                .filter(|u| u.reason == UnmappedReason::UnknownCase);
            for unmapped in unknown {
                println!("[relay] left untouched: {}", unmapped.file_name);
            }
            for original in &summary.missing {
                println!("[relay] no segmentation for: {}", original);
            }
            println!(
                "[relay] Inference done: {} case(s), {} file(s) restored to original names",
                summary.cases,
                summary.restored.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
