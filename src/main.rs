//! autoprice CLI - Main entry point.

use anyhow::Context;
use autoprice::cli::{Cli, Commands};
use autoprice::features::{FeatureCodec, FeatureRecord};
use autoprice::model::ModelRegistry;
use autoprice::observability::{self, TrainingMonitor};
use autoprice::serving::{self, PredictionService};
use autoprice::shutdown::{ShutdownCoordinator, SignalHandler};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let config = cli.load_config()?;

    observability::init_logging(&config.observability)?;

    match cli.command {
        Commands::Serve { .. } => {
            autoprice::run(config).await?;
        }

        Commands::Evaluate {
            model_version,
            dataset,
            hold_metrics,
        } => {
            let monitor = Arc::new(TrainingMonitor::new()?);
            let coordinator = ShutdownCoordinator::new();
            let telemetry = if config.monitor.enabled {
                autoprice::spawn_telemetry(&config, monitor.clone(), &coordinator)
            } else {
                Vec::new()
            };

            let evaluation = {
                let config = config.clone();
                let monitor = monitor.clone();
                let version = model_version.clone();
                tokio::task::spawn_blocking(move || {
                    autoprice::run_evaluation(&config, &monitor, &version, &dataset)
                })
                .await?
                .with_context(|| format!("evaluating {}", model_version))?
            };

            println!("{}", serde_json::to_string_pretty(&evaluation)?);

            if hold_metrics && config.monitor.enabled {
                println!(
                    "Serving metrics on http://{}/metrics (Ctrl+C to stop)",
                    config.monitor.metrics_addr
                );
                SignalHandler::new(coordinator.clone()).run().await;
            } else {
                coordinator.shutdown();
            }
            coordinator.drain(telemetry).await;
        }

        Commands::Encode {
            model_version,
            record,
        } => {
            let record = serving::parse_predict_body(record.as_bytes())?;
            let service = PredictionService::new(
                Arc::new(ModelRegistry::new(&config.registry)),
                FeatureCodec::default(),
                Arc::new(TrainingMonitor::new()?),
            );
            let encoded = service.encode_for(&model_version, &record)?;
            print_record(&record);
            println!("{}", serde_json::to_string_pretty(&encoded)?);
        }

        Commands::Version => {
            println!("autoprice {}", env!("CARGO_PKG_VERSION"));
            println!("Vehicle price prediction service");
        }
    }

    Ok(())
}

fn print_record(record: &FeatureRecord) {
    println!("Record:");
    println!("  stock_type:   {}", record.stock_type.as_str());
    println!("  mileage:      {}", record.mileage);
    println!("  msrp:         {}", record.msrp);
    println!("  model_year:   {}", record.model_year);
    println!("  make:         {}", record.make);
    println!("  transmission: {}", record.transmission_from_vin.as_str());
}
