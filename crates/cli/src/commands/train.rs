use planwise_core::config::LoadOptions;

use crate::commands::{load_config, open_pool, runtime, service, to_data, CommandResult};

/// Trains and activates a new model version. A failed run exits non-zero and
/// leaves the active model in place.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("train", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("train") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let report = service(&config, pool.clone()).train().await;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    let report = match result {
        Ok(report) => report,
        Err(failure) => return CommandResult::from_failure("train", failure),
    };

    if report.is_success() {
        let message = format!(
            "trained model `{}` on {} rows ({} held out), holdout accuracy {:.3}",
            report.version.as_deref().unwrap_or("unknown"),
            report.training_rows,
            report.holdout_rows,
            report.accuracy.unwrap_or_default()
        );
        CommandResult::success_with_data("train", message, to_data(&report))
    } else {
        let reason = report.reason.clone().unwrap_or_else(|| "training failed".to_string());
        CommandResult::failure_with_data("train", "training_failed", reason, 7, to_data(&report))
    }
}
