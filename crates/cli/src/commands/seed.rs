use planwise_core::config::LoadOptions;
use planwise_db::{DemoDataset, SeedOptions};

use crate::commands::{load_config, open_pool, runtime, to_data, CommandFailure, CommandResult};

pub fn run(options: &LoadOptions, seed: Option<u64>, subscribers: Option<usize>) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let defaults = SeedOptions::default();
    let seed_options = SeedOptions {
        seed: seed.unwrap_or(defaults.seed),
        subscribers: subscribers.unwrap_or(defaults.subscribers),
        ..defaults
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let seed_result = DemoDataset::load(&pool, &seed_options)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<_, CommandFailure> = if verification.all_present {
            Ok(seed_result)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => {
            let message = format!(
                "demo dataset loaded: {} plans, {} subscribers, {} subscriptions, {} new usage records",
                seeded.plans, seeded.subscribers, seeded.subscriptions, seeded.usage_records_written
            );
            CommandResult::success_with_data("seed", message, to_data(&seeded))
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_message(&["usage-history", "plan-references"]),
            "seed verification failed for checks: usage-history, plan-references"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "some seed data failed to load");
    }
}
