use planwise_core::config::{LoadOptions, MAX_RECOMMENDATION_COUNT};
use planwise_core::domain::subscriber::SubscriberId;

use crate::commands::{load_config, open_pool, runtime, service, to_data, CommandResult};

pub fn run(options: &LoadOptions, subscriber_id: &str, count: Option<usize>) -> CommandResult {
    let subscriber_id = subscriber_id.trim();
    if subscriber_id.is_empty() {
        return CommandResult::failure("recommend", "invalid_input", "subscriber id is empty", 2);
    }
    if let Some(count) = count {
        if count == 0 || count > MAX_RECOMMENDATION_COUNT {
            return CommandResult::failure(
                "recommend",
                "invalid_input",
                format!("--count must be in range 1..={MAX_RECOMMENDATION_COUNT}"),
                2,
            );
        }
    }

    let config = match load_config("recommend", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("recommend") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let recommendation = service(&config, pool.clone())
            .recommend(&SubscriberId(subscriber_id.to_string()), count)
            .await
            .map_err(|error| ("recommendation", error.to_string(), 8u8));
        pool.close().await;
        recommendation
    });

    match result {
        Ok(recommendation) => {
            let message = format!(
                "{} plan(s) for `{}` via {} path: {}",
                recommendation.plans.len(),
                recommendation.subscriber_id,
                recommendation.path.as_str(),
                recommendation.plan_ids().join(", ")
            );
            CommandResult::success_with_data("recommend", message, to_data(&recommendation))
        }
        Err(failure) => CommandResult::from_failure("recommend", failure),
    }
}
