use planwise_core::config::LoadOptions;

use crate::commands::{load_config, open_pool, runtime, service, to_data, CommandResult};

/// Lists stored model versions and the active one.
pub fn list(options: &LoadOptions) -> CommandResult {
    let config = match load_config("models", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("models") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let status = service(&config, pool.clone())
            .model_status()
            .await
            .map_err(|error| ("artifact_store", error.to_string(), 9u8));
        pool.close().await;
        status
    });

    match result {
        Ok(status) => {
            let active = status
                .active
                .as_ref()
                .map(|active| active.version.clone())
                .unwrap_or_else(|| "none".to_string());
            let message = format!(
                "slot `{}`: {} stored version(s), active: {active}",
                status.slot,
                status.versions.len()
            );
            CommandResult::success_with_data("models", message, to_data(&status))
        }
        Err(failure) => CommandResult::from_failure("models", failure),
    }
}

/// Points the slot at a previously stored version.
pub fn activate(options: &LoadOptions, version: &str) -> CommandResult {
    let config = match load_config("models", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("models") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let activated = service(&config, pool.clone())
            .activate(version)
            .await
            .map_err(|error| ("model_activation", error.to_string(), 9u8));
        pool.close().await;
        activated
    });

    match result {
        Ok(active) => CommandResult::success_with_data(
            "models",
            format!("activated model `{}`", active.version),
            to_data(&active),
        ),
        Err(failure) => CommandResult::from_failure("models", failure),
    }
}
