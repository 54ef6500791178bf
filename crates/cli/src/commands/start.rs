use tally_db::{migrations, ping};

use crate::commands::{connect, load_config, runtime, CommandResult};

/// Preflight for `tally-server`: config validates, the database answers and
/// the schema is current. Migrations are applied as the server would.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    if let Err(error) = std::fs::create_dir_all(&config.attachments.root_dir) {
        return CommandResult::failure(
            "start",
            "attachments_storage",
            format!(
                "cannot prepare attachment root `{}`: {error}",
                config.attachments.root_dir.display()
            ),
            8,
        );
    }

    let runtime = match runtime("start") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        ping(&pool).await.map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), crate::commands::Failure>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "preflight passed; tally-server will listen on {}:{} (health on port {})",
                config.server.bind_address, config.server.port, config.server.health_check_port
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
