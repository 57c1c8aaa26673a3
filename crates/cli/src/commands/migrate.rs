use crate::commands::CommandResult;
use cartly_core::config::{AppConfig, LoadOptions};
use cartly_db::{connect_with_settings, migrations};

/// Brings the catalog and conversation schema up to date. Safe to rerun;
/// migrations already applied are skipped.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| {
            ("db_connectivity", format!("cannot open catalog database: {error}"), 4u8)
        })?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", format!("schema migration failed: {error}"), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    let known = migrations::MIGRATOR.iter().count();
    match result {
        Ok(()) => {
            CommandResult::success("migrate", format!("schema is current across {known} migrations"))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use cartly_db::migrations;

    #[test]
    fn migrator_knows_the_catalog_and_conversation_steps() {
        let names: Vec<_> =
            migrations::MIGRATOR.iter().map(|m| m.description.to_string()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.contains("catalog")));
        assert!(names.iter().any(|n| n.contains("conversation")));
    }
}
