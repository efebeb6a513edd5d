//! # Structured Logging
//!
//! Span helpers and startup logging using the tracing ecosystem. HTTP
//! requests get their spans from tower-http's TraceLayer; background jobs
//! carry a [`job_span!`](crate::job_span) so their log lines correlate.

/// Create a tracing span for a detached lifecycle job (import, branch start)
#[macro_export]
macro_rules! job_span {
    ($job:expr, $repo:expr) => {
        tracing::info_span!(
            "lifecycle_job",
            job = %$job,
            repo = %$repo,
            job_id = %uuid::Uuid::new_v4()
        )
    };
    ($job:expr, $repo:expr, $($field:tt)*) => {
        tracing::info_span!(
            "lifecycle_job",
            job = %$job,
            repo = %$repo,
            job_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        database_url = %config.database.url,
        image_dir = %config.orchestrator.image_dir,
        mount_prefix = %config.orchestrator.mount_prefix,
        port_range_start = config.orchestrator.port_range_start,
        port_range_end = config.orchestrator.port_range_end,
        "Postbranch control plane configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = job_span!("import", "orders");
        let _span = job_span!("branch_start", "orders", branch = "dev");
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();
        log_config_info(&config);
    }
}
