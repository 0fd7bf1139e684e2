use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Dependencies whose logs are hidden below Trace. The HTTP stack logs every
/// request and every open event stream, which drowns out pipeline activity.
const FILTERED_MODULES: &[&str] = &["tower", "tower_http", "tower_sessions", "hyper", "axum"];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the configured level.
    ///
    /// Colors are disabled in production where output goes to a log collector.
    pub fn init_logger(config: &Config) {
        let level = config.log_level_filter;
        let color_choice = if config.is_production() {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };

        if let Err(e) = TermLogger::init(
            level,
            Self::build_log_config(level),
            TerminalMode::Mixed,
            color_choice,
        ) {
            eprintln!("Failed to start simplelog: {e}");
        }
    }

    fn build_log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if Self::filters_dependencies(level) {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }

    fn filters_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_stack_is_filtered() {
        for module in ["tower", "tower_sessions", "hyper", "axum"] {
            assert!(
                FILTERED_MODULES.contains(&module),
                "{module} should be filtered"
            );
        }
    }

    #[test]
    fn pipeline_crates_are_never_filtered() {
        for module in ["broker", "notifications", "sse", "web"] {
            assert!(!FILTERED_MODULES.contains(&module));
        }
    }

    #[test]
    fn only_trace_shows_dependency_logs() {
        assert!(!Logger::filters_dependencies(LevelFilter::Trace));
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
        ] {
            assert!(
                Logger::filters_dependencies(level),
                "{level} should filter dependency logs"
            );
        }
    }

    #[test]
    fn log_config_builds_at_every_level() {
        let _filtered = Logger::build_log_config(LevelFilter::Info);
        let _unfiltered = Logger::build_log_config(LevelFilter::Trace);
    }
}
