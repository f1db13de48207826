use super::dirs::get_service_dir;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, detailed_format,
};

pub struct LogConfig {
    pub service_name: String,
    pub file_name: Option<String>,
    pub console: bool,
    pub file: bool,
}

impl LogConfig {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            file_name: None,
            console: false,
            file: true,
        }
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    pub fn enable_console(mut self, enable: bool) -> Self {
        self.console = enable;
        self
    }

    pub fn enable_file(mut self, enable: bool) -> Self {
        self.file = enable;
        self
    }
}

// The returned handle must be kept alive for as long as the process logs.
pub fn init_log(config: LogConfig) -> LoggerHandle {
    let logger = Logger::try_with_env_or_str("info")
        .expect("Invalid log specification")
        .format(detailed_format);

    let logger = if config.file {
        let log_dir = get_service_dir(&config.service_name).join("logs");
        std::fs::create_dir_all(&log_dir).expect("Failed to create log directory");

        let file_name = config.file_name.unwrap_or(config.service_name);
        let logger = logger
            .log_to_file(FileSpec::default().directory(log_dir).basename(file_name))
            .rotate(
                Criterion::Size(100_000_000), // Rotate when file size reaches 100 MB
                Naming::Timestamps,
                Cleanup::KeepLogFiles(20),
            );

        if config.console {
            logger.duplicate_to_stderr(Duplicate::All)
        } else {
            logger
        }
    } else {
        logger.log_to_stderr()
    };

    logger.start().expect("Failed to initialize flexi_logger")
}
