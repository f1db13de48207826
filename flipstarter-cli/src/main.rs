mod cmd;
mod config;
mod tool;

#[macro_use]
extern crate log;

use clap::Parser;
use cmd::Cli;
use flipstarter_util::LogConfig;
use tool::FlipstarterTool;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The watcher logs to file like a service, one-shot commands to the console
    let log_config = if cli.command.is_service() {
        LogConfig::new(flipstarter_util::FLIPSTARTER_WATCHER_SERVICE_NAME).enable_console(false)
    } else {
        LogConfig::new(flipstarter_util::FLIPSTARTER_CLI_TOOL_NAME)
            .enable_file(false)
            .enable_console(true)
    };
    let _logger = flipstarter_util::init_log(log_config);

    let tool = match FlipstarterTool::new(&cli) {
        Ok(tool) => tool,
        Err(e) => {
            println!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tool.process_command(cli.command).await {
        let msg = format!("Error processing command: {}", e);
        println!("{}", msg);
        std::process::exit(1);
    }
}
