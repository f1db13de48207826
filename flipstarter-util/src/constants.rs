// Service names
pub const FLIPSTARTER_CLI_TOOL_NAME: &str = "flipstarter-cli";
pub const FLIPSTARTER_WATCHER_SERVICE_NAME: &str = "flipstarter-watcher";

// Directory constants
pub const FLIPSTARTER_ROOT_DIR: &str = ".flipstarter";

// Electrum (Fulcrum) websocket port
pub const ELECTRUM_WS_PORT: u16 = 50003;

pub const SATS_PER_BCH: u64 = 100_000_000;
