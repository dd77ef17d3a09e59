use clap::{Parser, Subcommand};

/// Voice Bridge - connects voice-controlled devices to Spotify playback
#[derive(Parser)]
#[command(name = "voice-bridge", version, about)]
pub struct Cli {
    /// Optional TOML configuration file (environment variables override it)
    #[arg(short, long, env = "VOICE_BRIDGE_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Address to bind, overrides BIND_ADDRESS
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print a fresh base64-encoded 32-byte encryption key
    GenerateKey,

    /// Report which required configuration values are set
    CheckConfig,

    /// List authenticated devices
    ListDevices,

    /// Delete a device's stored credentials so it must authorize again
    RemoveDevice {
        /// Device identifier
        device_id: String,
    },

    /// Delete credentials not updated within the retention window
    Purge {
        /// Retention window in days, overrides RETENTION_DAYS
        #[arg(long)]
        days: Option<i64>,
    },
}
