use std::path::PathBuf;

use clap::Parser;

/// Which persistence backend the configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Database,
    File,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "telemetryd", about = "Central telemetry server")]
pub struct ServerArgs {
    #[arg(
        short = 'a',
        long,
        env = "ADDRESS",
        default_value = "127.0.0.1:8080",
        help = "Address and port to listen on"
    )]
    pub listen_addr: String,

    #[arg(
        short = 'i',
        long,
        env = "STORE_INTERVAL",
        default_value = "300",
        help = "Seconds between persistence dumps; 0 disables the periodic dump"
    )]
    pub store_interval: u64,

    #[arg(
        short = 'f',
        long,
        env = "FILE_STORAGE_PATH",
        value_hint = clap::ValueHint::FilePath,
        default_value = "/tmp/metrics-db.json",
        help = "Snapshot file path for the file backend"
    )]
    pub file_storage_path: PathBuf,

    #[arg(
        short = 'r',
        long,
        env = "RESTORE",
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Restore persisted metrics before accepting traffic"
    )]
    pub restore: bool,

    #[arg(
        short = 'd',
        long,
        env = "DATABASE_DSN",
        help = "Database DSN; when set it takes precedence over the file backend"
    )]
    pub database_dsn: Option<String>,

    #[arg(
        short = 'k',
        long,
        env = "KEY",
        help = "Shared secret for verifying HashSHA256 request signatures"
    )]
    pub sign_key: Option<String>,
}

impl ServerArgs {
    /// Backend selection: a configured DSN wins over the file path.
    pub fn storage_kind(&self) -> StorageKind {
        if self.database_dsn.as_deref().is_some_and(|dsn| !dsn.is_empty()) {
            StorageKind::Database
        } else {
            StorageKind::File
        }
    }
}
