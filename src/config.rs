//! Configuration for the signer relay
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Signer relay - hands documents to a local signing application and back
#[derive(Parser, Debug, Clone)]
#[command(name = "signer-relay")]
#[command(about = "Relay between a browser document workflow and a local signing application")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum accepted document size in bytes (original or signed, decoded)
    #[arg(long, env = "MAX_PAYLOAD_BYTES", default_value = "52428800")]
    pub max_payload_bytes: usize,

    /// Seconds after creation before an ordinary session is swept
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: u64,

    /// Seconds after creation before a pre-staged session is swept
    #[arg(long, env = "PRESTAGE_TTL_SECS", default_value = "1800")]
    pub prestage_ttl_secs: u64,

    /// Seconds a downloaded session is kept to absorb retried downloads
    #[arg(long, env = "GRACE_WINDOW_SECS", default_value = "10")]
    pub grace_window_secs: u64,

    /// Interval of the main retention sweep
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "1800")]
    pub sweep_interval_secs: u64,

    /// Interval of the shorter pass over pre-staged and failed sessions
    #[arg(long, env = "PRESTAGE_SWEEP_INTERVAL_SECS", default_value = "300")]
    pub prestage_sweep_interval_secs: u64,

    /// Directory for file-backed documents. Documents stay in memory when unset.
    #[arg(long, env = "STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Public base URL used to build retrieval URLs
    /// (e.g., "https://relay.example.org"). Derived from the Host header when unset.
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Suffix inserted before ".pdf" in the signed download file name
    #[arg(long, env = "SIGNED_SUFFIX", default_value = "_firmado")]
    pub signed_suffix: String,
}

impl Args {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn prestage_ttl(&self) -> Duration {
        Duration::from_secs(self.prestage_ttl_secs)
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn prestage_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.prestage_sweep_interval_secs)
    }

    /// Upper bound for a request body. Documents may arrive base64-encoded
    /// inside JSON or form bodies, so the raw limit is widened accordingly.
    pub fn max_body_bytes(&self) -> usize {
        self.max_payload_bytes
            .saturating_mul(4)
            .saturating_div(3)
            .saturating_add(64 * 1024)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_payload_bytes == 0 {
            return Err("MAX_PAYLOAD_BYTES must be greater than zero".to_string());
        }

        if self.session_ttl_secs == 0 || self.prestage_ttl_secs == 0 {
            return Err("SESSION_TTL_SECS and PRESTAGE_TTL_SECS must be greater than zero".to_string());
        }

        if self.sweep_interval_secs == 0 || self.prestage_sweep_interval_secs == 0 {
            return Err("Sweep intervals must be greater than zero".to_string());
        }

        if self.grace_window_secs >= self.session_ttl_secs {
            return Err("GRACE_WINDOW_SECS must be shorter than SESSION_TTL_SECS".to_string());
        }

        if self.signed_suffix.contains(['"', '/', '\\']) {
            return Err("SIGNED_SUFFIX must not contain quotes or path separators".to_string());
        }

        Ok(())
    }
}
