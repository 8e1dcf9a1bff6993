//! Outbound body transform seam.
//!
//! The transmitter pushes every body through [`BodyCipher::seal`] after
//! signing and compression. The current wire contract ships bodies in the
//! clear, so sealing is the identity transform; the key file is still read
//! at startup so a misconfigured path fails fast instead of at report time.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use tracing::info;

pub struct BodyCipher {
    key_path: Option<PathBuf>,
}

impl BodyCipher {
    /// Plain cipher: bodies pass through untouched.
    pub fn plaintext() -> Self {
        Self { key_path: None }
    }

    /// Validate the configured key file, if any.
    pub fn from_key_file(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = &path {
            std::fs::read(path)
                .with_context(|| format!("reading crypto key {}", path.display()))?;
            info!("loaded crypto key from {}", path.display());
        }
        Ok(Self { key_path: path })
    }

    pub fn is_enabled(&self) -> bool {
        self.key_path.is_some()
    }

    /// Transform one outbound body.
    pub fn seal(&self, body: Vec<u8>) -> Vec<u8> {
        body
    }
}
