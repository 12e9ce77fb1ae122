// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;

pub use error::EngineError;

/// Installs the process-wide fmt subscriber, filtered by `RUST_LOG`.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
  use tracing_subscriber::{fmt, EnvFilter};
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = fmt()
    .with_env_filter(filter)
    .with_target(false)
    .compact()
    .try_init();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn init_tracing_twice_is_harmless() {
    init_tracing();
    init_tracing();
    tracing::info!("still alive");
  }
}
