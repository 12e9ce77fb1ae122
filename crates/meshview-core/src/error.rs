// SPDX-License-Identifier: CEPL-1.0
//! Typed failure categories the engine surfaces through `anyhow`.
//!
//! Driver call failures stay plain `anyhow` errors with context attached at
//! the call site. The variants here are the ones a caller can meaningfully
//! match on with `err.downcast_ref::<EngineError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
  /// No usable GPU or missing validation layers. Fatal at startup.
  #[error("{0}")]
  Negotiation(String),

  #[error("unknown feature `{name}` for feature struct `{feature_struct}`")]
  UnknownFeature {
    feature_struct: &'static str,
    name: String,
  },

  #[error("unsupported layout transition: {from} -> {to}")]
  UnsupportedTransition { from: String, to: String },

  #[error("texture image format does not support linear blitting: {0}")]
  LinearBlitUnsupported(String),

  #[error("failed to find suitable memory type (type bits {type_bits:#b}, flags {flags})")]
  NoMemoryType { type_bits: u32, flags: String },

  #[error("descriptor mismatch: {0}")]
  DescriptorMismatch(String),

  #[error("framebuffer expects {expected} attachments, got {got}")]
  AttachmentMismatch { expected: usize, got: usize },
}

impl EngineError {
  pub fn no_gpu() -> Self {
    Self::Negotiation("failed to find GPUs with Vulkan support!".into())
  }

  pub fn no_suitable_gpu() -> Self {
    Self::Negotiation("failed to find a suitable GPU!".into())
  }

  pub fn validation_layers_missing() -> Self {
    Self::Negotiation("validation layers requested, but not available!".into())
  }

  /// True for failures that abort startup rather than signal a caller bug.
  pub fn is_negotiation(&self) -> bool {
    matches!(self, Self::Negotiation(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn negotiation_messages_are_stable() {
    assert_eq!(
      EngineError::no_suitable_gpu().to_string(),
      "failed to find a suitable GPU!"
    );
    assert!(EngineError::no_gpu().is_negotiation());
    assert!(!EngineError::DescriptorMismatch("x".into()).is_negotiation());
  }

  #[test]
  fn survives_anyhow_round_trip() {
    let err: anyhow::Error = EngineError::UnsupportedTransition {
      from: "UNDEFINED".into(),
      to: "PRESENT_SRC_KHR".into(),
    }
    .into();
    let back = err.downcast_ref::<EngineError>();
    assert!(matches!(back, Some(EngineError::UnsupportedTransition { .. })));
  }
}
