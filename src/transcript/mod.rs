//! Transcript reconciliation.
//!
//! The model streams text-lifecycle events (`textStart` / `textOutput` /
//! `textStop`) keyed by an opaque generation id, with no ordering guarantee
//! across the three. This module resolves them into the ordered, role-tagged
//! message list the UI renders.

mod reconciler;

pub use reconciler::{Message, TranscriptReconciler};
