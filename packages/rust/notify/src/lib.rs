//! Notification rendering and delivery.
//!
//! This crate provides:
//! - [`render`] — turns an enriched record into a block payload with a plain-text fallback
//! - [`WebhookNotifier`] — posts payloads to a chat incoming webhook

pub mod render;
pub mod webhook;

pub use render::{
    Block, FALLBACK_MAX_CHARS, NotificationPayload, PLACEHOLDER, RenderOptions, TextKind,
    TextObject, format_date, render,
};
pub use webhook::WebhookNotifier;
