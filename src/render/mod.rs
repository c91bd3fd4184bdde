// SPDX-License-Identifier: MPL-2.0

//! Loot tooltip screenshots.
//!
//! Every render goes through [`RenderQueue`], a single worker that owns the
//! browser. [`TooltipRenderer`] holds the cache/retry/degrade policy and
//! talks to the browser through [`PageDriver`](renderer::PageDriver); [`ChromeDriver`] is the
//! chromiumoxide implementation.

mod browser;
mod compose;
mod queue;
mod renderer;

pub use browser::ChromeDriver;
pub use queue::{RenderBackend, RenderQueue};
pub use renderer::{RenderOptions, TooltipRenderer};

use crate::cache::CacheError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("browser error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("tooltip markup missing on {0}")]
    MissingTooltip(String),
    #[error("unexpected script result: {0}")]
    Script(#[from] serde_json::Error),
    #[error("screenshot is not a valid image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("render queue is closed")]
    QueueClosed,
    #[error("render job panicked")]
    Panicked,
}
