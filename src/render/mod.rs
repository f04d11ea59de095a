//! Output rendering for the branch forest.

pub mod cli;
pub mod colors;
pub mod json;

pub use cli::{RenderOptions, render_cli};
pub use json::render_json;
