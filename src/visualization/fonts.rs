//! Font registration for chart text.
//!
//! plotters is built without system font discovery, so a TrueType file has to
//! be registered once per process before any caption or tick label is drawn.
//! Charts skip their text entirely when no font is available.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, warn};
use plotters::style::FontStyle;

/// Family name charts ask for.
pub const FONT_FAMILY: &str = "sans-serif";

static REGISTERED: OnceLock<Option<PathBuf>> = OnceLock::new();

fn register(path: &Path) -> Option<PathBuf> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("font {} unavailable, charts will carry no text: {}", path.display(), e);
            return None;
        }
    };

    // plotters keeps a reference for the lifetime of the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    match plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
        Ok(()) => {
            debug!("registered chart font {}", path.display());
            Some(path.to_path_buf())
        }
        Err(_) => {
            warn!("{} is not a usable TrueType font, charts will carry no text", path.display());
            None
        }
    }
}

/// Whether text can be drawn with the configured font.
///
/// The first configured path is registered for the whole process; later calls
/// with a different path reuse that registration.
pub fn text_available(font_path: Option<&Path>) -> bool {
    match font_path {
        None => false,
        Some(path) => REGISTERED.get_or_init(|| register(path)).is_some(),
    }
}
