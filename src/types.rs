use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Output framing for a capture: both the emulated viewport and the clip rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Viewport {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Device scale factor (DPR). Default is 1.0.
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1024,
            device_scale_factor: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// The clip rectangle anchored at the page origin.
    pub fn clip(&self) -> ClipRegion {
        ClipRegion::new(0.0, 0.0, self.width as f64, self.height as f64)
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `WIDTHxHEIGHT`, e.g. `1280x1024`.
impl FromStr for Viewport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let width = w.trim().parse().context("invalid width")?;
        let height = h.trim().parse().context("invalid height")?;
        Ok(Self::new(width, height))
    }
}

/// Screenshot format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
        }
    }

    /// Picks the format from the output file extension, falling back to PNG.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jpg" | "jpeg") => ImageFormat::Jpeg,
            Some("webp") => ImageFormat::WebP,
            _ => ImageFormat::Png,
        }
    }
}

/// Defines a rectangular region for clipping screenshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl ClipRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn viewport_parses_width_by_height() {
        let vp: Viewport = "800x600".parse().unwrap();
        assert_eq!((vp.width, vp.height), (800, 600));
        assert_eq!(vp.device_scale_factor, 1.0);
        assert!("800".parse::<Viewport>().is_err());
        assert!("axb".parse::<Viewport>().is_err());
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ImageFormat::from_path(&PathBuf::from("a.JPG")), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("a.webp")), ImageFormat::WebP);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("a.png")), ImageFormat::Png);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("noext")), ImageFormat::Png);
    }

    #[test]
    fn clip_covers_viewport() {
        let clip = Viewport::new(1280, 1024).clip();
        assert_eq!(clip, ClipRegion::new(0.0, 0.0, 1280.0, 1024.0));
    }
}
