//! What the display shows, and what it falls back to.
//!
//! [`DisplayState`] is the piece of a viewer that talks to the pipeline: it
//! remembers the last image that resolved successfully and restores it when
//! a later resolve fails, so a bad drop never blanks the screen. Rendering
//! the chosen rendition through a display mode is left to the caller.

use crate::cache::{NEAREST_SUFFIX, Rendition, SMOOTH_SUFFIX};
use crate::imaging::centering_offset;
use crate::pipeline::{PipelineError, Resolved};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How long a UI shows the loading placeholder before restoring the backup
/// after a failure.
pub const FALLBACK_DELAY: Duration = Duration::from_millis(200);

/// Simulated display hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DisplayMode {
    #[default]
    Led,
    LedCircle,
    Crt,
    CrtGreen,
    CrtAmber,
    CrtMono,
    Lcd,
    LcdBlue,
    Vfd,
    VfdYellow,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 10] = [
        DisplayMode::Led,
        DisplayMode::LedCircle,
        DisplayMode::Crt,
        DisplayMode::CrtGreen,
        DisplayMode::CrtAmber,
        DisplayMode::CrtMono,
        DisplayMode::Lcd,
        DisplayMode::LcdBlue,
        DisplayMode::Vfd,
        DisplayMode::VfdYellow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Led => "LED",
            DisplayMode::LedCircle => "LED_CIRCLE",
            DisplayMode::Crt => "CRT",
            DisplayMode::CrtGreen => "CRT_GREEN",
            DisplayMode::CrtAmber => "CRT_AMBER",
            DisplayMode::CrtMono => "CRT_MONO",
            DisplayMode::Lcd => "LCD",
            DisplayMode::LcdBlue => "LCD_BLUE",
            DisplayMode::Vfd => "VFD",
            DisplayMode::VfdYellow => "VFD_YELLOW",
        }
    }

    /// Base hardware: `LED`, `CRT`, `LCD` or `VFD`.
    pub fn mode(self) -> &'static str {
        self.split().0
    }

    /// Variant of the base hardware, lowercase (`LED_CIRCLE` → `circle`).
    pub fn sub_mode(self) -> Option<&'static str> {
        self.split().1
    }

    fn split(self) -> (&'static str, Option<&'static str>) {
        match self {
            DisplayMode::Led => ("LED", None),
            DisplayMode::LedCircle => ("LED", Some("circle")),
            DisplayMode::Crt => ("CRT", None),
            DisplayMode::CrtGreen => ("CRT", Some("green")),
            DisplayMode::CrtAmber => ("CRT", Some("amber")),
            DisplayMode::CrtMono => ("CRT", Some("mono")),
            DisplayMode::Lcd => ("LCD", None),
            DisplayMode::LcdBlue => ("LCD", Some("blue")),
            DisplayMode::Vfd => ("VFD", None),
            DisplayMode::VfdYellow => ("VFD", Some("yellow")),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        DisplayMode::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown display mode `{s}`"))
    }
}

impl TryFrom<String> for DisplayMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DisplayMode> for String {
    fn from(mode: DisplayMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Point `path` at `rendition` of the same cache entry.
///
/// Paths that are not cache entries (placeholders, user files) come back
/// unchanged.
pub fn swap_rendition(path: &Path, rendition: Rendition) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    let hash = name
        .strip_suffix(NEAREST_SUFFIX)
        .or_else(|| name.strip_suffix(SMOOTH_SUFFIX));

    match hash {
        Some(h) if h.len() == 64 && h.bytes().all(|b| b.is_ascii_hexdigit()) => {
            path.with_file_name(format!("{h}{}", rendition.suffix()))
        }
        _ => path.to_path_buf(),
    }
}

/// Result of handing a resolve outcome to the display.
#[derive(Debug)]
pub enum Presented {
    Shown(PathBuf),
    /// The resolve failed; `path` is the restored backup, if there was one.
    Restored {
        path: Option<PathBuf>,
        error: PipelineError,
    },
}

impl Presented {
    /// How long to keep the loading placeholder up before drawing this
    /// result: zero for a new image, [`FALLBACK_DELAY`] for a restore.
    pub fn delay(&self) -> Duration {
        match self {
            Presented::Shown(_) => Duration::ZERO,
            Presented::Restored { .. } => FALLBACK_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    mode: DisplayMode,
    rendition: Rendition,
    current: Option<PathBuf>,
    backup: Option<PathBuf>,
    offset: (f64, f64),
}

impl DisplayState {
    pub fn new(mode: DisplayMode, rendition: Rendition) -> Self {
        Self {
            mode,
            rendition,
            current: None,
            backup: None,
            offset: (0.0, 0.0),
        }
    }

    /// Start out showing `path` (a bundled default image, say).
    pub fn with_initial(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.offset = offset_of(&path);
        self.current = Some(path.clone());
        self.backup = Some(path);
        self
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    pub fn rendition(&self) -> Rendition {
        self.rendition
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// `(x, y)` shift applied when drawing the current image.
    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }

    /// Show a placeholder while a conversion runs. The backup is kept.
    pub fn begin_loading(&mut self, placeholder: impl Into<PathBuf>) {
        self.current = Some(placeholder.into());
    }

    pub fn present(&mut self, result: Result<Resolved, PipelineError>) -> Presented {
        match result {
            Ok(resolved) => {
                let path = swap_rendition(&resolved.path, self.rendition);
                self.offset = offset_of(&path);
                self.current = Some(path.clone());
                self.backup = Some(path.clone());
                Presented::Shown(path)
            }
            Err(error) => {
                warn!("Keeping previous image: {}", error);
                self.current = self.backup.clone();
                Presented::Restored {
                    path: self.backup.clone(),
                    error,
                }
            }
        }
    }

    pub fn set_rendition(&mut self, rendition: Rendition) {
        self.rendition = rendition;
        self.current = self.current.as_deref().map(|p| swap_rendition(p, rendition));
        self.backup = self.backup.as_deref().map(|p| swap_rendition(p, rendition));
    }

    pub fn toggle_rendition(&mut self) -> Rendition {
        self.set_rendition(self.rendition.toggled());
        self.rendition
    }
}

fn offset_of(path: &Path) -> (f64, f64) {
    image::image_dimensions(path)
        .map(centering_offset)
        .unwrap_or((0.0, 0.0))
}
