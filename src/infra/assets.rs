//! Bundled font assets resolved at runtime.

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;

/// Resolves font names against a directory of bundled `.ttf` assets.
///
/// A font is a hard dependency for any text placement: there is no silent
/// fallback font, so a name with no matching asset is surfaced to the
/// caller. The edit boundary is expected to validate availability up front
/// so exports do not fail late.
#[derive(Debug, Clone)]
pub struct FontLibrary {
    fonts_dir: PathBuf,
}

impl FontLibrary {
    pub fn new(fonts_dir: impl Into<PathBuf>) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
        }
    }

    /// Path the named font would live at, if present.
    pub fn resolve(&self, font_name: &str) -> Option<PathBuf> {
        let path = self.path_for(font_name);
        path.is_file().then_some(path)
    }

    pub fn is_available(&self, font_name: &str) -> bool {
        self.resolve(font_name).is_some()
    }

    /// Load the named font, or report which asset was missing.
    pub fn load(&self, font_name: &str) -> Result<FontVec, MissingFont> {
        let path = self.resolve(font_name).ok_or_else(|| MissingFont {
            font_name: font_name.to_string(),
        })?;
        let bytes = std::fs::read(&path).map_err(|_| MissingFont {
            font_name: font_name.to_string(),
        })?;
        FontVec::try_from_vec(bytes).map_err(|_| MissingFont {
            font_name: font_name.to_string(),
        })
    }

    fn path_for(&self, font_name: &str) -> PathBuf {
        self.fonts_dir.join(format!("{font_name}.ttf"))
    }

    pub fn fonts_dir(&self) -> &Path {
        &self.fonts_dir
    }
}

/// No bundled asset matches the requested font name.
#[derive(Debug, thiserror::Error)]
#[error("no bundled font asset named `{font_name}`")]
pub struct MissingFont {
    pub font_name: String,
}
