//! Shared domain value types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Alphabet user codes are drawn from. Visually ambiguous characters are
/// excluded; existing codes in the wild depend on this exact set.
pub const USER_CODE_ALPHABET: &[u8] = b"bcfghklmopqrsuwxyz0123456789";

/// Fixed length of a user code.
pub const USER_CODE_LEN: usize = 4;

/// Opaque 4-character code identifying a user. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserCode(String);

impl UserCode {
    pub fn new(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        if code.len() != USER_CODE_LEN {
            return Err(DomainError::validation(format!(
                "user code must be {USER_CODE_LEN} characters, got {}",
                code.len()
            )));
        }
        if !code.bytes().all(|b| USER_CODE_ALPHABET.contains(&b)) {
            return Err(DomainError::validation(
                "user code contains characters outside the code alphabet",
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserCode> for String {
    fn from(code: UserCode) -> Self {
        code.0
    }
}

/// Output kind for exported renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Pdf,
}

impl ExportFormat {
    /// File extension used for numbered output files and archive entries.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(DomainError::validation(format!(
                "unsupported export format `{other}`"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Text color in the `#RRGGBBAA` wire format (9 characters including `#`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RgbaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl RgbaColor {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }

    /// Alpha as a factor in `0.0..=1.0` (`last byte / 255`).
    pub fn alpha_factor(&self) -> f32 {
        f32::from(self.a) / 255.0
    }
}

impl FromStr for RgbaColor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').ok_or_else(|| {
            DomainError::validation(format!("color `{s}` must start with `#`"))
        })?;
        // Length is in bytes; the ASCII check keeps the slicing below from
        // landing inside a multi-byte character.
        if hex.len() != 8 || !hex.is_ascii() {
            return Err(DomainError::validation(format!(
                "color `{s}` must be 8 hex digits (#RRGGBBAA)"
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| {
                DomainError::validation(format!("color `{s}` contains non-hex digits"))
            })
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
            a: channel(6..8)?,
        })
    }
}

impl fmt::Display for RgbaColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

impl TryFrom<String> for RgbaColor {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RgbaColor> for String {
    fn from(color: RgbaColor) -> Self {
        color.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_code_accepts_alphabet_members() {
        let code = UserCode::new("b3x9").expect("valid code");
        assert_eq!(code.as_str(), "b3x9");
    }

    #[test]
    fn user_code_rejects_wrong_length_and_alphabet() {
        assert!(UserCode::new("abc").is_err());
        assert!(UserCode::new("abcde").is_err());
        // `a` and `A` are outside the code alphabet.
        assert!(UserCode::new("aaaa").is_err());
        assert!(UserCode::new("BBBB").is_err());
    }

    #[test]
    fn export_format_parses_aliases() {
        assert_eq!("png".parse::<ExportFormat>().unwrap(), ExportFormat::Png);
        assert_eq!("JPG".parse::<ExportFormat>().unwrap(), ExportFormat::Jpeg);
        assert_eq!("pdf".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert!("gif".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn color_decodes_opaque() {
        let color: RgbaColor = "#336699FF".parse().unwrap();
        assert_eq!(color.rgb(), (51, 102, 153));
        assert_eq!(color.alpha_factor(), 1.0);
    }

    #[test]
    fn color_decodes_half_alpha() {
        let color: RgbaColor = "#33669980".parse().unwrap();
        assert_eq!(color.rgb(), (51, 102, 153));
        assert!((color.alpha_factor() - 0.502).abs() < 0.001);
    }

    #[test]
    fn color_rejects_malformed_input() {
        assert!("336699FF".parse::<RgbaColor>().is_err());
        assert!("#336699".parse::<RgbaColor>().is_err());
        assert!("#3366997g".parse::<RgbaColor>().is_err());
    }

    #[test]
    fn color_rejects_multibyte_input_without_panicking() {
        // 8 bytes but not 8 ASCII characters; byte-offset slicing must not
        // split the two-byte `é`.
        assert!("#a\u{e9}xxxxx".parse::<RgbaColor>().is_err());
        assert!("#ééé39".parse::<RgbaColor>().is_err());
    }

    #[test]
    fn color_roundtrips_through_display() {
        let color: RgbaColor = "#aa33ffff".parse().unwrap();
        assert_eq!(color.to_string(), "#aa33ffff");
    }
}
