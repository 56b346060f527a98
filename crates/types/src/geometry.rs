//! Paper formats, lengths, and the viewport arithmetic used to shape a
//! rendering context before and after content is loaded.
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// CSS reference resolution used by the engine for layout.
pub const PX_PER_INCH: f64 = 96.0;
pub const PT_PER_INCH: f64 = 72.0;
pub const MM_PER_INCH: f64 = 25.4;

/// ISO 216 A-series sheet sizes in millimetres, portrait, indexed by format number.
const ISO_A_MM: [(f64, f64); 11] = [
    (841.0, 1189.0),
    (594.0, 841.0),
    (420.0, 594.0),
    (297.0, 420.0),
    (210.0, 297.0),
    (148.0, 210.0),
    (105.0, 148.0),
    (74.0, 105.0),
    (52.0, 74.0),
    (37.0, 52.0),
    (26.0, 37.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaperFormat {
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
    A7,
    A8,
    A9,
    A10,
    Letter,
    Legal,
    Tabloid,
    Ledger,
}

impl PaperFormat {
    /// The A-series format number, `None` for the North-American sizes.
    pub fn iso_a_index(self) -> Option<usize> {
        match self {
            PaperFormat::A0 => Some(0),
            PaperFormat::A1 => Some(1),
            PaperFormat::A2 => Some(2),
            PaperFormat::A3 => Some(3),
            PaperFormat::A4 => Some(4),
            PaperFormat::A5 => Some(5),
            PaperFormat::A6 => Some(6),
            PaperFormat::A7 => Some(7),
            PaperFormat::A8 => Some(8),
            PaperFormat::A9 => Some(9),
            PaperFormat::A10 => Some(10),
            _ => None,
        }
    }

    /// Portrait width and height in inches.
    pub fn size_inches(self) -> (f64, f64) {
        if let Some(index) = self.iso_a_index() {
            let (w, h) = ISO_A_MM[index];
            return (w / MM_PER_INCH, h / MM_PER_INCH);
        }
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            // Ledger is tabloid turned on its side.
            _ => (17.0, 11.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PaperFormat::A0 => "a0",
            PaperFormat::A1 => "a1",
            PaperFormat::A2 => "a2",
            PaperFormat::A3 => "a3",
            PaperFormat::A4 => "a4",
            PaperFormat::A5 => "a5",
            PaperFormat::A6 => "a6",
            PaperFormat::A7 => "a7",
            PaperFormat::A8 => "a8",
            PaperFormat::A9 => "a9",
            PaperFormat::A10 => "a10",
            PaperFormat::Letter => "letter",
            PaperFormat::Legal => "legal",
            PaperFormat::Tabloid => "tabloid",
            PaperFormat::Ledger => "ledger",
        }
    }
}

impl fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("Unknown paper format: '{0}'")]
    UnknownFormat(String),
    #[error("Invalid length: '{0}'")]
    InvalidLength(String),
}

impl FromStr for PaperFormat {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "a0" => PaperFormat::A0,
            "a1" => PaperFormat::A1,
            "a2" => PaperFormat::A2,
            "a3" => PaperFormat::A3,
            "a4" => PaperFormat::A4,
            "a5" => PaperFormat::A5,
            "a6" => PaperFormat::A6,
            "a7" => PaperFormat::A7,
            "a8" => PaperFormat::A8,
            "a9" => PaperFormat::A9,
            "a10" => PaperFormat::A10,
            "letter" => PaperFormat::Letter,
            "legal" => PaperFormat::Legal,
            "tabloid" => PaperFormat::Tabloid,
            "ledger" => PaperFormat::Ledger,
            _ => return Err(GeometryError::UnknownFormat(s.to_string())),
        };
        Ok(format)
    }
}

impl Serialize for PaperFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for PaperFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A non-negative CSS length. A bare number is read as pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f64),
    In(f64),
    Cm(f64),
    Mm(f64),
    Pt(f64),
}

impl Default for Length {
    fn default() -> Self {
        Length::Px(0.0)
    }
}

impl Length {
    pub fn to_inches(self) -> f64 {
        match self {
            Length::Px(v) => v / PX_PER_INCH,
            Length::In(v) => v,
            Length::Cm(v) => v * 10.0 / MM_PER_INCH,
            Length::Mm(v) => v / MM_PER_INCH,
            Length::Pt(v) => v / PT_PER_INCH,
        }
    }

    pub fn to_px(self) -> f64 {
        self.to_inches() * PX_PER_INCH
    }

    pub fn is_zero(self) -> bool {
        self.to_inches() == 0.0
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Px(v) => write!(f, "{v}px"),
            Length::In(v) => write!(f, "{v}in"),
            Length::Cm(v) => write!(f, "{v}cm"),
            Length::Mm(v) => write!(f, "{v}mm"),
            Length::Pt(v) => write!(f, "{v}pt"),
        }
    }
}

impl FromStr for Length {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| GeometryError::InvalidLength(s.to_string()))?;
        if !value.is_finite() {
            return Err(GeometryError::InvalidLength(s.to_string()));
        }
        match unit.trim() {
            "" | "px" => Ok(Length::Px(value)),
            "in" => Ok(Length::In(value)),
            "cm" => Ok(Length::Cm(value)),
            "mm" => Ok(Length::Mm(value)),
            "pt" => Ok(Length::Pt(value)),
            _ => Err(GeometryError::InvalidLength(s.to_string())),
        }
    }
}

impl Serialize for Length {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Length {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum LengthDef {
            Number(f64),
            Str(String),
        }

        match LengthDef::deserialize(deserializer)? {
            LengthDef::Number(v) if v >= 0.0 && v.is_finite() => Ok(Length::Px(v)),
            LengthDef::Number(v) => Err(de::Error::custom(format!("Invalid length: {v}"))),
            LengthDef::Str(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Sizes a rendering context's viewport to the shape of the eventual output
/// page so that layout before printing matches the page.
pub fn viewport_for(format: PaperFormat, landscape: bool) -> Viewport {
    let (w, h) = format.size_inches();
    let (w, h) = if landscape { (h, w) } else { (w, h) };
    Viewport {
        width: (w * PX_PER_INCH).round() as u32,
        height: (h * PX_PER_INCH).round() as u32,
    }
}

/// The rendered content's bounding box in CSS pixels, measured after load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentBox {
    pub width: f64,
    pub height: f64,
}

impl ContentBox {
    /// Reduces the scroll/offset/client extents reported for the body and the
    /// root element to the largest value per axis.
    pub fn from_extents(widths: &[f64], heights: &[f64]) -> Self {
        let max = |values: &[f64]| {
            values
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(0.0_f64, f64::max)
        };
        Self {
            width: max(widths),
            height: max(heights),
        }
    }
}
