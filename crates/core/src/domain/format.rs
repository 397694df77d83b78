// Aspect Formats - the fixed catalogue of social-media output frames

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectFormat {
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "4:5")]
    Portrait,
    #[serde(rename = "2:3")]
    Pinterest,
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectFormat {
    pub const ALL: [AspectFormat; 6] = [
        AspectFormat::Vertical,
        AspectFormat::Square,
        AspectFormat::Landscape,
        AspectFormat::Portrait,
        AspectFormat::Pinterest,
        AspectFormat::Ultrawide,
    ];

    pub fn ratio(&self) -> &'static str {
        match self {
            AspectFormat::Vertical => "9:16",
            AspectFormat::Square => "1:1",
            AspectFormat::Landscape => "16:9",
            AspectFormat::Portrait => "4:5",
            AspectFormat::Pinterest => "2:3",
            AspectFormat::Ultrawide => "21:9",
        }
    }

    /// Target frame size in pixels (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectFormat::Vertical => (1080, 1920),
            AspectFormat::Square => (1080, 1080),
            AspectFormat::Landscape => (1920, 1080),
            AspectFormat::Portrait => (1080, 1350),
            AspectFormat::Pinterest => (1080, 1620),
            AspectFormat::Ultrawide => (2520, 1080),
        }
    }

    /// Output file stem
    pub fn name(&self) -> &'static str {
        match self {
            AspectFormat::Vertical => "vertical_9-16",
            AspectFormat::Square => "square_1-1",
            AspectFormat::Landscape => "landscape_16-9",
            AspectFormat::Portrait => "portrait_4-5",
            AspectFormat::Pinterest => "pinterest_2-3",
            AspectFormat::Ultrawide => "ultrawide_21-9",
        }
    }
}

impl fmt::Display for AspectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ratio())
    }
}

impl FromStr for AspectFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|format| format.ratio() == wanted)
            .ok_or_else(|| {
                let available: Vec<&str> = Self::ALL.iter().map(|f| f.ratio()).collect();
                DomainError::ValidationError(format!(
                    "unknown format '{}'. Available: {}",
                    wanted,
                    available.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_ratios() {
        assert_eq!("9:16".parse::<AspectFormat>().unwrap(), AspectFormat::Vertical);
        assert_eq!(" 21:9 ".parse::<AspectFormat>().unwrap(), AspectFormat::Ultrawide);
        for format in AspectFormat::ALL {
            assert_eq!(format.ratio().parse::<AspectFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_parse_unknown_lists_available() {
        let err = "3:2".parse::<AspectFormat>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("3:2"));
        assert!(msg.contains("9:16, 1:1, 16:9, 4:5, 2:3, 21:9"));
    }

    #[test]
    fn test_dimensions_and_names() {
        assert_eq!(AspectFormat::Portrait.dimensions(), (1080, 1350));
        assert_eq!(AspectFormat::Ultrawide.dimensions(), (2520, 1080));
        assert_eq!(AspectFormat::Pinterest.name(), "pinterest_2-3");
    }

    #[test]
    fn test_serde_uses_ratio_strings() {
        let json = serde_json::to_string(&AspectFormat::Landscape).unwrap();
        assert_eq!(json, "\"16:9\"");
        let parsed: AspectFormat = serde_json::from_str("\"4:5\"").unwrap();
        assert_eq!(parsed, AspectFormat::Portrait);
    }
}
