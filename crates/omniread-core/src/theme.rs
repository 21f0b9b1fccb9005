//! Reader colour scheme and typography.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MIN_FONT_SCALE_PERCENT: u16 = 50;
pub const MAX_FONT_SCALE_PERCENT: u16 = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    #[default]
    Dark,
    Sepia,
}

impl ColorScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
            ColorScheme::Sepia => "sepia",
        }
    }
}

impl std::fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" | "day" => Ok(ColorScheme::Light),
            "dark" | "night" => Ok(ColorScheme::Dark),
            "sepia" => Ok(ColorScheme::Sepia),
            other => Err(format!("unknown color scheme: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub color_scheme: ColorScheme,
    pub font_scale_percent: u16,
    pub font_family: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::Dark,
            font_scale_percent: 100,
            font_family: "serif".to_string(),
        }
    }
}

/// Partial theme update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ThemePatch {
    pub color_scheme: Option<ColorScheme>,
    pub font_scale_percent: Option<u16>,
    pub font_family: Option<String>,
}

impl ThemePatch {
    pub fn is_empty(&self) -> bool {
        self.color_scheme.is_none()
            && self.font_scale_percent.is_none()
            && self.font_family.is_none()
    }
}

impl Theme {
    pub fn clamp_font_scale(percent: u16) -> u16 {
        percent.clamp(MIN_FONT_SCALE_PERCENT, MAX_FONT_SCALE_PERCENT)
    }

    /// Keep values inside their supported ranges regardless of where they came from.
    pub fn sanitized(mut self) -> Self {
        self.font_scale_percent = Self::clamp_font_scale(self.font_scale_percent);
        let family = self.font_family.trim();
        self.font_family = if family.is_empty() {
            Theme::default().font_family
        } else {
            family.to_string()
        };
        self
    }

    /// Merge a patch, returning whether anything changed.
    pub fn merge(&mut self, patch: ThemePatch) -> bool {
        let before = self.clone();
        if let Some(scheme) = patch.color_scheme {
            self.color_scheme = scheme;
        }
        if let Some(percent) = patch.font_scale_percent {
            self.font_scale_percent = Self::clamp_font_scale(percent);
        }
        if let Some(family) = patch.font_family {
            let trimmed = family.trim();
            if !trimmed.is_empty() {
                self.font_family = trimmed.to_string();
            }
        }
        *self != before
    }

    pub fn rules(&self) -> ThemeRules {
        let (foreground, background) = match self.color_scheme {
            ColorScheme::Light => ("#1a1a1a", "#ffffff"),
            ColorScheme::Dark => ("#cccccc", "#242424"),
            ColorScheme::Sepia => ("#5b4636", "#f4ecd8"),
        };
        ThemeRules {
            color_scheme: self.color_scheme,
            foreground,
            background,
            font_scale_percent: self.font_scale_percent,
            font_family: self.font_family.clone(),
        }
    }
}

/// Concrete colour and typography rules handed to a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeRules {
    pub color_scheme: ColorScheme,
    pub foreground: &'static str,
    pub background: &'static str,
    pub font_scale_percent: u16,
    pub font_family: String,
}

impl ThemeRules {
    /// Stylesheet for surfaces that flow HTML content.
    pub fn to_css(&self) -> String {
        let mut css = format!(
            "body {{ color: {fg}; background: {bg}; font-family: {family}; font-size: {scale}%; }}\n",
            fg = self.foreground,
            bg = self.background,
            family = self.font_family,
            scale = self.font_scale_percent,
        );
        for selector in ["p", "span", "h1", "h2", "h3", "h4"] {
            css.push_str(&format!("{selector} {{ color: {}; }}\n", self.foreground));
        }
        css
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_clamps_font_scale_and_ignores_blank_family() {
        let mut theme = Theme::default();
        let changed = theme.merge(ThemePatch {
            color_scheme: Some(ColorScheme::Sepia),
            font_scale_percent: Some(400),
            font_family: Some("   ".to_string()),
        });
        assert!(changed);
        assert_eq!(theme.color_scheme, ColorScheme::Sepia);
        assert_eq!(theme.font_scale_percent, MAX_FONT_SCALE_PERCENT);
        assert_eq!(theme.font_family, "serif");

        theme.merge(ThemePatch {
            font_scale_percent: Some(10),
            ..ThemePatch::default()
        });
        assert_eq!(theme.font_scale_percent, MIN_FONT_SCALE_PERCENT);
    }

    #[test]
    fn merge_reports_no_change_for_identical_values() {
        let mut theme = Theme::default();
        assert!(!theme.merge(ThemePatch {
            color_scheme: Some(ColorScheme::Dark),
            ..ThemePatch::default()
        }));
        assert!(!theme.merge(ThemePatch::default()));
        assert!(ThemePatch::default().is_empty());
        assert!(!ThemePatch {
            font_family: Some("Georgia".to_string()),
            ..ThemePatch::default()
        }
        .is_empty());
    }

    #[test]
    fn dark_rules_render_css_for_text_selectors() {
        let css = Theme::default().rules().to_css();
        assert!(css.contains("background: #242424"));
        assert!(css.contains("h4 { color: #cccccc; }"));
    }

    #[test]
    fn color_scheme_parses_aliases() {
        assert_eq!("Night".parse::<ColorScheme>(), Ok(ColorScheme::Dark));
        assert_eq!("day".parse::<ColorScheme>(), Ok(ColorScheme::Light));
        assert!("neon".parse::<ColorScheme>().is_err());
    }
}
