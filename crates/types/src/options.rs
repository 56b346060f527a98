//! The options bag shared by every item of a request, and the capture
//! geometry it resolves to.
use crate::document::DocumentInfo;
use crate::geometry::{ContentBox, Length, PX_PER_INCH, PaperFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("scale must be between {min} and {max}, got {0}", min = MIN_SCALE, max = MAX_SCALE)]
    ScaleOutOfRange(f64),
    #[error("paper {0} must be greater than zero")]
    EmptyPaperDimension(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl Margins {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn all(value: Length) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.top.is_zero() && self.right.is_zero() && self.bottom.is_zero() && self.left.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrintOptions {
    pub format: PaperFormat,
    pub landscape: bool,
    /// Free-form paper width; together with `height` it takes precedence
    /// over `format`, the missing side coming from `format`.
    pub width: Option<Length>,
    pub height: Option<Length>,
    pub margin: Margins,
    pub print_background: bool,
    /// Transparent page background instead of the default white.
    pub omit_background: bool,
    pub scale: f64,
    /// Load/navigation timeout in milliseconds; zero disables it.
    pub timeout: Option<u64>,
    /// Size every page to its rendered content instead of `format`.
    #[serde(alias = "onepage")]
    pub fit_content: bool,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub page_ranges: Option<String>,
    #[serde(rename = "preferCSSPageSize", alias = "preferCssPageSize")]
    pub prefer_css_page_size: bool,
    /// Embed a document outline built from the headings.
    pub outline: bool,
    /// Produce a tagged (accessible) PDF.
    pub tagged: bool,
    /// Wait for `document.fonts.ready` before capturing.
    pub wait_for_fonts: bool,
    pub info: DocumentInfo,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            format: PaperFormat::A4,
            landscape: false,
            width: None,
            height: None,
            margin: Margins::zero(),
            print_background: true,
            omit_background: false,
            scale: 1.0,
            timeout: None,
            fit_content: false,
            display_header_footer: false,
            header_template: None,
            footer_template: None,
            page_ranges: None,
            prefer_css_page_size: false,
            outline: false,
            tagged: false,
            wait_for_fonts: false,
            info: DocumentInfo::default(),
        }
    }
}

impl PrintOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.scale) {
            return Err(OptionsError::ScaleOutOfRange(self.scale));
        }
        if self.width.is_some_and(Length::is_zero) {
            return Err(OptionsError::EmptyPaperDimension("width"));
        }
        if self.height.is_some_and(Length::is_zero) {
            return Err(OptionsError::EmptyPaperDimension("height"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Capture geometry for the requested paper: the named format, or the
    /// free-form `width`/`height` when either is given.
    pub fn page_setup(&self) -> PageSetup {
        self.setup_with(self.paper_size(), self.margin)
    }

    fn paper_size(&self) -> PageSize {
        if self.width.is_none() && self.height.is_none() {
            return PageSize::Named {
                format: self.format,
                landscape: self.landscape,
            };
        }
        let (format_width, format_height) = self.format.size_inches();
        let width_px = self.width.map_or(format_width * PX_PER_INCH, Length::to_px);
        let height_px = self.height.map_or(format_height * PX_PER_INCH, Length::to_px);
        let (width_px, height_px) = if self.landscape {
            (height_px, width_px)
        } else {
            (width_px, height_px)
        };
        PageSize::Exact { width_px, height_px }
    }

    /// Capture geometry sized exactly to the measured content, margins zeroed.
    pub fn fitted_page_setup(&self, content: ContentBox) -> PageSetup {
        self.setup_with(
            PageSize::Exact {
                width_px: content.width,
                height_px: content.height,
            },
            Margins::zero(),
        )
    }

    fn setup_with(&self, size: PageSize, margin: Margins) -> PageSetup {
        PageSetup {
            size,
            margin,
            print_background: self.print_background,
            omit_background: self.omit_background,
            scale: self.scale,
            display_header_footer: self.display_header_footer,
            header_template: self.header_template.clone(),
            footer_template: self.footer_template.clone(),
            page_ranges: self.page_ranges.clone(),
            prefer_css_page_size: self.prefer_css_page_size,
            outline: self.outline,
            tagged: self.tagged,
            wait_for_fonts: self.wait_for_fonts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSize {
    Named { format: PaperFormat, landscape: bool },
    Exact { width_px: f64, height_px: f64 },
}

impl PageSize {
    /// Paper width and height in inches as the sheet is fed, before any
    /// landscape rotation.
    pub fn paper_inches(&self) -> (f64, f64) {
        match *self {
            PageSize::Named { format, .. } => format.size_inches(),
            PageSize::Exact { width_px, height_px } => {
                (width_px / PX_PER_INCH, height_px / PX_PER_INCH)
            }
        }
    }

    /// Width and height in inches of the page as it ends up in the output.
    pub fn oriented_inches(&self) -> (f64, f64) {
        let (w, h) = self.paper_inches();
        if self.is_landscape() { (h, w) } else { (w, h) }
    }

    pub fn is_landscape(&self) -> bool {
        matches!(self, PageSize::Named { landscape: true, .. })
    }
}

/// Resolved capture geometry handed to a rendering context.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub size: PageSize,
    pub margin: Margins,
    pub print_background: bool,
    pub omit_background: bool,
    pub scale: f64,
    pub display_header_footer: bool,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
    pub page_ranges: Option<String>,
    pub prefer_css_page_size: bool,
    pub outline: bool,
    pub tagged: bool,
    pub wait_for_fonts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_print_a4_portrait_with_background() {
        let options = PrintOptions::default();
        assert_eq!(options.format, PaperFormat::A4);
        assert!(!options.landscape);
        assert!(options.print_background);
        assert_eq!(options.scale, 1.0);
        assert!(options.margin.is_zero());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn deserializes_puppeteer_style_keys() {
        let options: PrintOptions = serde_json::from_value(json!({
            "format": "Letter",
            "landscape": true,
            "printBackground": false,
            "onepage": true,
            "preferCSSPageSize": true,
            "margin": {"top": "1cm", "left": 24},
            "timeout": 5000,
            "info": {"title": "Quarterly"}
        }))
        .unwrap();
        assert_eq!(options.format, PaperFormat::Letter);
        assert!(options.landscape);
        assert!(!options.print_background);
        assert!(options.fit_content);
        assert!(options.prefer_css_page_size);
        assert_eq!(options.margin.top, Length::Cm(1.0));
        assert_eq!(options.margin.left, Length::Px(24.0));
        assert!(options.margin.bottom.is_zero());
        assert_eq!(options.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.info.title.as_deref(), Some("Quarterly"));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let options = PrintOptions {
            timeout: Some(0),
            ..PrintOptions::default()
        };
        assert_eq!(options.timeout(), None);
    }

    #[test]
    fn rejects_out_of_range_scale() {
        let options = PrintOptions {
            scale: 2.5,
            ..PrintOptions::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::ScaleOutOfRange(2.5)));
    }

    #[test]
    fn fitted_setup_uses_content_box_and_zero_margins() {
        let options = PrintOptions {
            margin: Margins::all(Length::Mm(10.0)),
            landscape: true,
            ..PrintOptions::default()
        };
        let setup = options.fitted_page_setup(ContentBox {
            width: 480.0,
            height: 96.0,
        });
        assert!(setup.margin.is_zero());
        assert_eq!(
            setup.size,
            PageSize::Exact {
                width_px: 480.0,
                height_px: 96.0
            }
        );
        assert_eq!(setup.size.oriented_inches(), (5.0, 1.0));

        let named = options.page_setup();
        assert_eq!(named.margin, Margins::all(Length::Mm(10.0)));
        let (w, h) = named.size.oriented_inches();
        assert!(w > h, "landscape pages are wider than tall");
    }

    #[test]
    fn free_form_size_overrides_format() {
        let options: PrintOptions = serde_json::from_value(json!({
            "format": "A4",
            "width": "4in",
            "height": 192,
            "outline": true,
            "tagged": true,
            "omitBackground": true,
            "waitForFonts": true
        }))
        .unwrap();
        let setup = options.page_setup();
        assert_eq!(
            setup.size,
            PageSize::Exact {
                width_px: 384.0,
                height_px: 192.0
            }
        );
        assert!(setup.outline && setup.tagged);
        assert!(setup.omit_background && setup.wait_for_fonts);
    }

    #[test]
    fn missing_side_comes_from_format_and_landscape_swaps() {
        let options = PrintOptions {
            format: PaperFormat::Letter,
            landscape: true,
            width: Some(Length::In(4.0)),
            ..PrintOptions::default()
        };
        assert_eq!(
            options.page_setup().size,
            PageSize::Exact {
                width_px: 1056.0,
                height_px: 384.0
            }
        );
    }

    #[test]
    fn rejects_zero_paper_dimension() {
        let options = PrintOptions {
            height: Some(Length::Mm(0.0)),
            ..PrintOptions::default()
        };
        assert_eq!(
            options.validate(),
            Err(OptionsError::EmptyPaperDimension("height"))
        );
    }
}
