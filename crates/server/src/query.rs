//! Turning a request's query string into print options.
//!
//! Keys follow the browser's print-to-PDF option names (`printBackground`,
//! `marginTop`, `preferCSSPageSize`, ...) plus the document information
//! fields and this service's own `filename` and `onepage`. Unknown keys are
//! ignored. Boolean keys are true only for the literal value `true`.

use crate::error::ServiceError;
use chrono::{DateTime, NaiveDate, Utc};
use quire::{Length, PrintOptions};
use std::fmt::Display;

pub const DEFAULT_FILENAME: &str = "document";

#[derive(Debug, Clone, PartialEq)]
pub struct PrintParams {
    /// Attachment name, always ending in `.pdf`.
    pub filename: String,
    pub options: PrintOptions,
}

impl PrintParams {
    /// Parses query pairs in order; a repeated key overwrites earlier values
    /// except `keywords`, which accumulate.
    pub fn parse(pairs: &[(String, String)], default_producer: &str) -> Result<Self, ServiceError> {
        let mut options = PrintOptions::default();
        options.info.producer = Some(default_producer.to_string());
        let mut filename = None;
        let mut keywords = Vec::new();

        for (key, value) in pairs {
            let key = key.as_str();
            match key {
                "filename" => filename = Some(value.clone()),
                "format" => options.format = value.parse().map_err(|e| invalid(key, e))?,
                "landscape" => options.landscape = flag(value),
                "width" => options.width = Some(length(key, value)?),
                "height" => options.height = Some(length(key, value)?),
                "printBackground" => options.print_background = flag(value),
                "omitBackground" => options.omit_background = flag(value),
                "outline" => options.outline = flag(value),
                "tagged" => options.tagged = flag(value),
                "waitForFonts" => options.wait_for_fonts = flag(value),
                "displayHeaderFooter" => options.display_header_footer = flag(value),
                "preferCSSPageSize" => options.prefer_css_page_size = flag(value),
                "onepage" => options.fit_content = flag(value),
                "scale" => options.scale = number(key, value)?,
                "timeout" => options.timeout = Some(number(key, value)? as u64),
                "marginTop" => options.margin.top = length(key, value)?,
                "marginRight" => options.margin.right = length(key, value)?,
                "marginBottom" => options.margin.bottom = length(key, value)?,
                "marginLeft" => options.margin.left = length(key, value)?,
                "headerTemplate" => options.header_template = Some(value.clone()),
                "footerTemplate" => options.footer_template = Some(value.clone()),
                "pageRanges" => options.page_ranges = Some(value.clone()),
                "title" => options.info.title = Some(value.clone()),
                "author" => options.info.author = Some(value.clone()),
                "subject" => options.info.subject = Some(value.clone()),
                "creator" => options.info.creator = Some(value.clone()),
                "producer" => options.info.producer = Some(value.clone()),
                "keywords" => keywords.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(String::from),
                ),
                "creationDate" => options.info.creation_date = Some(date(key, value)?),
                "modDate" => options.info.modification_date = Some(date(key, value)?),
                _ => tracing::debug!("Ignoring unknown query parameter '{}'", key),
            }
        }

        if !keywords.is_empty() {
            options.info.keywords = Some(keywords);
        }

        Ok(Self {
            filename: attachment_name(filename.as_deref()),
            options,
        })
    }
}

/// Appends `.pdf` unless the name already ends with it.
pub fn attachment_name(requested: Option<&str>) -> String {
    let name = requested
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_FILENAME);
    let name: String = name
        .chars()
        .map(|c| if c.is_control() || c == '"' || c == '\\' { '_' } else { c })
        .collect();
    if name.ends_with(".pdf") {
        name
    } else {
        format!("{name}.pdf")
    }
}

fn invalid(key: &str, error: impl Display) -> ServiceError {
    ServiceError::InvalidRequest(format!("{key}: {error}"))
}

fn flag(value: &str) -> bool {
    value == "true"
}

fn number(key: &str, value: &str) -> Result<f64, ServiceError> {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(n),
        _ => Err(invalid(key, format!("expected a non-negative number, got '{value}'"))),
    }
}

fn length(key: &str, value: &str) -> Result<Length, ServiceError> {
    value.parse().map_err(|e| invalid(key, e))
}

/// RFC 3339 timestamps, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn date(key: &str, value: &str) -> Result<DateTime<Utc>, ServiceError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| invalid(key, format!("expected an RFC 3339 date, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quire::PaperFormat;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_query_uses_defaults_and_producer() {
        let params = PrintParams::parse(&[], "quire-server v0.1.0").unwrap();
        assert_eq!(params.filename, "document.pdf");
        assert_eq!(params.options.format, PaperFormat::A4);
        assert!(params.options.print_background);
        assert_eq!(params.options.info.producer.as_deref(), Some("quire-server v0.1.0"));
    }

    #[test]
    fn parses_print_options() {
        let params = PrintParams::parse(
            &pairs(&[
                ("format", "letter"),
                ("landscape", "true"),
                ("printBackground", "false"),
                ("scale", "0.5"),
                ("timeout", "2500"),
                ("onepage", "true"),
                ("marginTop", "1cm"),
                ("marginLeft", "12"),
                ("pageRanges", "1-3"),
                ("width", "4in"),
                ("height", "600"),
                ("outline", "true"),
                ("tagged", "true"),
                ("omitBackground", "true"),
                ("waitForFonts", "true"),
            ]),
            "p",
        )
        .unwrap();
        let options = params.options;
        assert_eq!(options.format, PaperFormat::Letter);
        assert!(options.landscape);
        assert!(!options.print_background);
        assert_eq!(options.scale, 0.5);
        assert_eq!(options.timeout, Some(2500));
        assert!(options.fit_content);
        assert_eq!(options.margin.top, Length::Cm(1.0));
        assert_eq!(options.margin.left, Length::Px(12.0));
        assert_eq!(options.page_ranges.as_deref(), Some("1-3"));
        assert_eq!(options.width, Some(Length::In(4.0)));
        assert_eq!(options.height, Some(Length::Px(600.0)));
        assert!(options.outline);
        assert!(options.tagged);
        assert!(options.omit_background);
        assert!(options.wait_for_fonts);
    }

    #[test]
    fn only_literal_true_enables_flags() {
        let params = PrintParams::parse(&pairs(&[("landscape", "1")]), "p").unwrap();
        assert!(!params.options.landscape);
    }

    #[test]
    fn parses_document_information() {
        let params = PrintParams::parse(
            &pairs(&[
                ("title", "Invoice 42"),
                ("producer", "Billing"),
                ("keywords", "invoice, 2024"),
                ("keywords", "paid"),
                ("creationDate", "2024-03-01T10:00:00+02:00"),
                ("modDate", "2024-03-02"),
            ]),
            "default",
        )
        .unwrap();
        let info = params.options.info;
        assert_eq!(info.title.as_deref(), Some("Invoice 42"));
        assert_eq!(info.producer.as_deref(), Some("Billing"));
        assert_eq!(
            info.keywords,
            Some(vec!["invoice".to_string(), "2024".to_string(), "paid".to_string()])
        );
        assert_eq!(
            info.creation_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(
            info.modification_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn rejects_malformed_values() {
        for (key, value) in [
            ("format", "B5"),
            ("scale", "big"),
            ("timeout", "-1"),
            ("marginTop", "3furlongs"),
            ("width", "wide"),
            ("creationDate", "yesterday"),
        ] {
            let result = PrintParams::parse(&pairs(&[(key, value)]), "p");
            assert!(
                matches!(result, Err(ServiceError::InvalidRequest(ref m)) if m.starts_with(key)),
                "{key}={value} was accepted"
            );
        }
    }

    #[test]
    fn filenames_always_end_in_pdf() {
        assert_eq!(attachment_name(Some("report")), "report.pdf");
        assert_eq!(attachment_name(Some("report.pdf")), "report.pdf");
        assert_eq!(attachment_name(Some("  ")), "document.pdf");
        assert_eq!(attachment_name(Some("a\"b")), "a_b.pdf");
        assert_eq!(attachment_name(None), "document.pdf");
    }
}
