//! Request-side document types: what to print and how to label the result.
use crate::options::PrintOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Inline markup, injected directly into the rendering context.
    Markup,
    /// A navigable reference the rendering context loads itself.
    Url,
}

/// One document to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub kind: ContentKind,
    pub content: String,
}

impl ContentItem {
    pub fn markup(content: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Markup,
            content: content.into(),
        }
    }

    pub fn url(content: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Url,
            content: content.into(),
        }
    }
}

/// The PDF Information Dictionary fields a caller may stamp on the output.
///
/// Every field is optional; fields left `None` are never written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(alias = "modDate")]
    pub modification_date: Option<DateTime<Utc>>,
}

impl DocumentInfo {
    pub fn is_empty(&self) -> bool {
        *self == DocumentInfo::default()
    }
}

/// An ordered list of documents plus the options shared by all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub options: PrintOptions,
}

impl RenderRequest {
    pub fn new(items: Vec<ContentItem>, options: PrintOptions) -> Self {
        Self { items, options }
    }

    pub fn markup<I, S>(documents: I, options: PrintOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(documents.into_iter().map(ContentItem::markup).collect(), options)
    }

    pub fn urls<I, S>(urls: I, options: PrintOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(urls.into_iter().map(ContentItem::url).collect(), options)
    }
}

/// A single-document PDF produced from the item at `index` of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub index: usize,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_item_wire_format() {
        let item: ContentItem =
            serde_json::from_value(json!({"kind": "url", "content": "https://example.com"}))
                .unwrap();
        assert_eq!(item, ContentItem::url("https://example.com"));
        assert_eq!(
            serde_json::to_value(ContentItem::markup("<p>1</p>")).unwrap(),
            json!({"kind": "markup", "content": "<p>1</p>"})
        );
    }

    #[test]
    fn request_without_options_uses_defaults() {
        let request: RenderRequest = serde_json::from_value(json!({
            "items": [{"kind": "markup", "content": "<p>A</p>"}]
        }))
        .unwrap();
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.options, PrintOptions::default());
    }

    #[test]
    fn info_accepts_mod_date_alias() {
        let info: DocumentInfo = serde_json::from_value(json!({
            "title": "Report",
            "modDate": "2024-03-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(info.title.as_deref(), Some("Report"));
        assert!(info.modification_date.is_some());
        assert!(info.author.is_none());
        assert!(!info.is_empty());
        assert!(DocumentInfo::default().is_empty());
    }
}
