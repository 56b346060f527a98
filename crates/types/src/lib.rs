pub mod document;
pub mod geometry;
pub mod options;

pub use document::{ContentItem, ContentKind, DocumentInfo, RenderRequest, RenderedPage};
pub use geometry::{ContentBox, GeometryError, Length, PaperFormat, Viewport, viewport_for};
pub use options::{Margins, OptionsError, PageSetup, PageSize, PrintOptions};
