use lopdf::Document as LopdfDocument;

/// Raw content stream of a page, 1-based.
pub fn page_content(doc: &LopdfDocument, page_number: u32) -> String {
    let pages = doc.get_pages();
    let Some(page_id) = pages.get(&page_number) else {
        return String::new();
    };
    doc.get_page_content(*page_id)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Asserts that `text` is drawn on the given page.
pub fn assert_page_shows(doc: &LopdfDocument, page_number: u32, text: &str) {
    let content = page_content(doc, page_number);
    assert!(
        content.contains(&format!("({text})")),
        "page {page_number} does not show {text:?}; content was:\n{content}"
    );
}

/// Width and height of a page's MediaBox in points.
pub fn media_box(doc: &LopdfDocument, page_number: u32) -> Option<(f32, f32)> {
    let page_id = *doc.get_pages().get(&page_number)?;
    let page = doc.get_dictionary(page_id).ok()?;
    let rect = page.get(b"MediaBox").ok()?.as_array().ok()?;
    let coord = |i: usize| rect.get(i).and_then(|o| o.as_float().ok());
    Some((coord(2)? - coord(0)?, coord(3)? - coord(1)?))
}

pub fn assert_media_box(doc: &LopdfDocument, page_number: u32, width: f32, height: f32) {
    let (w, h) = media_box(doc, page_number).expect("page has a MediaBox");
    assert!(
        (w - width).abs() < 0.5 && (h - height).abs() < 0.5,
        "page {page_number} is {w}x{h}pt, expected {width}x{height}pt"
    );
}

/// A text entry of the document information dictionary.
pub fn info_entry(doc: &LopdfDocument, key: &str) -> Option<String> {
    let info_id = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = doc.get_dictionary(info_id).ok()?;
    let value = info.get(key.as_bytes()).ok()?.as_str().ok()?;
    Some(String::from_utf8_lossy(value).into_owned())
}

pub fn has_info(doc: &LopdfDocument) -> bool {
    doc.trailer.get(b"Info").is_ok()
}
