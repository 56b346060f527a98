//! Writing the document information dictionary.

use crate::ComposerError;
use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, StringFormat};
use quire_types::DocumentInfo;

type InfoField = fn(&DocumentInfo) -> Option<Object>;

/// Info dictionary keys and how each is read off [`DocumentInfo`]. Absent
/// fields are skipped, never written as empty strings.
static INFO_FIELDS: &[(&str, InfoField)] = &[
    ("Title", |info| info.title.as_deref().map(text_string)),
    ("Author", |info| info.author.as_deref().map(text_string)),
    ("Subject", |info| info.subject.as_deref().map(text_string)),
    ("Keywords", |info| {
        info.keywords
            .as_ref()
            .filter(|keywords| !keywords.is_empty())
            .map(|keywords| text_string(&keywords.join(" ")))
    }),
    ("Creator", |info| info.creator.as_deref().map(text_string)),
    ("Producer", |info| info.producer.as_deref().map(text_string)),
    ("CreationDate", |info| info.creation_date.as_ref().map(date_string)),
    ("ModDate", |info| info.modification_date.as_ref().map(date_string)),
];

/// PDF text string: literal for ASCII, UTF-16BE with byte order mark otherwise.
pub fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(value.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// PDF date string in UTC, e.g. `D:20240131120000Z`.
pub fn date_string(value: &DateTime<Utc>) -> Object {
    Object::String(
        value.format("D:%Y%m%d%H%M%SZ").to_string().into_bytes(),
        StringFormat::Literal,
    )
}

/// Writes every present field of `info` into the document's information
/// dictionary, creating the dictionary only when there is something to write.
/// Returns the number of entries written.
pub fn apply_info(doc: &mut Document, info: &DocumentInfo) -> Result<usize, ComposerError> {
    let entries: Vec<(&str, Object)> = INFO_FIELDS
        .iter()
        .filter_map(|(key, field)| field(info).map(|value| (*key, value)))
        .collect();
    if entries.is_empty() {
        return Ok(0);
    }

    let existing = doc
        .trailer
        .get(b"Info")
        .and_then(Object::as_reference)
        .ok();
    let info_id = match existing {
        Some(id) => id,
        None => {
            let id = doc.add_object(Dictionary::new());
            doc.trailer.set("Info", id);
            id
        }
    };

    let dict = doc.get_object_mut(info_id)?.as_dict_mut()?;
    let written = entries.len();
    for (key, value) in entries {
        dict.set(key, value);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn non_ascii_text_is_utf16_with_bom() {
        let Object::String(bytes, format) = text_string("Ré") else {
            panic!("expected a string");
        };
        assert!(matches!(format, StringFormat::Hexadecimal));
        assert_eq!(bytes, vec![0xFE, 0xFF, 0x00, b'R', 0x00, 0xE9]);
    }

    #[test]
    fn dates_use_pdf_syntax() {
        let date = Utc.with_ymd_and_hms(2024, 1, 31, 12, 5, 9).unwrap();
        assert_eq!(date_string(&date).as_str().unwrap(), b"D:20240131120509Z");
    }

    #[test]
    fn empty_info_leaves_document_untouched() {
        let mut doc = Document::with_version("1.7");
        assert_eq!(apply_info(&mut doc, &DocumentInfo::default()).unwrap(), 0);
        assert!(doc.trailer.get(b"Info").is_err());
    }

    #[test]
    fn writes_only_present_fields() {
        let mut doc = Document::with_version("1.7");
        let info = DocumentInfo {
            title: Some("Report".to_string()),
            keywords: Some(vec!["alpha".to_string(), "beta".to_string()]),
            ..DocumentInfo::default()
        };
        assert_eq!(apply_info(&mut doc, &info).unwrap(), 2);

        let id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let dict = doc.get_dictionary(id).unwrap();
        assert_eq!(dict.get(b"Title").unwrap().as_str().unwrap(), b"Report");
        assert_eq!(dict.get(b"Keywords").unwrap().as_str().unwrap(), b"alpha beta");
        assert!(dict.get(b"Author").is_err());
    }
}
