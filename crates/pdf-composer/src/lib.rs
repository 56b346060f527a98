//! PDF composition for quire.
//!
//! This crate provides the low-level PDF work behind a multi-item print,
//! using lopdf:
//! - Deep page copying between documents with cycle detection
//! - Appending one document's pages to another in order
//! - Writing the document information dictionary

mod error;
mod info;

pub use error::ComposerError;
pub use info::{apply_info, date_string, text_string};

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId};
use quire_types::DocumentInfo;
use std::collections::HashMap;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

/// Manages the state of copying objects between documents.
struct ObjectCopier<'a> {
    source_doc: &'a Document,
    target_doc: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source_doc: &'a Document, target_doc: &'a mut Document) -> Self {
        Self {
            source_doc,
            target_doc,
            id_map: HashMap::new(),
        }
    }

    /// Copies a page without its `Parent` link, so the source page tree stays
    /// behind. Inherited attributes are written onto the copy.
    fn copy_page(&mut self, page_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        let mut page = self.source_doc.get_dictionary(page_id)?.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(self.source_doc, &page, key) {
                    page.set(key, value);
                }
            }
        }
        page.remove(b"Parent");

        let new_id = self.reserve(page_id);
        let new_page = self.remap_references(Object::Dictionary(page))?;
        self.fill(new_id, new_page)?;
        Ok(new_id)
    }

    /// Deep copies an object and everything it references, each source
    /// object at most once.
    fn copy_object(&mut self, source_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        // Mapped before recursing so reference cycles terminate.
        let new_id = self.reserve(source_id);
        let obj = self.source_doc.get_object(source_id)?.clone();
        let new_obj = self.remap_references(obj)?;
        self.fill(new_id, new_obj)?;
        Ok(new_id)
    }

    fn reserve(&mut self, source_id: ObjectId) -> ObjectId {
        let new_id = self.target_doc.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);
        new_id
    }

    fn fill(&mut self, new_id: ObjectId, obj: Object) -> Result<(), lopdf::Error> {
        match self.target_doc.objects.get_mut(&new_id) {
            Some(slot) => {
                *slot = obj;
                Ok(())
            }
            None => Err(lopdf::Error::ObjectNotFound(new_id)),
        }
    }

    /// Replaces every `Object::Reference` inside `obj` with the id of its copy
    /// in the target document.
    fn remap_references(&mut self, obj: Object) -> Result<Object, lopdf::Error> {
        match obj {
            Object::Reference(id) => Ok(Object::Reference(self.copy_object(id)?)),
            Object::Array(arr) => {
                let new_arr = arr
                    .into_iter()
                    .map(|o| self.remap_references(o))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Object::Array(new_arr))
            }
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.remap_dictionary(dict)?)),
            Object::Stream(mut stream) => {
                stream.dict = self.remap_dictionary(stream.dict)?;
                Ok(Object::Stream(stream))
            }
            _ => Ok(obj),
        }
    }

    fn remap_dictionary(&mut self, mut dict: Dictionary) -> Result<Dictionary, lopdf::Error> {
        for (_, value) in dict.iter_mut() {
            let old = std::mem::replace(value, Object::Null);
            *value = self.remap_references(old)?;
        }
        Ok(dict)
    }
}

/// Looks `key` up on the ancestors of `page`, nearest first.
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Appends every page of `source` to the end of `target`, preserving the
/// source's page order. Returns the number of pages appended.
///
/// Each page is copied together with the objects it references (content
/// streams, resources, fonts, annotations). Document-level structures of
/// the source such as outlines or named destinations are not carried over.
pub fn merge_documents(target: &mut Document, source: &Document) -> Result<usize, ComposerError> {
    let source_pages = source.get_pages();
    if source_pages.is_empty() {
        return Ok(0);
    }

    // `get_pages` is keyed by page number, so values come out in page order.
    let mut copier = ObjectCopier::new(source, target);
    let copied: Vec<ObjectId> = source_pages
        .values()
        .map(|page_id| copier.copy_page(*page_id))
        .collect::<Result<_, _>>()?;

    let root_id = target.trailer.get(b"Root")?.as_reference()?;
    let pages_id = target
        .get_object(root_id)?
        .as_dict()?
        .get(b"Pages")?
        .as_reference()?;
    let pages_dict = target.get_object_mut(pages_id)?.as_dict_mut()?;

    let mut kids = pages_dict.get(b"Kids")?.as_array()?.clone();
    let count = pages_dict.get(b"Count")?.as_i64()?;
    kids.extend(copied.iter().copied().map(Object::Reference));
    pages_dict.set("Kids", Object::Array(kids));
    pages_dict.set("Count", count + copied.len() as i64);

    for page_id in &copied {
        if let Ok(Object::Dictionary(page)) = target.get_object_mut(*page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    Ok(copied.len())
}

/// Merges the given PDFs, in order, into a single document and writes
/// `info` into it.
///
/// The first document is the base: its catalog (outline, structure tree,
/// language) is kept and only its Info dictionary is dropped, so the output
/// carries exactly the metadata in `info`. The remaining documents are parsed
/// and appended one at a time. The output's page count is the sum of the
/// inputs' page counts.
pub fn combine<B: AsRef<[u8]>>(
    documents: &[B],
    info: &DocumentInfo,
) -> Result<Vec<u8>, ComposerError> {
    let (first, rest) = documents.split_first().ok_or(ComposerError::Empty)?;

    let mut merged = load(0, first.as_ref())?;
    strip_info(&mut merged);
    for (offset, bytes) in rest.iter().enumerate() {
        let index = offset + 1;
        let source = load(index, bytes.as_ref())?;
        let appended = merge_documents(&mut merged, &source)?;
        debug!("Appended {} page(s) from document {}", appended, index);
    }
    apply_info(&mut merged, info)?;

    let mut out = Vec::new();
    merged.save_to(&mut out).map_err(|e| ComposerError::Other(e.to_string()))?;
    Ok(out)
}

fn load(index: usize, bytes: &[u8]) -> Result<Document, ComposerError> {
    Document::load_mem(bytes)
        .map_err(|e| ComposerError::Other(format!("document {index} is not a valid PDF: {e}")))
}

/// Removes the trailer's Info dictionary along with the object holding it.
fn strip_info(doc: &mut Document) {
    if let Some(Object::Reference(id)) = doc.trailer.remove(b"Info") {
        doc.objects.remove(&id);
    }
}

/// Number of pages in a serialized PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, ComposerError> {
    Ok(Document::load_mem(bytes)?.get_pages().len())
}
