use std::collections::HashMap;

use crate::core::refs::ClassRef;
use crate::core::{Cursor, DecodeError, DecodeSession, VersionedRecord};
use crate::streamer::element::StreamerElement;
use crate::streamer::engine::read_tnamed;

/// Layout description of one class version: an ordered element list plus
/// the identity the producer wrote alongside it.
#[derive(Debug, Clone)]
pub struct StreamerInfo {
    pub name: String,
    pub title: String,
    pub checksum: u32,
    pub class_version: u32,
    pub elements: Vec<StreamerElement>,
}

/// The file's embedded type catalog, keyed by class name. Parsed once per
/// file from the well-known streamer-info record, using the same cursor and
/// reference-table machinery it will later describe.
#[derive(Debug, Default)]
pub struct StreamerCatalog {
    infos: HashMap<String, StreamerInfo>,
}

enum InfoItem {
    Info(StreamerInfo),
    Element(StreamerElement),
    Skipped,
}

impl StreamerCatalog {
    /// Parse the decompressed payload of the streamer-info key.
    pub fn parse(buf: &[u8], session: &mut DecodeSession) -> Result<Self, DecodeError> {
        let mut cur = Cursor::new(buf);
        let rec = VersionedRecord::open(&mut cur)?;
        let mut infos = HashMap::new();
        if rec.version > 3 {
            cur.skip(10)?; // base object header
            let _list_name = cur.read_tstring()?;
            let n = cur.read_u32()?;
            for _ in 0..n {
                if let InfoItem::Info(info) = read_info_object(&mut cur, session)? {
                    infos.insert(info.name.clone(), info);
                }
                skip_option_string(&mut cur, rec.version)?;
            }
        }
        rec.close(&mut cur, Some("streamer info list"), &mut session.warnings);
        Ok(StreamerCatalog { infos })
    }

    pub fn get(&self, class_name: &str) -> Option<&StreamerInfo> {
        self.infos.get(class_name)
    }

    pub fn insert(&mut self, info: StreamerInfo) {
        self.infos.insert(info.name.clone(), info);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamerInfo> {
        self.infos.values()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Per-element option string: one length byte, escaping to a 4-byte length
/// for list versions above 4.
fn skip_option_string(cur: &mut Cursor, list_version: u16) -> Result<(), DecodeError> {
    let nch = cur.read_u8()?;
    let len = if list_version > 4 && nch == 255 {
        cur.read_u32()? as usize
    } else {
        nch as usize
    };
    cur.skip(len)
}

/// One entry of the catalog stream: class word, then a body picked by the
/// class name.
fn read_info_object(cur: &mut Cursor, session: &mut DecodeSession) -> Result<InfoItem, DecodeError> {
    let name = match session.read_class(cur)? {
        // a bare back-reference carries no body
        ClassRef::ObjectBackRef { .. } => return Ok(InfoItem::Skipped),
        ClassRef::NewClass { name, .. } => name,
        ClassRef::KnownClass { name } => name,
    };
    match name.as_str() {
        "TStreamerInfo" => read_streamer_info(cur, session),
        "TStreamerBase" => read_streamer_base(cur, session).map(InfoItem::Element),
        "TStreamerBasicPointer" | "TStreamerLoop" => {
            read_streamer_basic_pointer(cur, session).map(InfoItem::Element)
        }
        "TStreamerSTL" => read_streamer_stl(cur, session).map(InfoItem::Element),
        "TList" => {
            read_embedded_list(cur, session)?;
            Ok(InfoItem::Skipped)
        }
        "TObjString" => {
            read_obj_string(cur, session)?;
            Ok(InfoItem::Skipped)
        }
        // TStreamerBasicType, TStreamerObject* and friends share the
        // element-with-version wrapper
        other => read_wrapped_element(cur, session, other).map(InfoItem::Element),
    }
}

fn read_streamer_info(cur: &mut Cursor, session: &mut DecodeSession) -> Result<InfoItem, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    if rec.version <= 1 {
        rec.close(cur, Some("TStreamerInfo"), &mut session.warnings);
        return Ok(InfoItem::Skipped);
    }
    let (name, title, _bits) = read_tnamed(cur, &mut session.warnings)?;
    let checksum = cur.read_u32()?;
    let class_version = cur.read_u32()?;
    let elements = read_elements(cur, session)?;
    rec.close(cur, Some("TStreamerInfo"), &mut session.warnings);
    Ok(InfoItem::Info(StreamerInfo {
        name,
        title,
        checksum,
        class_version,
        elements,
    }))
}

/// The element array: a class word for the array object, then the array
/// record holding one catalog entry per element.
fn read_elements(
    cur: &mut Cursor,
    session: &mut DecodeSession,
) -> Result<Vec<StreamerElement>, DecodeError> {
    let _array_class = session.read_class(cur)?;
    let rec = VersionedRecord::open(cur)?;
    if rec.version > 2 {
        cur.skip(10)?;
    }
    if rec.version > 1 {
        let _name = cur.read_tstring()?;
    }
    let n = cur.read_u32()?;
    let _lower_bound = cur.read_u32()?;
    let mut elements = Vec::with_capacity(n as usize);
    for _ in 0..n {
        if let InfoItem::Element(el) = read_info_object(cur, session)? {
            elements.push(el);
        }
    }
    rec.close(cur, Some("streamer element array"), &mut session.warnings);
    Ok(elements)
}

/// The common element body every `TStreamer*` subclass embeds.
fn read_element_body(
    cur: &mut Cursor,
    session: &mut DecodeSession,
) -> Result<StreamerElement, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    let (name, title, _bits) = read_tnamed(cur, &mut session.warnings)?;
    let mut type_code = cur.read_u32()?;
    let size = cur.read_u32()?;
    let length = cur.read_u32()?;
    let dim = cur.read_u32()?;
    let max_index = if rec.version == 1 {
        let n = cur.read_u32()?;
        (0..n).map(|_| cur.read_u32()).collect::<Result<_, _>>()?
    } else {
        (0..5).map(|_| cur.read_u32()).collect::<Result<_, _>>()?
    };
    let type_name = cur.read_tstring()?;
    // booleans were written with the uchar code by old producers
    if type_code == 11 && (type_name == "Bool_t" || type_name == "bool") {
        type_code = 18;
    }
    if rec.version == 3 {
        let _xmin = cur.read_u32()?;
        let _xmax = cur.read_u32()?;
        let _factor = cur.read_u32()?;
    }
    rec.close(cur, Some("streamer element"), &mut session.warnings);
    Ok(StreamerElement {
        name,
        title,
        type_code,
        size,
        length,
        dim,
        max_index,
        type_name,
        base_version: None,
        count_name: None,
        count_class: None,
        count_version: None,
        stl_kind: None,
    })
}

/// Wrapper shared by `TStreamerBasicType` and the `TStreamerObject` family:
/// an outer version record around the element body.
fn read_wrapped_element(
    cur: &mut Cursor,
    session: &mut DecodeSession,
    context: &str,
) -> Result<StreamerElement, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    let el = if rec.version > 1 {
        read_element_body(cur, session)?
    } else {
        StreamerElement::new("", 0, "")
    };
    rec.close(cur, Some(context), &mut session.warnings);
    Ok(el)
}

fn read_streamer_base(
    cur: &mut Cursor,
    session: &mut DecodeSession,
) -> Result<StreamerElement, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    let mut el = read_element_body(cur, session)?;
    if rec.version > 2 {
        el.base_version = Some(cur.read_u32()?);
    }
    rec.close(cur, Some("TStreamerBase"), &mut session.warnings);
    Ok(el)
}

fn read_streamer_basic_pointer(
    cur: &mut Cursor,
    session: &mut DecodeSession,
) -> Result<StreamerElement, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    let el = if rec.version > 1 {
        let mut el = read_element_body(cur, session)?;
        el.count_version = Some(cur.read_u32()?);
        el.count_name = Some(cur.read_tstring()?);
        el.count_class = Some(cur.read_tstring()?);
        el
    } else {
        StreamerElement::new("", 0, "")
    };
    rec.close(cur, Some("TStreamerBasicPointer"), &mut session.warnings);
    Ok(el)
}

fn read_streamer_stl(
    cur: &mut Cursor,
    session: &mut DecodeSession,
) -> Result<StreamerElement, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    let el = if rec.version > 2 {
        let mut el = read_element_body(cur, session)?;
        let stl_type = cur.read_u32()?;
        let content_type = cur.read_u32()?;
        el.stl_kind = Some((stl_type, content_type));
        el
    } else {
        StreamerElement::new("", 0, "")
    };
    rec.close(cur, Some("TStreamerSTL"), &mut session.warnings);
    Ok(el)
}

fn read_obj_string(cur: &mut Cursor, session: &mut DecodeSession) -> Result<String, DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    cur.skip(10)?;
    let s = cur.read_tstring()?;
    rec.close(cur, Some("TObjString"), &mut session.warnings);
    Ok(s)
}

/// A `TList` nested inside the catalog stream: walked for cursor
/// consistency, content discarded.
fn read_embedded_list(cur: &mut Cursor, session: &mut DecodeSession) -> Result<(), DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    if rec.version > 3 {
        cur.skip(10)?;
        let _name = cur.read_tstring()?;
        let n = cur.read_u32()?;
        for _ in 0..n {
            read_info_object(cur, session)?;
            skip_option_string(cur, rec.version)?;
        }
    }
    rec.close(cur, Some("embedded list"), &mut session.warnings);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;

    use super::*;
    use crate::core::refs::ClassTagMap;
    use crate::streamer::element::type_code;
    use crate::test_utils::{streamer_catalog_payload, ElementSpec};

    #[test]
    fn parses_synthetic_catalog() {
        let key_len = 60u16;
        let payload = streamer_catalog_payload(
            key_len,
            "TVertex",
            7,
            &[
                ElementSpec::basic("fX", type_code::DOUBLE, "Double_t", 8),
                ElementSpec::basic("fY", type_code::DOUBLE, "Double_t", 8),
                ElementSpec::basic("fNdof", type_code::INT, "Int_t", 4),
            ],
        );
        let classes = RwLock::new(ClassTagMap::default());
        let mut session = DecodeSession::new(key_len as u64, &classes);
        let catalog = StreamerCatalog::parse(&payload, &mut session).unwrap();
        assert!(session.warnings.is_empty());
        assert_eq!(catalog.len(), 1);
        let info = catalog.get("TVertex").unwrap();
        assert_eq!(info.class_version, 7);
        let names: Vec<_> = info.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["fX", "fY", "fNdof"]);
        assert_eq!(info.elements[2].type_code, type_code::INT);
        assert_eq!(info.elements[0].type_name, "Double_t");
        // the stream registered the bootstrap classes in the shared map
        assert!(classes.read().unwrap().len() >= 2);
    }
}
