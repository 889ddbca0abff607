use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::error::ByteCountMismatch;
use crate::core::refs::{ClassRef, ClassTagMap};
use crate::core::{Cursor, DecodeError, DecodeSession, DecodedObject, Value, VersionedRecord};
use crate::streamer::catalog::StreamerCatalog;
use crate::streamer::element::{type_code as tc, StreamerElement};

/// Compiled read-program for one class: its catalog elements with base
/// classes partitioned to the front. Built lazily, cached for the lifetime
/// of the owning file.
#[derive(Debug)]
pub struct Streamer {
    class_name: String,
    bases: Vec<StreamerElement>,
    members: Vec<StreamerElement>,
}

/// Shared decoding state of an open file: the parsed catalog, the
/// compiled-streamer cache and the file-scoped class tag map. Writes to the
/// two caches are insert-if-absent, so concurrent decodes of different keys
/// cannot register conflicting identities.
#[derive(Debug)]
pub struct Streamers {
    catalog: StreamerCatalog,
    compiled: RwLock<HashMap<String, Arc<Streamer>>>,
    classes: RwLock<ClassTagMap>,
}

impl Streamers {
    pub fn new(catalog: StreamerCatalog, classes: RwLock<ClassTagMap>) -> Self {
        Streamers {
            catalog,
            compiled: RwLock::new(HashMap::new()),
            classes,
        }
    }

    pub fn catalog(&self) -> &StreamerCatalog {
        &self.catalog
    }

    pub fn classes(&self) -> &RwLock<ClassTagMap> {
        &self.classes
    }

    /// Look up (or compile and cache) the streamer for a class.
    pub fn get(&self, class_name: &str) -> Result<Arc<Streamer>, DecodeError> {
        if let Some(s) = self
            .compiled
            .read()
            .expect("streamer cache poisoned")
            .get(class_name)
        {
            return Ok(s.clone());
        }
        let info = self
            .catalog
            .get(class_name)
            .ok_or_else(|| DecodeError::MissingStreamerInfo {
                class_name: class_name.to_string(),
            })?;
        let (bases, members) = info
            .elements
            .iter()
            .cloned()
            .partition(StreamerElement::is_base);
        let streamer = Arc::new(Streamer {
            class_name: class_name.to_string(),
            bases,
            members,
        });
        let streamer = self
            .compiled
            .write()
            .expect("streamer cache poisoned")
            .entry(class_name.to_string())
            .or_insert(streamer)
            .clone();
        // compile catalog-described bases up front; foundational bases
        // (TObject, TQObject, TArray*) are handled inline at run time
        for base in &streamer.bases {
            if self.catalog.get(&base.name).is_some() {
                self.get(&base.name)?;
            }
        }
        Ok(streamer)
    }

    /// Stream one instance of `class_name` into `obj`, dispatching to the
    /// built-in container and base-object layouts where the catalog does not
    /// describe them.
    pub fn class_streamer(
        &self,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
        class_name: &str,
    ) -> Result<(), DecodeError> {
        match class_name {
            "TObject" | "TMethodCall" => read_tobject(cur, obj),
            "TObjArray" => self.read_tobjarray(cur, session, obj),
            "TClonesArray" => self.read_tclones_array(cur, session, obj),
            "TList" | "THashList" => self.read_tlist(cur, session, obj),
            "TCollection" => self.read_tcollection(cur, session, obj),
            _ => self.get(class_name)?.run(self, cur, session, obj),
        }
    }

    /// General object entry point: decode a class word, resolve
    /// back-references, stream new objects and register them under their
    /// offset-derived tag.
    pub fn read_object_any(
        &self,
        cur: &mut Cursor,
        session: &mut DecodeSession,
    ) -> Result<Value, DecodeError> {
        let startpos = cur.pos();
        match session.read_class(cur)? {
            ClassRef::ObjectBackRef { tag } => Ok(session
                .objects
                .get(tag)
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            ClassRef::NewClass { name, .. } | ClassRef::KnownClass { name } => {
                let mut obj = DecodedObject::new(&name);
                self.class_streamer(cur, session, &mut obj, &name)?;
                let obj = Arc::new(obj);
                let tag = session.tag_at(startpos);
                session.objects.insert(tag, obj.clone());
                Ok(Value::Object(obj))
            }
        }
    }

    fn read_tlist(
        &self,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
    ) -> Result<(), DecodeError> {
        let rec = VersionedRecord::open(cur)?;
        let mut name = String::new();
        let mut arr = Vec::new();
        let mut opt = Vec::new();
        if rec.version > 3 {
            read_tobject(cur, obj)?;
            name = cur.read_tstring()?;
            let n = cur.read_u32()?;
            for _ in 0..n {
                arr.push(self.read_object_any(cur, session)?);
                opt.push(Value::Str(cur.read_tstring()?));
            }
        }
        obj.set("name", Value::Str(name));
        obj.set("arr", Value::Array(arr));
        obj.set("opt", Value::Array(opt));
        rec.close(cur, None, &mut session.warnings);
        Ok(())
    }

    fn read_tobjarray(
        &self,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
    ) -> Result<(), DecodeError> {
        let rec = VersionedRecord::open(cur)?;
        if rec.version > 2 {
            read_tobject(cur, obj)?;
        }
        let name = if rec.version > 1 {
            cur.read_tstring()?
        } else {
            String::new()
        };
        let n = cur.read_u32()?;
        let _lower_bound = cur.read_u32()?;
        let mut arr = Vec::with_capacity(n as usize);
        for _ in 0..n {
            arr.push(self.read_object_any(cur, session)?);
        }
        obj.set("name", Value::Str(name));
        obj.set("arr", Value::Array(arr));
        rec.close(cur, Some("TObjArray"), &mut session.warnings);
        Ok(())
    }

    fn read_tclones_array(
        &self,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
    ) -> Result<(), DecodeError> {
        let rec = VersionedRecord::open(cur)?;
        if rec.version > 2 {
            read_tobject(cur, obj)?;
        }
        let name = if rec.version > 1 {
            cur.read_tstring()?
        } else {
            String::new()
        };
        // member class comes as "Name;version"
        let class_spec = cur.read_tstring()?;
        let member_class = class_spec
            .split_once(';')
            .map(|(cl, _ver)| cl.to_string())
            .unwrap_or(class_spec);
        let n = cur.read_i32()?.unsigned_abs();
        let _lower_bound = cur.read_u32()?;
        let mut arr = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let mut member = DecodedObject::new(&member_class);
            self.class_streamer(cur, session, &mut member, &member_class)?;
            arr.push(Value::Object(Arc::new(member)));
        }
        obj.set("name", Value::Str(name));
        obj.set("arr", Value::Array(arr));
        rec.close(cur, Some("TClonesArray"), &mut session.warnings);
        Ok(())
    }

    /// Plain collections carry only object headers; the elements themselves
    /// were never written. Kept for stream consistency.
    fn read_tcollection(
        &self,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
    ) -> Result<(), DecodeError> {
        let rec = VersionedRecord::open(cur)?;
        if rec.version > 2 {
            read_tobject(cur, obj)?;
        }
        let name = if rec.version > 1 {
            cur.read_tstring()?
        } else {
            String::new()
        };
        let n = cur.read_u32()?;
        cur.skip(10 * n as usize)?;
        obj.set("name", Value::Str(name));
        obj.set("arr", Value::Array(vec![Value::Null; n as usize]));
        rec.close(cur, Some("TCollection"), &mut session.warnings);
        Ok(())
    }
}

impl Streamer {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Execute the element program against the cursor: versioned-record
    /// envelope, base classes first, then members in catalog order.
    pub fn run(
        &self,
        ctx: &Streamers,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
    ) -> Result<(), DecodeError> {
        let rec = VersionedRecord::open(cur)?;
        for el in &self.bases {
            self.read_base(ctx, cur, session, obj, el)?;
        }
        for el in &self.members {
            self.read_member(ctx, cur, session, obj, el)?;
        }
        rec.close(cur, Some(&self.class_name), &mut session.warnings);
        Ok(())
    }

    fn read_base(
        &self,
        ctx: &Streamers,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
        el: &StreamerElement,
    ) -> Result<(), DecodeError> {
        if let Some(kind) = el.name.strip_prefix("TArray").and_then(|s| s.chars().next()) {
            // fixed-layout array base: element count plus the payload
            let (n, arr) = read_array(cur, kind)?;
            obj.set("fN", Value::U64(n as u64));
            obj.set("fArray", Value::Array(arr));
            Ok(())
        } else if el.name == "TObject" {
            read_tobject(cur, obj)
        } else if el.name == "TQObject" {
            // nothing on the wire
            Ok(())
        } else {
            ctx.get(&el.name)?.run(ctx, cur, session, obj)
        }
    }

    fn read_member(
        &self,
        ctx: &Streamers,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
        el: &StreamerElement,
    ) -> Result<(), DecodeError> {
        // custom-streamed members come first, keyed by declared type
        match el.type_name.as_str() {
            "TString*" => {
                let rec = VersionedRecord::open(cur)?;
                let n = member_count(obj, el);
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(Value::Str(cur.read_tstring()?));
                }
                rec.close(cur, Some("TString array"), &mut session.warnings);
                obj.set(&el.name, Value::Array(items));
                Ok(())
            }
            "TArrayC" | "TArrayS" | "TArrayI" | "TArrayL" | "TArrayF" | "TArrayD" => {
                let kind = el.type_name.chars().last().unwrap_or('I');
                let (_n, arr) = read_array(cur, kind)?;
                obj.set(&el.name, Value::Array(arr));
                Ok(())
            }
            "TObject" => read_tobject(cur, obj),
            "TQObject" => Ok(()),
            _ => self.read_coded_member(ctx, cur, session, obj, el),
        }
    }

    fn read_coded_member(
        &self,
        ctx: &Streamers,
        cur: &mut Cursor,
        session: &mut DecodeSession,
        obj: &mut DecodedObject,
        el: &StreamerElement,
    ) -> Result<(), DecodeError> {
        match el.type_code {
            // structural markers carry no bytes of their own
            tc::BASE | tc::OFFSET_L | tc::OFFSET_P => Ok(()),
            tc::CHAR | tc::LEGACY_CHAR => {
                let v = cur.read_u8()?;
                obj.set(&el.name, Value::I64(v as i64));
                Ok(())
            }
            tc::SHORT => {
                let v = cur.read_i16()?;
                obj.set(&el.name, Value::I64(v as i64));
                Ok(())
            }
            tc::INT | tc::COUNTER => {
                let v = cur.read_i32()?;
                obj.set(&el.name, Value::I64(v as i64));
                Ok(())
            }
            tc::LONG | tc::LONG64 => {
                let v = cur.read_i64()?;
                obj.set(&el.name, Value::I64(v));
                Ok(())
            }
            tc::FLOAT | tc::DOUBLE32 => {
                let v = cur.read_f32()?;
                obj.set(&el.name, Value::F64(v as f64));
                Ok(())
            }
            tc::DOUBLE => {
                let v = cur.read_f64()?;
                obj.set(&el.name, Value::F64(v));
                Ok(())
            }
            tc::UCHAR => {
                let v = cur.read_u8()?;
                obj.set(&el.name, Value::U64(v as u64));
                Ok(())
            }
            tc::USHORT => {
                let v = cur.read_u16()?;
                obj.set(&el.name, Value::U64(v as u64));
                Ok(())
            }
            tc::UINT => {
                let v = cur.read_u32()?;
                obj.set(&el.name, Value::U64(v as u64));
                Ok(())
            }
            tc::ULONG | tc::ULONG64 => {
                let v = cur.read_u64()?;
                obj.set(&el.name, Value::U64(v));
                Ok(())
            }
            tc::BOOL => {
                let v = cur.read_u8()?;
                obj.set(&el.name, Value::I64(v as i64));
                Ok(())
            }
            tc::FLOAT16 => {
                // two bytes on the wire; the truncated value is not
                // reconstructed
                cur.skip(2)?;
                obj.set(&el.name, Value::Null);
                Ok(())
            }
            tc::CHAR_STAR => {
                let arr = read_counted_pointer(cur, obj, el, 'C')?;
                obj.set(&el.name, Value::Array(arr));
                Ok(())
            }
            tc::TSTRING => {
                let s = cur.read_tstring()?;
                obj.set(&el.name, Value::Str(s));
                Ok(())
            }
            tc::TOBJECT => read_tobject(cur, obj),
            tc::TNAMED => {
                let (name, title, _bits) = read_tnamed(cur, &mut session.warnings)?;
                obj.set("fName", Value::Str(name));
                obj.set("fTitle", Value::Str(title));
                Ok(())
            }
            tc::OBJECT | tc::OBJECT_INLINE_PTR | tc::ANY_INLINE_PTR => {
                // embedded value object of the declared class; decoded in a
                // fresh object scope
                let class = el.type_name.trim_end_matches('*').to_string();
                let mut nested = session.nested();
                let mut val = DecodedObject::new(&class);
                let res = ctx.class_streamer(cur, &mut nested, &mut val, &class);
                session.absorb(nested);
                res?;
                obj.set(&el.name, Value::Object(Arc::new(val)));
                Ok(())
            }
            tc::OBJECT_OWNED_PTR | tc::ANY_OWNED_PTR => {
                // owned pointer: the stream decides the concrete class
                let mut nested = session.nested();
                let res = ctx.read_object_any(cur, &mut nested);
                session.absorb(nested);
                obj.set(&el.name, res?);
                Ok(())
            }
            c if c > tc::OFFSET_L && c < tc::OFFSET_P => {
                let kind = array_kind(c - tc::OFFSET_L).ok_or_else(|| unsupported(el))?;
                let arr = read_fast_array(cur, el.length as usize, kind)?;
                obj.set(&el.name, Value::Array(arr));
                Ok(())
            }
            c if c > tc::OFFSET_P && c <= tc::OFFSET_P + tc::FLOAT16 => {
                let kind = array_kind(c - tc::OFFSET_P).ok_or_else(|| unsupported(el))?;
                let arr = read_counted_pointer(cur, obj, el, kind)?;
                obj.set(&el.name, Value::Array(arr));
                Ok(())
            }
            _ => Err(unsupported(el)),
        }
    }
}

fn unsupported(el: &StreamerElement) -> DecodeError {
    DecodeError::UnsupportedType {
        member: el.name.clone(),
        type_name: el.type_name.clone(),
        code: el.type_code,
    }
}

/// Element kind letter for array reads, named after the `TArray` suffixes.
fn array_kind(prim: u32) -> Option<char> {
    match prim {
        tc::CHAR | tc::LEGACY_CHAR | tc::UCHAR | tc::BOOL => Some('C'),
        tc::SHORT | tc::USHORT => Some('S'),
        tc::INT | tc::UINT | tc::COUNTER => Some('I'),
        tc::LONG | tc::ULONG | tc::LONG64 | tc::ULONG64 => Some('L'),
        tc::FLOAT | tc::DOUBLE32 => Some('F'),
        tc::DOUBLE => Some('D'),
        _ => None,
    }
}

/// `n` elements of the given kind; unknown kinds fall back to unsigned
/// words, which is what untyped index arrays use.
fn read_fast_array(cur: &mut Cursor, n: usize, kind: char) -> Result<Vec<Value>, DecodeError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(match kind {
            'C' => Value::I64(cur.read_u8()? as i64),
            'S' => Value::I64(cur.read_i16()? as i64),
            'I' => Value::I64(cur.read_i32()? as i64),
            'L' => Value::I64(cur.read_i64()?),
            'F' => Value::F64(cur.read_f32()? as f64),
            'D' => Value::F64(cur.read_f64()?),
            _ => Value::U64(cur.read_u32()? as u64),
        });
    }
    Ok(out)
}

/// Count-prefixed array, the `TArray` payload layout.
fn read_array(cur: &mut Cursor, kind: char) -> Result<(u32, Vec<Value>), DecodeError> {
    let n = cur.read_u32()?;
    let arr = read_fast_array(cur, n as usize, kind)?;
    Ok((n, arr))
}

/// Live element count of a counted-pointer member, read from the sibling
/// field its catalog entry names. A missing count decodes as empty.
fn member_count(obj: &DecodedObject, el: &StreamerElement) -> usize {
    el.count_name
        .as_deref()
        .and_then(|name| obj.get(name))
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as usize)
        .unwrap_or(0)
}

/// Pointer-to-array member: one presence byte, then the counted payload.
fn read_counted_pointer(
    cur: &mut Cursor,
    obj: &DecodedObject,
    el: &StreamerElement,
    kind: char,
) -> Result<Vec<Value>, DecodeError> {
    let n = member_count(obj, el);
    let present = cur.read_u8()?;
    if present == 0 {
        return Ok(Vec::new());
    }
    read_fast_array(cur, n, kind)
}

/// Base-object header: version word, unique id, status bits.
pub(crate) fn read_tobject(cur: &mut Cursor, obj: &mut DecodedObject) -> Result<(), DecodeError> {
    cur.skip(2)?;
    obj.set("fUniqueID", Value::U64(cur.read_u32()? as u64));
    obj.set("fBits", Value::U64(cur.read_u32()? as u64));
    Ok(())
}

/// Named-object layout: base-object header plus name and title strings.
pub(crate) fn read_tnamed(
    cur: &mut Cursor,
    warnings: &mut Vec<ByteCountMismatch>,
) -> Result<(String, String, u32), DecodeError> {
    let rec = VersionedRecord::open(cur)?;
    cur.skip(2)?;
    cur.skip(4)?;
    let bits = cur.read_u32()?;
    let name = cur.read_tstring()?;
    let title = cur.read_tstring()?;
    rec.close(cur, Some("TNamed"), warnings);
    Ok((name, title, bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::catalog::{StreamerCatalog, StreamerInfo};
    use crate::test_utils::{ClassReg, Writer};
    use crate::MAP_OFFSET;

    fn info(name: &str, elements: Vec<StreamerElement>) -> StreamerInfo {
        StreamerInfo {
            name: name.to_string(),
            title: String::new(),
            checksum: 0,
            class_version: 1,
            elements,
        }
    }

    fn basic(name: &str, code: u32, type_name: &str) -> StreamerElement {
        StreamerElement::new(name, code, type_name)
    }

    fn streamers(infos: Vec<StreamerInfo>) -> Streamers {
        let mut catalog = StreamerCatalog::default();
        for i in infos {
            catalog.insert(i);
        }
        Streamers::new(catalog, RwLock::new(ClassTagMap::default()))
    }

    fn decode(
        ctx: &Streamers,
        buf: &[u8],
        tag_offset: u64,
        class: &str,
    ) -> Result<DecodedObject, DecodeError> {
        let mut cur = Cursor::new(buf);
        let mut session = DecodeSession::new(tag_offset, ctx.classes());
        let mut obj = DecodedObject::new(class);
        ctx.class_streamer(&mut cur, &mut session, &mut obj, class)?;
        Ok(obj)
    }

    #[test]
    fn scalar_members_in_catalog_order() {
        let ctx = streamers(vec![info(
            "TVertex",
            vec![
                basic("fX", tc::DOUBLE, "Double_t"),
                basic("fNdof", tc::INT, "Int_t"),
                basic("fLabel", tc::TSTRING, "TString"),
            ],
        )]);
        let mut w = Writer::new();
        w.versioned(1, |w| {
            w.f64(2.25);
            w.i32(-7);
            w.tstring("primary");
        });
        let obj = decode(&ctx, &w.into_vec(), 0, "TVertex").unwrap();
        assert_eq!(obj.get("fX").unwrap().as_f64(), Some(2.25));
        assert_eq!(obj.get("fNdof").unwrap().as_i64(), Some(-7));
        assert_eq!(obj.get("fLabel").unwrap().as_str(), Some("primary"));
    }

    #[test]
    fn bases_run_before_members_regardless_of_order() {
        let mut base_el = basic("TPointBase", tc::BASE, "BASE");
        base_el.base_version = Some(1);
        let ctx = streamers(vec![
            info("TPointBase", vec![basic("fId", tc::INT, "Int_t")]),
            // member listed before the base on purpose
            info(
                "TTrack",
                vec![basic("fPt", tc::DOUBLE, "Double_t"), base_el],
            ),
        ]);
        let mut w = Writer::new();
        w.versioned(2, |w| {
            // base payload first on the wire
            w.versioned(1, |w| w.i32(42));
            w.f64(13.5);
        });
        let obj = decode(&ctx, &w.into_vec(), 0, "TTrack").unwrap();
        assert_eq!(obj.get("fId").unwrap().as_i64(), Some(42));
        assert_eq!(obj.get("fPt").unwrap().as_f64(), Some(13.5));
    }

    #[test]
    fn fixed_and_counted_arrays() {
        let mut counted = basic("fErrors", tc::OFFSET_P + tc::DOUBLE, "Double_t*");
        counted.count_name = Some("fN".to_string());
        let mut fixed = basic("fCoords", tc::OFFSET_L + tc::FLOAT, "Float_t");
        fixed.length = 3;
        let ctx = streamers(vec![info(
            "TFit",
            vec![basic("fN", tc::COUNTER, "Int_t"), fixed, counted],
        )]);
        let mut w = Writer::new();
        w.versioned(1, |w| {
            w.i32(2);
            for v in [1.0f32, 2.0, 3.0] {
                w.f32(v);
            }
            w.u8(1); // array present
            w.f64(0.5);
            w.f64(0.25);
        });
        let obj = decode(&ctx, &w.into_vec(), 0, "TFit").unwrap();
        let coords = obj.get("fCoords").unwrap().as_array().unwrap();
        assert_eq!(coords.len(), 3);
        assert_eq!(coords[2].as_f64(), Some(3.0));
        let errors = obj.get("fErrors").unwrap().as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].as_f64(), Some(0.25));
    }

    #[test]
    fn absent_counted_pointer_is_empty() {
        let mut counted = basic("fVals", tc::OFFSET_P + tc::INT, "Int_t*");
        counted.count_name = Some("fN".to_string());
        let ctx = streamers(vec![info(
            "TSparse",
            vec![basic("fN", tc::COUNTER, "Int_t"), counted],
        )]);
        let mut w = Writer::new();
        w.versioned(1, |w| {
            w.i32(5);
            w.u8(0); // no payload follows
        });
        let obj = decode(&ctx, &w.into_vec(), 0, "TSparse").unwrap();
        assert!(obj.get("fVals").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn array_base_contributes_count_and_payload() {
        let ctx = streamers(vec![info(
            "TH1ILike",
            vec![
                basic("TArrayI", tc::BASE, "BASE"),
                basic("fScale", tc::DOUBLE, "Double_t"),
            ],
        )]);
        let mut w = Writer::new();
        w.versioned(1, |w| {
            w.u32(2);
            w.i32(10);
            w.i32(20);
            w.f64(1.5);
        });
        let obj = decode(&ctx, &w.into_vec(), 0, "TH1ILike").unwrap();
        assert_eq!(obj.get("fN").unwrap().as_u64(), Some(2));
        let arr = obj.get("fArray").unwrap().as_array().unwrap();
        assert_eq!(arr[1].as_i64(), Some(20));
        assert_eq!(obj.get("fScale").unwrap().as_f64(), Some(1.5));
    }

    #[test]
    fn shared_subobject_decodes_once() {
        let tag_offset = 40u64;
        let ctx = streamers(vec![info(
            "TPoint",
            vec![basic("fVal", tc::INT, "Int_t")],
        )]);
        let mut w = Writer::new();
        let mut reg = ClassReg::new(tag_offset as u16);
        let mut first_tag = 0;
        w.versioned(3, |w| {
            w.raw(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0]); // base object header
            w.tstring(""); // array name
            w.u32(3);
            w.u32(0); // lower bound
            let first_at = w.len();
            first_tag = tag_offset as u32 + first_at as u32 + MAP_OFFSET as u32;
            w.object_any(&mut reg, "TPoint", |w, _| {
                w.versioned(1, |w| w.i32(99));
            });
            w.u32(first_tag); // back-reference
            w.u32(first_tag); // and again
        });
        let buf = w.into_vec();
        let mut cur = Cursor::new(&buf);
        let mut session = DecodeSession::new(tag_offset, ctx.classes());
        let mut list = DecodedObject::new("TObjArray");
        ctx.read_tobjarray(&mut cur, &mut session, &mut list).unwrap();
        let arr = list.get("arr").unwrap().as_array().unwrap();
        assert_eq!(arr.len(), 3);
        let a = arr[0].as_object().unwrap();
        let b = arr[1].as_object().unwrap();
        let c = arr[2].as_object().unwrap();
        assert_eq!(a.get("fVal").unwrap().as_i64(), Some(99));
        assert!(Arc::ptr_eq(a, b));
        assert!(Arc::ptr_eq(a, c));
        assert_eq!(session.objects.len(), 1);
    }

    #[test]
    fn dangling_back_reference_is_null() {
        let ctx = streamers(vec![]);
        let buf = 0x0000_0444_u32.to_be_bytes();
        let mut cur = Cursor::new(&buf);
        let mut session = DecodeSession::new(0, ctx.classes());
        let val = ctx.read_object_any(&mut cur, &mut session).unwrap();
        assert!(val.is_null());
    }

    #[test]
    fn unsupported_code_aborts_object() {
        let ctx = streamers(vec![info(
            "TWeird",
            vec![basic("fCont", tc::STL, "vector<int>")],
        )]);
        let mut w = Writer::new();
        w.versioned(1, |w| w.u32(0));
        let err = decode(&ctx, &w.into_vec(), 0, "TWeird").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedType {
                member: "fCont".into(),
                type_name: "vector<int>".into(),
                code: tc::STL,
            }
        );
    }

    #[test]
    fn missing_streamer_info_is_an_error() {
        let ctx = streamers(vec![]);
        let mut w = Writer::new();
        w.versioned(1, |w| w.u32(0));
        let err = decode(&ctx, &w.into_vec(), 0, "TNowhere").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingStreamerInfo {
                class_name: "TNowhere".into()
            }
        );
    }

    #[test]
    fn byte_count_mismatch_heals_and_reports() {
        // catalog claims an int, the producer wrote an int and two extra
        // bytes into the record
        let ctx = streamers(vec![info(
            "TOdd",
            vec![basic("fA", tc::INT, "Int_t"), basic("fB", tc::INT, "Int_t")],
        )]);
        let mut w = Writer::new();
        w.versioned(1, |w| {
            w.i32(1);
            w.i32(2);
            w.u16(0xbeef); // trailing bytes the elements do not consume
        });
        let buf = w.into_vec();
        let mut cur = Cursor::new(&buf);
        let mut session = DecodeSession::new(0, ctx.classes());
        let mut obj = DecodedObject::new("TOdd");
        ctx.class_streamer(&mut cur, &mut session, &mut obj, "TOdd")
            .unwrap();
        assert_eq!(obj.get("fB").unwrap().as_i64(), Some(2));
        assert_eq!(session.warnings.len(), 1);
        assert_eq!(session.warnings[0].context, "TOdd");
        // cursor realigned to the declared end of the record
        assert_eq!(cur.pos(), buf.len());
    }

    #[test]
    fn tlist_elements_and_options() {
        let ctx = streamers(vec![info(
            "TPoint",
            vec![basic("fVal", tc::INT, "Int_t")],
        )]);
        let mut w = Writer::new();
        let mut reg = ClassReg::new(0);
        w.versioned(5, |w| {
            w.raw(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
            w.tstring("stuff");
            w.u32(1);
            w.object_any(&mut reg, "TPoint", |w, _| {
                w.versioned(1, |w| w.i32(3));
            });
            w.tstring("opt1");
        });
        let buf = w.into_vec();
        let mut cur = Cursor::new(&buf);
        let mut session = DecodeSession::new(0, ctx.classes());
        let mut list = DecodedObject::new("TList");
        ctx.read_tlist(&mut cur, &mut session, &mut list).unwrap();
        assert_eq!(list.get("name").unwrap().as_str(), Some("stuff"));
        let arr = list.get("arr").unwrap().as_array().unwrap();
        assert_eq!(arr.len(), 1);
        let opt = list.get("opt").unwrap().as_array().unwrap();
        assert_eq!(opt[0].as_str(), Some("opt1"));
    }

    #[test]
    fn clones_array_streams_members_directly() {
        let ctx = streamers(vec![info(
            "THit",
            vec![basic("fAdc", tc::SHORT, "Short_t")],
        )]);
        let mut w = Writer::new();
        w.versioned(3, |w| {
            w.raw(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
            w.tstring("");
            w.tstring("THit;1");
            w.i32(2);
            w.u32(0);
            for adc in [100i16, -5] {
                w.versioned(1, |w| w.i16(adc));
            }
        });
        let buf = w.into_vec();
        let mut cur = Cursor::new(&buf);
        let mut session = DecodeSession::new(0, ctx.classes());
        let mut arr_obj = DecodedObject::new("TClonesArray");
        ctx.read_tclones_array(&mut cur, &mut session, &mut arr_obj)
            .unwrap();
        let arr = arr_obj.get("arr").unwrap().as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(
            arr[1].as_object().unwrap().get("fAdc").unwrap().as_i64(),
            Some(-5)
        );
    }
}
