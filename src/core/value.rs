use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    /// Status bits carried by every object deriving from the root base
    /// class, decoded from the `fBits` field.
    pub struct ObjBits: u32 {
        const IS_REFERENCED = 1 << 4;
        const CANNOT_PICK = 1 << 5;
        const IS_ON_HEAP = 0x0100_0000;
        const NOT_DELETED = 0x0200_0000;
        const ZOMBIE = 0x0400_0000;
    }
}

/// One decoded field value. The object model is dynamic because class
/// layouts are discovered at decode time from the catalog; consumers
/// dispatch on [`DecodedObject::type_name`].
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Arc<DecodedObject>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::U64(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            Value::I64(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<DecodedObject>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

/// A decoded instance: class name plus `field name -> Value`. Shared
/// sub-objects (back-references in the stream) appear as clones of one
/// `Arc`, never as duplicate decodes.
#[derive(Debug, Clone, Default)]
pub struct DecodedObject {
    type_name: String,
    fields: HashMap<String, Value>,
}

impl DecodedObject {
    pub fn new(type_name: &str) -> Self {
        DecodedObject {
            type_name: type_name.to_string(),
            fields: HashMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Test a status bit against the decoded `fBits` field, if present.
    pub fn test_bit(&self, bit: ObjBits) -> bool {
        self.get("fBits")
            .and_then(Value::as_u64)
            .map(|bits| ObjBits::from_bits_truncate(bits as u32).contains(bit))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_testing() {
        let mut obj = DecodedObject::new("TNamed");
        obj.set("fBits", Value::U64(0x0300_0010));
        assert!(obj.test_bit(ObjBits::IS_ON_HEAP));
        assert!(obj.test_bit(ObjBits::IS_REFERENCED));
        assert!(!obj.test_bit(ObjBits::ZOMBIE));
        assert!(!DecodedObject::new("TH1").test_bit(ObjBits::IS_ON_HEAP));
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(Value::I64(-3).as_f64(), Some(-3.0));
        assert_eq!(Value::U64(7).as_i64(), Some(7));
        assert_eq!(Value::I64(-1).as_u64(), None);
        assert!(Value::Null.is_null());
    }
}
