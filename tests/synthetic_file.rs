//! End-to-end decode of a file built byte by byte: header, directory tree,
//! deflate-compressed histogram payloads and a self-describing streamer
//! catalog.

use rootfile::test_utils::{build_minimal_file, H1_FIELDS, H2_FIELDS};
use rootfile::{RootFile, Value};

#[test]
fn open_list_read_round_trip() {
    let file = RootFile::open(build_minimal_file()).unwrap();

    let keys = file.list_keys("").unwrap();
    let names: Vec<_> = keys.iter().map(|k| (k.name.as_str(), k.cycle)).collect();
    assert_eq!(names, [("h1", 1), ("histos", 1)]);

    let decoded = file.read_object("h1", 1).unwrap();
    assert!(decoded.warnings.is_empty());
    assert_eq!(decoded.obj.type_name(), "TH1I");
    for (name, want) in H1_FIELDS {
        let value = decoded
            .obj
            .get(name)
            .unwrap_or_else(|| panic!("missing field {}", name));
        assert_eq!(value.as_f64(), Some(*want), "field {}", name);
    }
    // integers decoded as integers, not floats
    assert!(matches!(decoded.obj.get("fNcells"), Some(Value::I64(64))));
}

#[test]
fn sub_directory_objects_decode_too() {
    let file = RootFile::open(build_minimal_file()).unwrap();
    let decoded = file.read_object("h2", 1).unwrap();
    assert_eq!(decoded.obj.type_name(), "TH1I");
    for (name, want) in H2_FIELDS {
        assert_eq!(decoded.obj.get(name).unwrap().as_f64(), Some(*want));
    }
}

#[test]
fn catalog_survives_open() {
    let file = RootFile::open(build_minimal_file()).unwrap();
    let info = file.streamer_catalog().get("TH1I").unwrap();
    assert_eq!(info.class_version, 2);
    assert_eq!(info.elements.len(), H1_FIELDS.len());
    assert_eq!(info.elements[0].name, "fNcells");
}

#[test]
fn corrupt_key_leaves_siblings_readable() {
    let pristine = build_minimal_file();
    let file = RootFile::open(pristine.clone()).unwrap();
    let envelope_at = file.get_key("h1", 1).unwrap().data_offset() as usize;

    let mut broken = pristine;
    broken[envelope_at] = b'A';
    broken[envelope_at + 1] = b'A';
    let file = RootFile::open(broken).unwrap();

    let err = file.read_object("h1", 1).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("h1"), "error should name the key: {}", msg);

    // the failure is scoped to that key
    let ok = file.read_object("h2", 1).unwrap();
    assert_eq!(ok.obj.get("fNcells").unwrap().as_i64(), Some(12));
}

#[test]
fn unknown_key_reports_name_and_cycle() {
    let file = RootFile::open(build_minimal_file()).unwrap();
    let err = file.read_object("h1", 7).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("h1") && msg.contains('7'), "{}", msg);
}
