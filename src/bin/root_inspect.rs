use std::env;
use std::path::Path;
use std::process;

use rootfile::core::Directory;
use rootfile::{RootFile, Value};

fn print_value(value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Array(items) if items.len() > 8 => {
            println!("{}[{} elements]", pad, items.len())
        }
        Value::Array(items) => {
            for item in items {
                print_value(item, indent + 1);
            }
        }
        Value::Object(obj) => {
            println!("{}{} {{", pad, obj.type_name());
            for (name, val) in obj.fields() {
                print!("{}  {} = ", pad, name);
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!();
                        print_value(val, indent + 2);
                    }
                    other => println!("{:?}", other),
                }
            }
            println!("{}}}", pad);
        }
        other => println!("{}{:?}", pad, other),
    }
}

fn print_directory(dir: &Directory, indent: usize) {
    let pad = "  ".repeat(indent);
    for key in &dir.keys {
        println!(
            "{}{};{}  {}  ({} -> {} bytes)  {}",
            pad,
            key.name,
            key.cycle,
            key.class_name,
            key.payload_len(),
            key.uncomp_len,
            key.title,
        );
    }
    for sub in &dir.dirs {
        println!("{}{}/", pad, sub.name);
        print_directory(sub, indent + 1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: root_inspect <file.root> [object[;cycle]]");
        process::exit(2);
    }
    let file = RootFile::open(Path::new(&args[1]))?;
    let hdr = file.header();
    println!(
        "format version {}, compression {}, uuid {}",
        hdr.version, hdr.compression, hdr.uuid
    );
    println!("keys:");
    print_directory(file.root_directory(), 1);
    println!("streamer catalog: {} classes", file.streamer_catalog().len());

    if let Some(spec) = args.get(2) {
        let (name, cycle) = match spec.split_once(';') {
            Some((n, c)) => (n, c.parse()?),
            None => (spec.as_str(), 1),
        };
        let decoded = file.read_object(name, cycle)?;
        for warning in &decoded.warnings {
            eprintln!(
                "warning: byte count mismatch in {} (expected {}, read {})",
                warning.context, warning.expected, warning.actual
            );
        }
        print_value(&Value::Object(decoded.obj), 0);
    }
    Ok(())
}

// dummy main for wasm
#[cfg(target_arch = "wasm32")]
fn main() {}
