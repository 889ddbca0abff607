//! Reader for ROOT files.
//!
//! A ROOT file is a random-access archive of named, typed, optionally
//! compressed records ("keys") whose payloads are streams of polymorphic
//! objects. The layout of every streamed class is described by an in-band
//! catalog ("streamer info") which is itself stored as a regular record in
//! the file, so the decoder bootstraps itself from the data it reads.
//!
//! Decoded objects are dynamic: class layouts are only known at decode time,
//! so the result of a read is a [`DecodedObject`] holding `name -> Value`
//! fields, with the class name attached for consumer-side dispatch.
#![recursion_limit = "256"]
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate failure;
extern crate flate2;
extern crate lzma_rs;
extern crate nom;

pub mod core;
pub mod streamer;
pub mod test_utils;

pub use crate::core::{
    ByteCountMismatch, Cursor, DecodeError, Decoded, DecodedObject, ObjBits, RootFile, Source,
    TKey, Value,
};
pub use crate::streamer::{StreamerCatalog, StreamerElement, StreamerInfo};

/// Offset added to record-relative byte positions when keying the object and
/// class maps; part of the wire format's tag convention.
const MAP_OFFSET: u64 = 2;
