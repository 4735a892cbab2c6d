use std::collections::BTreeMap;
use std::io::Cursor;

use resarc::chunk::{Chunk, ChunkType, ResourceFile, SerializeOptions};
use resarc::config::ResourceConfiguration;
use resarc::res_value::{ResourceValue, ValueType};
use resarc::string_pool::StringPoolChunk;
use resarc::table::{Entry, PackageChunk, ResourceTableChunk, TypeChunk, TypeSpecChunk, SPEC_PUBLIC};

/// An overlayable chunk: a known type code with no structured model.
fn overlayable_bytes() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&0x0204u16.to_le_bytes());
    data.extend_from_slice(&16u16.to_le_bytes()); // header size
    data.extend_from_slice(&24u32.to_le_bytes()); // chunk size
    data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]); // header body
    data.extend_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]); // payload
    data
}

#[test]
fn unknown_chunks_are_preserved_byte_for_byte() {
    let data = overlayable_bytes();
    let file = ResourceFile::parse(&data).unwrap();
    assert_eq!(file.chunks().len(), 1);
    match &file.chunks()[0] {
        Chunk::Unknown(unknown) => {
            assert_eq!(unknown.type_code(), 0x0204);
            assert_eq!(unknown.payload(), &[9, 10, 11, 12, 13, 14, 15, 16]);
        }
        other => panic!("expected an unknown chunk, got {other:?}"),
    }

    for options in [
        SerializeOptions::NONE,
        SerializeOptions::SHRINK,
        SerializeOptions::PRIVATE_RESOURCES,
        SerializeOptions::SHRINK | SerializeOptions::PRIVATE_RESOURCES,
    ] {
        assert_eq!(file.to_bytes(options).unwrap(), data);
    }
}

#[test]
fn a_file_is_a_sequence_of_top_level_chunks() {
    let mut data = overlayable_bytes();
    data.extend_from_slice(&overlayable_bytes());

    let file = ResourceFile::parse(&data).unwrap();
    assert_eq!(file.chunks().len(), 2);
    assert_eq!(file.to_bytes(SerializeOptions::NONE).unwrap(), data);
}

#[test]
fn invalid_framing_is_rejected() {
    // chunk size smaller than the declared header size
    let mut data = Vec::new();
    data.extend_from_slice(&0x0204u16.to_le_bytes());
    data.extend_from_slice(&16u16.to_le_bytes());
    data.extend_from_slice(&8u32.to_le_bytes());
    assert!(ResourceFile::parse(&data).is_err());
}

#[test]
fn chunk_type_codes_resolve_and_reject() {
    assert_eq!(ChunkType::try_from(0x0001).unwrap(), ChunkType::StringPool);
    assert_eq!(ChunkType::try_from(0x0201).unwrap(), ChunkType::TableType);
    assert!(ChunkType::try_from(0x4242).is_err());
    assert_eq!(ChunkType::TableOverlayablePolicy.code(), 0x0205);
}

fn sample_file() -> ResourceFile {
    let mut global = StringPoolChunk::new(true);
    global.add("first");
    global.add("second");
    global.add("first");

    let mut type_pool = StringPoolChunk::new(true);
    type_pool.add("string");
    let mut key_pool = StringPoolChunk::new(true);
    key_pool.add("greeting");
    key_pool.add("farewell");

    let mut package = PackageChunk::new(0x7f, "com.example.app", type_pool, key_pool);
    package.add_chunk(Chunk::TableTypeSpec(TypeSpecChunk::new(
        1,
        vec![SPEC_PUBLIC, 0],
    )));

    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    let mut public_entry = Entry::simple(0, ResourceValue::new(ValueType::String, 0));
    public_entry.set_public(true);
    let mut entries = BTreeMap::new();
    entries.insert(0u16, public_entry);
    entries.insert(1u16, Entry::simple(1, ResourceValue::new(ValueType::String, 1)));
    type_chunk.set_entries(entries, 2);
    package.add_chunk(Chunk::TableType(type_chunk));

    let mut table = ResourceTableChunk::new(global);
    table.add_package_chunk(package);
    ResourceFile::new(vec![Chunk::Table(table)])
}

fn parse_table(data: &[u8]) -> ResourceTableChunk {
    let mut cursor = Cursor::new(data);
    match Chunk::parse(&mut cursor).unwrap() {
        Chunk::Table(table) => table,
        other => panic!("expected a resource table, got {other:?}"),
    }
}

#[test]
fn serialization_is_stable_across_a_round_trip() {
    let file = sample_file();
    for options in [
        SerializeOptions::NONE,
        SerializeOptions::SHRINK,
        SerializeOptions::PRIVATE_RESOURCES,
        SerializeOptions::SHRINK | SerializeOptions::PRIVATE_RESOURCES,
    ] {
        let written = file.to_bytes(options).unwrap();
        let reparsed = ResourceFile::parse(&written).unwrap();
        assert_eq!(reparsed.to_bytes(options).unwrap(), written);
    }
}

#[test]
fn shrink_shares_strings_but_preserves_the_model() {
    let file = sample_file();
    let plain = file.to_bytes(SerializeOptions::NONE).unwrap();
    let shrunk = file.to_bytes(SerializeOptions::SHRINK).unwrap();
    assert!(shrunk.len() < plain.len());

    let table = parse_table(&shrunk);
    assert_eq!(table.string_pool().strings(), ["first", "second", "first"]);
}

#[test]
fn private_resources_strips_every_public_bit() {
    let file = sample_file();
    let written = file.to_bytes(SerializeOptions::PRIVATE_RESOURCES).unwrap();

    let table = parse_table(&written);
    let package = table.packages().next().unwrap();
    for spec in package.type_spec_chunks() {
        assert!(spec.masks().iter().all(|mask| mask & SPEC_PUBLIC == 0));
    }
    for type_chunk in package.type_chunks() {
        assert!(type_chunk.entries().values().all(|entry| !entry.is_public()));
    }

    // without the option the bits survive
    let table = parse_table(&file.to_bytes(SerializeOptions::NONE).unwrap());
    let package = table.packages().next().unwrap();
    assert!(package.type_spec_chunks().next().unwrap().is_public(0));
    assert!(package.type_chunks().next().unwrap().entries()[&0].is_public());
}
