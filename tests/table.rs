use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use resarc::chunk::{Chunk, SerializeOptions};
use resarc::config::ResourceConfiguration;
use resarc::error::Error;
use resarc::res_value::{ResourceValue, ValueType};
use resarc::string_pool::StringPoolChunk;
use resarc::table::{
    Entry, EntryValue, LibraryChunk, LibraryEntry, PackageChunk, ResourceTableChunk, TypeChunk,
    TypeSpecChunk, NO_ENTRY, SPEC_PUBLIC,
};

fn parse_chunk(data: &[u8]) -> Chunk {
    let mut cursor = Cursor::new(data);
    Chunk::parse(&mut cursor).unwrap()
}

fn int_entry(key_index: u32, data: u32) -> Entry {
    Entry::simple(key_index, ResourceValue::new(ValueType::IntDec, data))
}

#[test]
fn dense_type_chunk_round_trips() {
    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    let mut entries = BTreeMap::new();
    entries.insert(0u16, int_entry(0, 7));
    entries.insert(2u16, int_entry(1, 9));
    type_chunk.set_entries(entries, 4);

    let written = Chunk::TableType(type_chunk).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(written.len(), 96);
    assert_eq!(u32::from_le_bytes(written[4..8].try_into().unwrap()), 96);

    // dense offset table: one slot per possible index, sentinel for absences
    let offset_at = |slot: usize| {
        let base = 48 + slot * 4;
        u32::from_le_bytes(written[base..base + 4].try_into().unwrap())
    };
    assert_eq!(offset_at(0), 0);
    assert_eq!(offset_at(1), NO_ENTRY);
    assert_eq!(offset_at(2), 16);
    assert_eq!(offset_at(3), NO_ENTRY);

    let reparsed = match parse_chunk(&written) {
        Chunk::TableType(chunk) => chunk,
        other => panic!("expected a type chunk, got {other:?}"),
    };
    assert_eq!(reparsed.id(), 1);
    assert_eq!(reparsed.total_entry_count(), 4);
    assert!(!reparsed.is_sparse());
    assert_eq!(reparsed.entries().len(), 2);
    assert_eq!(reparsed.entries()[&0], int_entry(0, 7));
    assert_eq!(reparsed.entries()[&2], int_entry(1, 9));
    assert_eq!(*reparsed.configuration(), ResourceConfiguration::default());

    let rewritten = Chunk::TableType(reparsed).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(rewritten, written);
}

#[test]
fn sparse_type_chunk_round_trips() {
    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    let mut entries = BTreeMap::new();
    entries.insert(0u16, int_entry(0, 1));
    entries.insert(1u16, int_entry(1, 2));
    type_chunk.set_entries(entries, 2);
    type_chunk.set_sparse_entries(true);

    let written = Chunk::TableType(type_chunk).to_bytes(SerializeOptions::NONE).unwrap();
    // sparse table rows are (index, offset / 4) pairs
    assert_eq!(written.len(), 88);
    assert_eq!(
        &written[48..56],
        &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x04, 0x00]
    );

    let reparsed = match parse_chunk(&written) {
        Chunk::TableType(chunk) => chunk,
        other => panic!("expected a type chunk, got {other:?}"),
    };
    assert!(reparsed.is_sparse());
    assert_eq!(reparsed.entries().len(), 2);
    assert_eq!(reparsed.entries()[&1], int_entry(1, 2));

    let rewritten = Chunk::TableType(reparsed).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(rewritten, written);
}

#[test]
fn unknown_value_tags_are_reported() {
    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    type_chunk.set_entries(BTreeMap::from([(0u16, int_entry(0, 7))]), 1);
    let mut written = Chunk::TableType(type_chunk).to_bytes(SerializeOptions::NONE).unwrap();

    // corrupt the entry value's tag byte: header (48) + offset table (4) +
    // entry header (8) + value size and reserved byte (3)
    written[63] = 0x20;

    let mut cursor = Cursor::new(written.as_slice());
    match Chunk::parse(&mut cursor) {
        Err(Error::UnknownValueType(0x20)) => {}
        other => panic!("expected an unknown value type error, got {other:?}"),
    }
}

#[test]
fn override_entries_inserts_removes_and_ignores() {
    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    let mut entries = BTreeMap::new();
    entries.insert(0u16, int_entry(0, 1));
    entries.insert(2u16, int_entry(2, 3));
    type_chunk.set_entries(entries, 4);

    let mut overrides = BTreeMap::new();
    overrides.insert(1u16, Some(int_entry(1, 2)));
    overrides.insert(2u16, None);
    overrides.insert(9u16, Some(int_entry(9, 9))); // out of range: no-op
    type_chunk.override_entries(overrides);

    assert_eq!(
        type_chunk.entries().keys().copied().collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(type_chunk.entries()[&1], int_entry(1, 2));
}

#[test]
fn private_resources_strips_the_public_flag() {
    let mut entry = int_entry(0, 1);
    entry.set_public(true);
    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    type_chunk.set_entries(BTreeMap::from([(0u16, entry)]), 1);
    let chunk = Chunk::TableType(type_chunk);

    let plain = parse_chunk(&chunk.to_bytes(SerializeOptions::NONE).unwrap());
    if let Chunk::TableType(plain) = plain {
        assert!(plain.entries()[&0].is_public());
    } else {
        panic!("expected a type chunk");
    }

    let stripped = parse_chunk(&chunk.to_bytes(SerializeOptions::PRIVATE_RESOURCES).unwrap());
    if let Chunk::TableType(stripped) = stripped {
        assert!(!stripped.entries()[&0].is_public());
    } else {
        panic!("expected a type chunk");
    }
}

#[test]
fn type_spec_round_trips_and_strips_spec_public() {
    let spec = TypeSpecChunk::new(1, vec![SPEC_PUBLIC | 0x7, 0x3]);
    assert!(spec.is_public(0));
    assert!(!spec.is_public(1));
    let chunk = Chunk::TableTypeSpec(spec);

    let written = chunk.to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(written.len(), 24);
    let reparsed = match parse_chunk(&written) {
        Chunk::TableTypeSpec(spec) => spec,
        other => panic!("expected a type spec, got {other:?}"),
    };
    assert_eq!(reparsed.masks(), &[SPEC_PUBLIC | 0x7, 0x3]);

    let stripped = chunk.to_bytes(SerializeOptions::PRIVATE_RESOURCES).unwrap();
    let reparsed = match parse_chunk(&stripped) {
        Chunk::TableTypeSpec(spec) => spec,
        other => panic!("expected a type spec, got {other:?}"),
    };
    assert_eq!(reparsed.masks(), &[0x7, 0x3]);
}

#[test]
fn library_chunk_round_trips() {
    let library = LibraryChunk::new(vec![LibraryEntry {
        package_id: 2,
        package_name: "com.example.shared".to_string(),
    }]);
    let written = Chunk::TableLibrary(library).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(written.len(), 12 + 4 + 256);

    let reparsed = match parse_chunk(&written) {
        Chunk::TableLibrary(library) => library,
        other => panic!("expected a library chunk, got {other:?}"),
    };
    assert_eq!(reparsed.entries().len(), 1);
    assert_eq!(reparsed.entries()[0].package_id, 2);
    assert_eq!(reparsed.entries()[0].package_name, "com.example.shared");
}

fn sample_package() -> PackageChunk {
    let mut type_pool = StringPoolChunk::new(true);
    type_pool.add("attr");
    let mut key_pool = StringPoolChunk::new(true);
    key_pool.add("k0");
    key_pool.add("k1");

    let mut package = PackageChunk::new(0x7f, "com.example.app", type_pool, key_pool);
    package.add_chunk(Chunk::TableTypeSpec(TypeSpecChunk::new(1, vec![0, 0])));

    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    let mut entries = BTreeMap::new();
    entries.insert(0u16, int_entry(0, 10));
    entries.insert(1u16, int_entry(1, 11));
    type_chunk.set_entries(entries, 2);
    package.add_chunk(Chunk::TableType(type_chunk));
    package
}

#[test]
fn package_round_trips_with_patched_pool_offsets() {
    let written = Chunk::TablePackage(sample_package()).to_bytes(SerializeOptions::NONE).unwrap();

    // the first pool child sits right after the 288-byte header, and the
    // patched header slot at 268 must say so or re-parsing would fail
    assert_eq!(u32::from_le_bytes(written[268..272].try_into().unwrap()), 288);

    let reparsed = match parse_chunk(&written) {
        Chunk::TablePackage(package) => package,
        other => panic!("expected a package chunk, got {other:?}"),
    };
    assert_eq!(reparsed.id(), 0x7f);
    assert_eq!(reparsed.name(), "com.example.app");
    assert_eq!(reparsed.type_string_pool().strings(), ["attr"]);
    assert_eq!(reparsed.key_string_pool().strings(), ["k0", "k1"]);
    assert_eq!(reparsed.type_chunks().count(), 1);
    assert_eq!(reparsed.type_spec_chunks().count(), 1);
    assert!(reparsed.library_chunk().is_none());

    let rewritten = Chunk::TablePackage(reparsed).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(rewritten, written);
}

#[test]
fn deleting_some_keys_keeps_the_type_chunk() {
    let mut package = sample_package();
    let deleted = package.delete_key_strings(&BTreeSet::from([1]));
    assert_eq!(deleted, 0);
    assert_eq!(package.key_string_pool().strings(), ["k0"]);

    let type_chunk = package.type_chunks().next().unwrap();
    assert_eq!(
        type_chunk.entries().keys().copied().collect::<Vec<_>>(),
        vec![0]
    );
    assert_eq!(type_chunk.entries()[&0].key_index(), 0);
    assert_eq!(package.type_spec_chunks().count(), 1);
}

#[test]
fn deleting_every_key_cascades_to_type_and_spec_chunks() {
    let mut package = sample_package();
    let deleted = package.delete_key_strings(&BTreeSet::from([0, 1]));
    assert_eq!(deleted, 1);
    assert_eq!(package.type_chunks().count(), 0);
    assert_eq!(package.type_spec_chunks().count(), 0);
    // the pools survive the child compaction
    assert_eq!(package.type_string_pool().strings(), ["attr"]);
    assert!(package.key_string_pool().strings().is_empty());
}

fn sample_table() -> ResourceTableChunk {
    let mut global = StringPoolChunk::new(true);
    for i in 0..8 {
        global.add(format!("s{i}"));
    }
    let mut table = ResourceTableChunk::new(global);

    let mut type_pool = StringPoolChunk::new(true);
    type_pool.add("style");
    let mut key_pool = StringPoolChunk::new(true);
    key_pool.add("complex");
    key_pool.add("simple");
    let mut package = PackageChunk::new(0x7f, "com.example.app", type_pool, key_pool);

    let mut type_chunk = TypeChunk::new(1, ResourceConfiguration::default());
    let mut entries = BTreeMap::new();
    entries.insert(
        0u16,
        Entry::complex(
            0,
            0,
            BTreeMap::from([(5u32, ResourceValue::new(ValueType::String, 7))]),
        ),
    );
    entries.insert(
        1u16,
        Entry::simple(1, ResourceValue::new(ValueType::String, 3)),
    );
    type_chunk.set_entries(entries, 2);
    package.add_chunk(Chunk::TableType(type_chunk));
    table.add_package_chunk(package);
    table
}

#[test]
fn global_string_deletion_rewrites_complex_values_and_drops_simple_entries() {
    let mut table = sample_table();
    table.delete_strings(&BTreeSet::from([3])).unwrap();

    assert_eq!(table.string_pool().count(), 7);
    let package = table.packages().next().unwrap();
    let type_chunk = package.type_chunks().next().unwrap();

    // the simple entry pointed at the deleted string and is gone
    assert!(!type_chunk.entries().contains_key(&1));

    // the complex entry survives with its sub-value remapped 7 -> 6
    let entry = &type_chunk.entries()[&0];
    match entry.value() {
        EntryValue::Complex { values, .. } => {
            assert_eq!(values[&5].value_type, ValueType::String);
            assert_eq!(values[&5].data, 6);
        }
        other => panic!("expected a complex entry, got {other:?}"),
    }
}

#[test]
fn deleting_a_string_behind_a_complex_value_is_an_error() {
    let mut table = sample_table();
    // index 7 is referenced by the complex entry's sub-value
    assert!(table.delete_strings(&BTreeSet::from([7])).is_err());
}

#[test]
fn table_round_trips_through_bytes() {
    let table = sample_table();
    let written = Chunk::Table(table).to_bytes(SerializeOptions::NONE).unwrap();

    let reparsed = match parse_chunk(&written) {
        Chunk::Table(table) => table,
        other => panic!("expected a resource table, got {other:?}"),
    };
    assert_eq!(reparsed.packages().count(), 1);
    assert_eq!(reparsed.string_pool().count(), 8);
    assert_eq!(
        u32::from_le_bytes(written[8..12].try_into().unwrap()),
        1,
        "package count"
    );

    let rewritten = Chunk::Table(reparsed).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(rewritten, written);
}
