use std::collections::BTreeMap;
use std::io::Cursor;

use resarc::chunk::{Chunk, SerializeOptions};
use resarc::res_value::{ResourceId, ResourceValue, ValueType};
use resarc::string_pool::StringPoolChunk;
use resarc::xml::{
    XmlAttribute, XmlCdataChunk, XmlChunk, XmlEndElementChunk, XmlNamespaceChunk,
    XmlResourceMapChunk, XmlStartElementChunk,
};

fn parse_chunk(data: &[u8]) -> Chunk {
    let mut cursor = Cursor::new(data);
    Chunk::parse(&mut cursor).unwrap()
}

fn attribute(name_index: u32, value: ResourceValue) -> XmlAttribute {
    XmlAttribute {
        namespace_index: -1,
        name_index,
        raw_value_index: -1,
        typed_value: value,
    }
}

#[test]
fn start_element_round_trips() {
    let attributes = vec![
        attribute(1, ResourceValue::new(ValueType::IntDec, 4)),
        attribute(2, ResourceValue::new(ValueType::IntBoolean, 1)),
    ];
    let mut element = XmlStartElementChunk::new(12, -1, 0, attributes.clone());
    element.id_index = 0;

    let written = Chunk::XmlStartElement(element).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(written.len(), 16 + 20 + 2 * 20);
    // attribute_start and attribute_size are pinned at 20
    assert_eq!(u16::from_le_bytes(written[24..26].try_into().unwrap()), 20);
    assert_eq!(u16::from_le_bytes(written[26..28].try_into().unwrap()), 20);
    // special indices go back to 1-based on the wire; 0-based 0 becomes 1
    assert_eq!(u16::from_le_bytes(written[30..32].try_into().unwrap()), 1);
    assert_eq!(u16::from_le_bytes(written[32..34].try_into().unwrap()), 0);

    let reparsed = match parse_chunk(&written) {
        Chunk::XmlStartElement(element) => element,
        other => panic!("expected a start element, got {other:?}"),
    };
    assert_eq!(reparsed.node.line_number, 12);
    assert_eq!(reparsed.node.comment_index, -1);
    assert_eq!(reparsed.namespace_index, -1);
    assert_eq!(reparsed.name_index, 0);
    assert_eq!(reparsed.id_index, 0);
    assert_eq!(reparsed.class_index, -1);
    assert_eq!(reparsed.style_index, -1);
    assert_eq!(reparsed.attributes(), attributes.as_slice());

    let rewritten = Chunk::XmlStartElement(reparsed).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(rewritten, written);
}

#[test]
fn remap_references_touches_only_foreign_references_in_the_map() {
    let attributes = vec![
        attribute(0, ResourceValue::new(ValueType::IntDec, 1)),
        attribute(1, ResourceValue::new(ValueType::Reference, 0x7f010001)),
        attribute(2, ResourceValue::new(ValueType::Reference, 0x01010001)),
        attribute(3, ResourceValue::new(ValueType::Reference, 0x7f990099)),
    ];
    let mut element = XmlStartElementChunk::new(1, -1, 0, attributes);

    let remap = BTreeMap::from([
        (0x7f010001u32, 0x7f010099u32),
        // system references are never rewritten, even when mapped
        (0x01010001u32, 0x01010099u32),
    ]);
    element.remap_references(&remap);

    let data: Vec<u32> = element
        .attributes()
        .iter()
        .map(|attribute| attribute.typed_value.data)
        .collect();
    assert_eq!(data, vec![1, 0x7f010099, 0x01010001, 0x7f990099]);
}

#[test]
fn namespace_chunks_keep_their_direction() {
    let namespace = XmlNamespaceChunk::new(2, 0, 1);

    let start = Chunk::XmlStartNamespace(namespace.clone()).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(&start[0..2], &0x0100u16.to_le_bytes());
    assert_eq!(start.len(), 24);

    let end = Chunk::XmlEndNamespace(namespace).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(&end[0..2], &0x0101u16.to_le_bytes());

    let reparsed = match parse_chunk(&start) {
        Chunk::XmlStartNamespace(namespace) => namespace,
        other => panic!("expected a start namespace, got {other:?}"),
    };
    assert_eq!(reparsed.prefix_index, 0);
    assert_eq!(reparsed.uri_index, 1);
}

#[test]
fn resource_map_lookup_is_bounds_checked() {
    let map = XmlResourceMapChunk::new(vec![0x01010000, 0x01010001]);
    assert_eq!(map.resource(0), Some(ResourceId(0x01010000)));
    assert_eq!(map.resource(1), Some(ResourceId(0x01010001)));
    assert_eq!(map.resource(2), None);
}

#[test]
fn whole_document_round_trips() {
    let mut pool = StringPoolChunk::new(true);
    pool.add("package"); // attribute name, mapped to a resource id
    pool.add("manifest");
    pool.add("cdata text");

    let document = XmlChunk::new(vec![
        Chunk::StringPool(pool),
        Chunk::XmlResourceMap(XmlResourceMapChunk::new(vec![0x01010003])),
        Chunk::XmlStartElement(XmlStartElementChunk::new(
            2,
            -1,
            1,
            vec![attribute(0, ResourceValue::new(ValueType::IntDec, 30))],
        )),
        Chunk::XmlCdata(XmlCdataChunk::new(
            3,
            2,
            ResourceValue::new(ValueType::String, 2),
        )),
        Chunk::XmlEndElement(XmlEndElementChunk::new(4, -1, 1)),
    ]);

    let written = Chunk::Xml(document).to_bytes(SerializeOptions::NONE).unwrap();
    let reparsed = match parse_chunk(&written) {
        Chunk::Xml(document) => document,
        other => panic!("expected an xml chunk, got {other:?}"),
    };

    assert_eq!(reparsed.children().len(), 5);
    let pool = reparsed.string_pool().unwrap();
    assert_eq!(pool.get(1), Some("manifest"));
    let map = reparsed.resource_map().unwrap();
    assert_eq!(map.resource(0), Some(ResourceId(0x01010003)));

    match &reparsed.children()[3] {
        Chunk::XmlCdata(cdata) => {
            assert_eq!(cdata.node.line_number, 3);
            assert_eq!(cdata.raw_value_index, 2);
            assert_eq!(cdata.typed_value, ResourceValue::new(ValueType::String, 2));
        }
        other => panic!("expected a cdata chunk, got {other:?}"),
    }

    let rewritten = Chunk::Xml(reparsed).to_bytes(SerializeOptions::NONE).unwrap();
    assert_eq!(rewritten, written);
}
