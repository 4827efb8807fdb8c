use std::time::Duration;

use dmx_model::{Angle, Color, Element, Keyvalues2DecodeError, Quaternion, Vector2, Vector3, Vector4, decode};

fn decode_document(document: &str) -> Element {
    decode(&mut document.as_bytes()).unwrap()
}

#[test]
fn scalar_attributes_round_trip() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"intValue" "int" "42"
	"floatValue" "float" "1.5"
	"boolValue" "bool" "1"
	"stringValue" "string" "hello world"
	"timeValue" "time" "2.5"
	"colorValue" "color" "255 128 0"
	"planarValue" "vector2" "0.5 1"
	"spatialValue" "vector3" "1 2 3"
	"homogeneousValue" "vector4" "1 2 3 4"
	"angleValue" "qangle" "0 90 0"
	"rotationValue" "quaternion" "0 0 0 1"
	"blobValue" "binary" "DEADBEEF"
}
"#;

    let root = decode_document(document);

    assert_eq!(*root.get_value::<i32>("intValue").unwrap(), 42);
    assert_eq!(*root.get_value::<f32>("floatValue").unwrap(), 1.5);
    assert!(*root.get_value::<bool>("boolValue").unwrap());
    assert_eq!(root.get_value::<String>("stringValue").unwrap().as_str(), "hello world");
    assert_eq!(*root.get_value::<Duration>("timeValue").unwrap(), Duration::from_secs_f64(2.5));
    assert_eq!(
        *root.get_value::<Color>("colorValue").unwrap(),
        Color {
            red: 255,
            green: 128,
            blue: 0
        }
    );
    assert_eq!(*root.get_value::<Vector2>("planarValue").unwrap(), Vector2 { x: 0.5, y: 1.0 });
    assert_eq!(*root.get_value::<Vector3>("spatialValue").unwrap(), Vector3 { x: 1.0, y: 2.0, z: 3.0 });
    assert_eq!(
        *root.get_value::<Vector4>("homogeneousValue").unwrap(),
        Vector4 {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            w: 4.0
        }
    );
    assert_eq!(
        *root.get_value::<Angle>("angleValue").unwrap(),
        Angle {
            pitch: 0.0,
            yaw: 90.0,
            roll: 0.0
        }
    );
    assert_eq!(
        *root.get_value::<Quaternion>("rotationValue").unwrap(),
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0
        }
    );
    assert_eq!(root.get_value::<dmx_model::BinaryBlock>("blobValue").unwrap().data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn array_attribute_preserves_length_and_order() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"weights" "float_array"
	[
		"0.25",
		"0.5",
		"0.75"
	]
	"indices" "int_array"
	[
		"3",
		"1",
		"2"
	]
}
"#;

    let root = decode_document(document);

    let weights = root.get_value::<Vec<f32>>("weights").unwrap();
    assert_eq!(*weights, vec![0.25, 0.5, 0.75], "Expected three entries in declared order");

    let indices = root.get_value::<Vec<i32>>("indices").unwrap();
    assert_eq!(*indices, vec![3, 1, 2]);
}

#[test]
fn nested_inline_element() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"transform" "DmeTransform"
	{
		"name" "string" "root_transform"
		"position" "vector3" "1 2 3"
	}
}
"#;

    let root = decode_document(document);

    let transform = root.get_element("transform").unwrap();
    assert_eq!(transform.get_class().as_str(), "DmeTransform");
    assert_eq!(transform.get_name().as_str(), "root_transform");
    assert_eq!(*transform.get_value::<Vector3>("position").unwrap(), Vector3 { x: 1.0, y: 2.0, z: 3.0 });
}

#[test]
fn forward_reference_binds_after_declaration() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"children" "element_array"
	[
		"DmElement"
		{
			"id" "elementid" "00000000-0000-0000-0000-0000000000bb"
			"name" "string" "referencer"
			"ref" "element" "11111111-1111-1111-1111-111111111111"
		},
		"DmeJoint"
		{
			"id" "elementid" "11111111-1111-1111-1111-111111111111"
			"name" "string" "referenced"
		}
	]
}
"#;

    let root = decode_document(document);

    let children = root.get_element_array("children");
    assert_eq!(children.len(), 2);

    let referenced = children[0].get_element("ref").expect("forward reference was not bound");
    assert_eq!(referenced, children[1], "Expected the reference to bind to the later declaration");
    assert_eq!(referenced.get_name().as_str(), "referenced");
}

#[test]
fn indexed_array_references_keep_their_positions() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"list" "element_array"
	[
		"element" "22222222-2222-2222-2222-222222222222",
		"element" "33333333-3333-3333-3333-333333333333"
	]
	"first" "DmeDag"
	{
		"id" "elementid" "33333333-3333-3333-3333-333333333333"
		"name" "string" "late"
	}
	"second" "DmeDag"
	{
		"id" "elementid" "22222222-2222-2222-2222-222222222222"
		"name" "string" "early"
	}
}
"#;

    let root = decode_document(document);

    let list = root.get_value::<Vec<Option<Element>>>("list").unwrap();
    assert_eq!(list.len(), 2);

    // declarations resolve in the opposite order of the slots
    assert_eq!(list[0].as_ref().unwrap().get_name().as_str(), "early");
    assert_eq!(list[1].as_ref().unwrap().get_name().as_str(), "late");
}

#[test]
fn undeclared_identifier_is_fatal() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"ref" "element" "99999999-9999-9999-9999-999999999999"
}
"#;

    let result = decode(&mut document.as_bytes());
    assert!(
        matches!(result, Err(Keyvalues2DecodeError::UndeclaredIdentifier(_))),
        "Expected an undeclared identifier error, got {result:?}"
    );
}

#[test]
fn duplicate_identifier_is_fatal() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"a" "DmElement"
	{
		"id" "elementid" "44444444-4444-4444-4444-444444444444"
	}
	"b" "DmElement"
	{
		"id" "elementid" "44444444-4444-4444-4444-444444444444"
	}
}
"#;

    let result = decode(&mut document.as_bytes());
    assert!(
        matches!(result, Err(Keyvalues2DecodeError::DuplicateElementId(_))),
        "Expected a duplicate element id error, got {result:?}"
    );
}

#[test]
fn only_the_first_root_is_retained() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"name" "string" "first root"
}
"DmElement"
{
	"name" "string" "second root"
}
"#;

    let root = decode_document(document);
    assert_eq!(root.get_name().as_str(), "first root");
}

#[test]
fn end_of_input_closes_open_structures() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"intValue" "int" "7"
"#;

    let root = decode_document(document);
    assert_eq!(*root.get_value::<i32>("intValue").unwrap(), 7);
}

#[test]
fn unknown_attribute_types_are_dropped() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"futureValue" "futuretype" "whatever"
	"intValue" "int" "5"
}
"#;

    let root = decode_document(document);
    assert!(root.get_attribute("futureValue").is_none(), "Unknown attribute types should be dropped");
    assert_eq!(*root.get_value::<i32>("intValue").unwrap(), 5);
}

#[test]
fn empty_reference_decodes_to_null() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	"ref" "element" ""
}
"#;

    let root = decode_document(document);
    assert!(root.get_element("ref").is_none());
    assert!(root.get_attribute("ref").is_some(), "A null reference still occupies its attribute");
}

#[test]
fn unmatched_close_is_fatal() {
    let document = r#"<!-- dmx encoding keyvalues2 1 format model 1 -->
"DmElement"
{
	]
}
"#;

    let result = decode(&mut document.as_bytes());
    assert!(
        matches!(result, Err(Keyvalues2DecodeError::UnmatchedClose(_))),
        "Expected an unmatched close error, got {result:?}"
    );
}
