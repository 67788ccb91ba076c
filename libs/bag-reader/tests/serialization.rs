mod common;

use bag_reader::{Deserializer, ReaderError, Serializer};

use common::*;

#[test]
fn round_trip_in_every_builtin_format() {
    for format in ["cdr", "json"] {
        let mut ser = Serializer::new(format).unwrap();
        let mut de = Deserializer::new(format).unwrap();
        assert_eq!(ser.format_id(), format);

        let original = sample_trajectory();
        let message = ser.serialize(&original, "/t", 99).unwrap();
        assert_eq!(message.topic_name, "/t");
        assert_eq!(message.time_stamp, 99);

        let decoded: Trajectory = de.deserialize(&message).unwrap();
        assert_eq!(decoded, original, "format {format}");
    }
}

#[test]
fn non_finite_floats_round_trip_in_every_builtin_format() {
    for format in ["cdr", "json"] {
        let mut ser = Serializer::new(format).unwrap();
        let mut de = Deserializer::new(format).unwrap();
        let original = Point { x: f64::NAN, y: f64::INFINITY, z: f64::NEG_INFINITY };

        let message = ser.serialize(&original, "/p", 1).unwrap();
        let decoded: Point = de.deserialize(&message).unwrap();
        assert!(decoded.x.is_nan(), "format {format}");
        assert_eq!(decoded.y, f64::INFINITY, "format {format}");
        assert_eq!(decoded.z, f64::NEG_INFINITY, "format {format}");
    }
}

#[test]
fn topic_metadata_matches_serialized_records() {
    let ser = Serializer::new("cdr").unwrap();
    let topic = ser.topic_metadata::<Point>("/p");
    assert_eq!(topic.name, "/p");
    assert_eq!(topic.type_name, "geometry/Point");
    assert_eq!(topic.serialization_format, "cdr");
}

#[test]
fn decoding_with_the_wrong_type_fails() {
    let mut ser = Serializer::new("json").unwrap();
    let mut de = Deserializer::new("json").unwrap();
    let message = ser.serialize(&Text { data: "hello".into() }, "/s", 0).unwrap();

    let err = de.deserialize::<Point>(&message).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::Conversion { ref type_name, .. } if type_name == "geometry/Point"
    ));
}

#[test]
fn truncated_cdr_names_the_topic() {
    let mut ser = Serializer::new("cdr").unwrap();
    let mut de = Deserializer::new("cdr").unwrap();
    let mut message = ser.serialize(&Text { data: "hello".into() }, "/s", 0).unwrap();
    message.serialized_data.truncate(8);

    let err = de.deserialize::<Text>(&message).unwrap_err();
    assert!(err.to_string().contains("topic '/s'"));
}

#[test]
fn unknown_format() {
    assert!(matches!(Serializer::new("yaml"), Err(ReaderError::Config(_))));
    assert!(matches!(Deserializer::new("yaml"), Err(ReaderError::Config(_))));
}
