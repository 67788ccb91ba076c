mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use bag_api::format::ConverterOptions;
use bag_api::message::BagMessage;
use bag_api::record::SerializedBagMessage;
use bag_api::std_msgs::{Float32, Float64};
use bag_api::storage::{StorageFilter, StorageOptions};
use bag_api::topic::TopicMetadata;
use bag_reader::storage::{MemoryBag, STORAGE_MEMORY, StorageRegistry};
use bag_reader::{ConverterFactory, ReaderError, Serializer, SimpleReader};
use serde_json::json;

use common::*;

fn open_abc() -> (tempfile::TempDir, SimpleReader) {
    let dir = tempfile::tempdir().unwrap();
    write_abc_bag(dir.path());
    let mut reader = SimpleReader::new();
    reader.open_path(uri(dir.path())).unwrap();
    (dir, reader)
}

fn drain(reader: &mut SimpleReader) -> Vec<(String, i64, Vec<u8>)> {
    let mut out = Vec::new();
    while reader.has_next().unwrap() {
        let m = reader.read_next().unwrap();
        out.push((m.topic_name.clone(), m.time_stamp, m.serialized_data.clone()));
    }
    out
}

#[test]
fn abc_scenario() {
    let (_dir, mut reader) = open_abc();

    let topics: BTreeSet<(String, String)> = reader
        .get_all_topics_and_types()
        .unwrap()
        .into_iter()
        .map(|t| (t.name, t.type_name))
        .collect();
    let expected: BTreeSet<(String, String)> = [
        ("/a".to_string(), "std_msgs/Int32".to_string()),
        ("/b".to_string(), "std_msgs/String".to_string()),
    ]
    .into();
    assert_eq!(topics, expected);

    assert_eq!(reader.topic_type("/c"), "");
    assert_eq!(reader.topic_type("/a"), "std_msgs/Int32");

    reader.read_next().unwrap();
    assert_eq!(reader.current_topic(), Some("/a"));
    assert_eq!(reader.deserialize::<Int32>().unwrap(), Int32 { data: 1 });

    reader.read_next().unwrap();
    assert_eq!(reader.current_topic(), Some("/b"));
    assert_eq!(reader.deserialize::<Text>().unwrap().data, "two");
    assert_eq!(reader.topic_type("/c"), "");

    reader.read_next().unwrap();
    assert_eq!(reader.deserialize::<Int32>().unwrap(), Int32 { data: 3 });
    assert!(!reader.has_next().unwrap());
}

#[test]
fn n_records_then_exhausted_without_losing_current() {
    let (_dir, mut reader) = open_abc();

    let mut reads = 0;
    while reader.has_next().unwrap() {
        reader.read_next().unwrap();
        reads += 1;
    }
    assert_eq!(reads, 3);

    let err = reader.read_next().unwrap_err();
    assert!(matches!(err, ReaderError::Exhausted));
    assert_eq!(reader.current_message().unwrap().time_stamp, 300);
    assert_eq!(reader.deserialize::<Int32>().unwrap().data, 3);
}

#[test]
fn empty_bag() {
    let dir = tempfile::tempdir().unwrap();
    write_bag(
        dir.path(),
        &metadata(vec![TopicMetadata::new("/a", "std_msgs/Int32", "cdr")]),
        &[],
    );

    let mut reader = SimpleReader::new();
    reader.open_path(uri(dir.path())).unwrap();
    assert!(!reader.has_next().unwrap());
    assert!(matches!(reader.read_next(), Err(ReaderError::Exhausted)));
    assert!(matches!(
        reader.deserialize_message(),
        Err(ReaderError::NoCurrentMessage)
    ));
}

#[test]
fn reset_then_open_replays_the_same_records() {
    let (dir, mut reader) = open_abc();
    let first = drain(&mut reader);

    reader.reset();
    assert!(!reader.is_open());
    assert!(reader.current_message().is_none());
    assert!(matches!(reader.has_next(), Err(ReaderError::NotOpen)));

    reader.open_path(uri(dir.path())).unwrap();
    let second = drain(&mut reader);

    let mut fresh = SimpleReader::new();
    fresh.open_path(uri(dir.path())).unwrap();
    let third = drain(&mut fresh);

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn out_of_protocol_calls_fail_fast() {
    let mut reader = SimpleReader::new();
    assert!(matches!(reader.has_next(), Err(ReaderError::NotOpen)));
    assert!(matches!(reader.read_next(), Err(ReaderError::NotOpen)));
    assert!(matches!(reader.get_all_topics_and_types(), Err(ReaderError::NotOpen)));
    assert!(matches!(reader.deserialize::<Int32>(), Err(ReaderError::NotOpen)));
    assert_eq!(reader.topic_type("/a"), "");
    reader.reset();

    let (_dir, mut reader) = open_abc();
    assert!(matches!(
        reader.deserialize::<Int32>(),
        Err(ReaderError::NoCurrentMessage)
    ));
}

#[test]
fn typed_access_checks_the_wire_type() {
    let (_dir, mut reader) = open_abc();
    reader.read_next().unwrap();

    match reader.deserialize::<Text>() {
        Err(ReaderError::TypeMismatch { topic, expected, actual }) => {
            assert_eq!(topic, "/a");
            assert_eq!(expected, "std_msgs/String");
            assert_eq!(actual, "std_msgs/Int32");
        }
        other => panic!("expected type mismatch, got {other:?}"),
    }

    // Same record, still readable with the right type.
    assert_eq!(reader.deserialize::<Int32>().unwrap().data, 1);
}

#[test]
fn unchecked_access_is_structural() {
    #[derive(Debug, serde::Deserialize)]
    struct AnyData {
        data: serde_json::Value,
    }
    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct Wrong {
        x: f64,
    }

    let (_dir, mut reader) = open_abc();
    reader.read_next().unwrap();
    let any: AnyData = reader.deserialize_unchecked().unwrap();
    assert_eq!(any.data, json!(1));

    let err = reader.deserialize_unchecked::<Wrong>().unwrap_err();
    assert!(matches!(err, ReaderError::Conversion { .. }));
}

#[test]
fn introspection_uses_recorded_layouts() {
    let (_dir, mut reader) = open_abc();
    reader.read_next().unwrap();
    reader.read_next().unwrap();

    let msg = reader.deserialize_message().unwrap();
    assert_eq!(msg.topic_name, "/b");
    assert_eq!(msg.type_name, "std_msgs/String");
    assert_eq!(msg.time_stamp, 200);
    assert_eq!(msg.data, json!({ "data": "two" }));
}

#[test]
fn nested_round_trip_through_a_bag() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = Serializer::new("cdr").unwrap();
    let original = sample_trajectory();
    let record = ser.serialize(&original, "/trajectory", 7).unwrap();
    // Layouts deliberately not recorded: the reader learns them from the type.
    write_bag(
        dir.path(),
        &metadata(vec![ser.topic_metadata::<Trajectory>("/trajectory")]),
        &[record],
    );

    let mut reader = SimpleReader::new();
    reader.open_path(uri(dir.path())).unwrap();
    reader.read_next().unwrap();

    let err = reader.deserialize_message().unwrap_err();
    assert!(err.to_string().contains("unknown type 'nav/Trajectory'"));

    assert_eq!(reader.deserialize::<Trajectory>().unwrap(), original);
    assert_eq!(reader.deserialize_message().unwrap().data["poses"][1]["x"], json!(-3.25));
}

#[test]
fn registered_types_survive_reset() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = Serializer::new("cdr").unwrap();
    let record = ser.serialize(&sample_trajectory(), "/t", 1).unwrap();
    write_bag(
        dir.path(),
        &metadata(vec![ser.topic_metadata::<Trajectory>("/t")]),
        &[record],
    );

    let mut reader = SimpleReader::new();
    reader.register::<Trajectory>();
    assert!(reader.types().contains("geometry/Point"));

    reader.open_path(uri(dir.path())).unwrap();
    reader.reset();
    reader.open_path(uri(dir.path())).unwrap();
    reader.read_next().unwrap();
    let msg = reader.deserialize_message().unwrap();
    assert_eq!(msg.data["frame_id"], json!("map"));
}

#[test]
fn filter_limits_topics() {
    let (_dir, mut reader) = open_abc();
    reader.set_filter(StorageFilter::topics(["/a"])).unwrap();

    let stamps: Vec<i64> = drain(&mut reader).into_iter().map(|r| r.1).collect();
    assert_eq!(stamps, [100, 300]);
}

#[test]
fn output_format_converts_records() {
    let (dir, _) = open_abc();
    let mut reader = SimpleReader::new();
    reader
        .open(
            &StorageOptions::new(uri(dir.path()), "jsonl"),
            &ConverterOptions::new("cdr", "json"),
        )
        .unwrap();

    assert!(reader
        .get_all_topics_and_types()
        .unwrap()
        .iter()
        .all(|t| t.serialization_format == "json"));

    let record = reader.read_next().unwrap();
    assert_eq!(record.serialized_data, br#"{"data":1}"#);
    assert_eq!(reader.deserialize::<Int32>().unwrap().data, 1);
}

#[test]
fn format_mismatch_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_abc_bag(dir.path());
    let mut reader = SimpleReader::new();
    reader
        .open(
            &StorageOptions::new(uri(dir.path()), ""),
            &ConverterOptions::new("json", ""),
        )
        .unwrap();
    reader.read_next().unwrap();

    let err = reader.deserialize::<Int32>().unwrap_err();
    assert!(matches!(&err, ReaderError::Config(msg) if msg.contains("serialized as 'cdr'")));
}

#[test]
fn open_failures_leave_the_reader_closed() {
    let mut reader = SimpleReader::new();

    let err = reader.open_path("/nonexistent/bag").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/bag"));
    assert!(!reader.is_open());

    let (dir, _) = open_abc();
    let err = reader
        .open(
            &StorageOptions::new(uri(dir.path()), ""),
            &ConverterOptions::new("protobuf", ""),
        )
        .unwrap_err();
    assert!(matches!(err, ReaderError::Config(_)));
    assert!(!reader.is_open());

    let err = reader
        .open(&StorageOptions::new(uri(dir.path()), ""), &ConverterOptions::default())
        .unwrap_err();
    assert!(matches!(err, ReaderError::Config(_)));
}

#[test]
fn memory_backend() {
    let mut ser = Serializer::new("json").unwrap();
    let bag = MemoryBag::new()
        .with_topic(ser.topic_metadata::<Int32>("/n"))
        .with_topic(ser.topic_metadata::<Point>("/p"))
        .with_definition::<Point>()
        .with_messages([
            ser.serialize(&Int32 { data: 10 }, "/n", 1).unwrap(),
            ser.serialize(&Point { x: 1.0, y: 0.0, z: 0.0 }, "/p", 2).unwrap(),
            SerializedBagMessage::new("/n", br#"{"data":11}"#.to_vec(), 3),
        ]);
    assert_eq!(bag.len(), 3);

    let mut reader = SimpleReader::with_converters(
        Arc::new(StorageRegistry::with_memory(bag)),
        Arc::new(ConverterFactory::with_builtins()),
    );
    reader
        .open(
            &StorageOptions::new("", STORAGE_MEMORY),
            &ConverterOptions::new("json", ""),
        )
        .unwrap();

    let info = reader.bag_info().unwrap();
    assert_eq!(info.message_count, Some(3));
    assert!(reader.types().contains(Point::TYPE_NAME));

    let mut values = Vec::new();
    while reader.has_next().unwrap() {
        reader.read_next().unwrap();
        if reader.current_topic() == Some("/n") {
            values.push(reader.deserialize::<Int32>().unwrap().data);
        }
    }
    assert_eq!(values, [10, 11]);
}

fn cdr_record(topic: &str, body: &[u8], time_stamp: i64) -> SerializedBagMessage {
    let mut data = vec![0x00, 0x01, 0x00, 0x00];
    data.extend_from_slice(body);
    SerializedBagMessage::new(topic, data, time_stamp)
}

#[test]
fn non_finite_floats_are_typed() {
    let dir = tempfile::tempdir().unwrap();
    let doubles = [1.5, f64::INFINITY, f64::NEG_INFINITY, f64::NAN];
    let singles = [f32::INFINITY, f32::NEG_INFINITY, f32::NAN];
    let mut records = Vec::new();
    for (i, v) in doubles.iter().enumerate() {
        records.push(cdr_record("/d", &v.to_le_bytes(), i as i64));
    }
    for (i, v) in singles.iter().enumerate() {
        records.push(cdr_record("/f", &v.to_le_bytes(), 10 + i as i64));
    }
    write_bag(
        dir.path(),
        &metadata(vec![
            TopicMetadata::new("/d", Float64::TYPE_NAME, "cdr"),
            TopicMetadata::new("/f", Float32::TYPE_NAME, "cdr"),
        ]),
        &records,
    );

    let mut reader = SimpleReader::new();
    reader.open_path(uri(dir.path())).unwrap();
    let mut read_doubles = Vec::new();
    let mut read_singles = Vec::new();
    while reader.has_next().unwrap() {
        reader.read_next().unwrap();
        match reader.current_topic() {
            Some("/d") => read_doubles.push(reader.deserialize::<Float64>().unwrap().data),
            _ => read_singles.push(reader.deserialize::<Float32>().unwrap().data),
        }
    }

    assert_eq!(&read_doubles[..3], &doubles[..3]);
    assert!(read_doubles[3].is_nan());
    assert_eq!(&read_singles[..2], &singles[..2]);
    assert!(read_singles[2].is_nan());
    assert_eq!(reader.deserialize_message().unwrap().data, json!({ "data": "NaN" }));
}

#[test]
fn non_finite_floats_round_trip_through_a_bag() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = Serializer::new("cdr").unwrap();
    let original = Trajectory {
        poses: vec![Point { x: f64::INFINITY, y: f64::NEG_INFINITY, z: 0.0 }],
        covariance: [f32::INFINITY, 0.0, 0.0, f32::NEG_INFINITY],
        ..sample_trajectory()
    };
    let record = ser.serialize(&original, "/t", 1).unwrap();
    write_bag(
        dir.path(),
        &metadata(vec![ser.topic_metadata::<Trajectory>("/t")]),
        &[record],
    );

    let mut reader = SimpleReader::new();
    reader.open_path(uri(dir.path())).unwrap();
    reader.read_next().unwrap();
    assert_eq!(reader.deserialize::<Trajectory>().unwrap(), original);
}

fn abc_memory_reader() -> SimpleReader {
    let mut ser = Serializer::new("cdr").unwrap();
    let bag = MemoryBag::new()
        .with_topic(ser.topic_metadata::<Int32>("/a"))
        .with_topic(ser.topic_metadata::<Text>("/b"))
        .with_messages([
            ser.serialize(&Int32 { data: 1 }, "/a", 100).unwrap(),
            ser.serialize(&Text { data: "two".into() }, "/b", 200).unwrap(),
            ser.serialize(&Int32 { data: 3 }, "/a", 300).unwrap(),
        ]);
    let mut reader = SimpleReader::with_converters(
        Arc::new(StorageRegistry::with_memory(bag)),
        Arc::new(ConverterFactory::with_builtins()),
    );
    reader
        .open(
            &StorageOptions::new("", STORAGE_MEMORY),
            &ConverterOptions::new("cdr", ""),
        )
        .unwrap();
    reader
}

#[test]
fn lookahead_never_loses_records_across_filter_changes() {
    let (_dir, jsonl) = open_abc();
    for (backend, mut reader) in [("jsonl", jsonl), ("memory", abc_memory_reader())] {
        assert!(reader.has_next().unwrap());
        reader.set_filter(StorageFilter::topics(["/b"])).unwrap();
        reader.reset_filter().unwrap();
        assert_eq!(reader.read_next().unwrap().time_stamp, 100, "{backend}");

        // Looking ahead under a filter skips /b without consuming it.
        reader.set_filter(StorageFilter::topics(["/a"])).unwrap();
        assert!(reader.has_next().unwrap());
        reader.reset_filter().unwrap();
        assert_eq!(reader.read_next().unwrap().time_stamp, 200, "{backend}");
        assert_eq!(reader.read_next().unwrap().time_stamp, 300, "{backend}");
        assert!(!reader.has_next().unwrap());
    }
}

#[test]
fn conversion_uses_registered_layouts() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = Serializer::new("cdr").unwrap();
    let original = sample_trajectory();
    let record = ser.serialize(&original, "/t", 1).unwrap();
    write_bag(
        dir.path(),
        &metadata(vec![ser.topic_metadata::<Trajectory>("/t")]),
        &[record],
    );

    let mut reader = SimpleReader::new();
    reader.register::<Trajectory>();
    reader
        .open(
            &StorageOptions::new(uri(dir.path()), ""),
            &ConverterOptions::new("cdr", "json"),
        )
        .unwrap();

    let record = reader.read_next().unwrap();
    let as_json: serde_json::Value = serde_json::from_slice(&record.serialized_data).unwrap();
    assert_eq!(as_json["frame_id"], json!("map"));
    assert_eq!(reader.deserialize::<Trajectory>().unwrap(), original);
}

#[test]
fn topic_metadata_reflects_the_read_format() {
    let (dir, reader) = open_abc();
    let a = reader.topic_metadata("/a").unwrap();
    assert_eq!(a.type_name, "std_msgs/Int32");
    assert_eq!(a.serialization_format, "cdr");
    assert!(reader.topic_metadata("/c").is_none());

    let mut converted = SimpleReader::new();
    assert!(converted.topic_metadata("/a").is_none());
    converted
        .open(
            &StorageOptions::new(uri(dir.path()), ""),
            &ConverterOptions::new("cdr", "json"),
        )
        .unwrap();
    assert_eq!(converted.topic_metadata("/b").unwrap().serialization_format, "json");
}

#[test]
fn topic_index_follows_the_open_bag() {
    let (_abc, mut reader) = open_abc();
    assert_eq!(reader.topic_type("/a"), "std_msgs/Int32");

    let other = tempfile::tempdir().unwrap();
    write_bag(
        other.path(),
        &metadata(vec![TopicMetadata::new("/x", Float64::TYPE_NAME, "cdr")]),
        &[],
    );

    reader.reset();
    assert_eq!(reader.topic_type("/a"), "");
    reader.open_path(uri(other.path())).unwrap();
    assert_eq!(reader.topic_type("/x"), "std_msgs/Float64");
    assert_eq!(reader.topic_type("/a"), "");

    // Reopening without an explicit reset rebuilds the index too.
    let (abc, _) = open_abc();
    reader.open_path(uri(abc.path())).unwrap();
    assert_eq!(reader.topic_type("/a"), "std_msgs/Int32");
    assert_eq!(reader.topic_type("/x"), "");
}

#[test]
fn missing_nested_layouts_are_all_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = Serializer::new("cdr").unwrap();
    let record = ser.serialize(&sample_trajectory(), "/t", 1).unwrap();
    let mut bag = metadata(vec![ser.topic_metadata::<Trajectory>("/t")]);
    bag.types.insert(Trajectory::TYPE_NAME.to_string(), Trajectory::schema());
    write_bag(dir.path(), &bag, &[record]);

    let mut reader = SimpleReader::new();
    reader.open_path(uri(dir.path())).unwrap();
    reader.read_next().unwrap();

    let err = reader.deserialize_message().unwrap_err().to_string();
    assert!(err.contains("topic '/t'"), "{err}");
    assert!(err.contains("unknown type 'geometry/Point'"), "{err}");
}
