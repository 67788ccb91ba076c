#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use bag_api::BagMessage;
use bag_api::message::BagMessage as _;
use bag_api::record::SerializedBagMessage;
use bag_api::topic::TopicMetadata;
use bag_reader::Serializer;
use bag_reader::storage::{BAG_VERSION, BagMetadata, DiskRecord, MESSAGES_FILE, METADATA_FILE};

pub use bag_api::std_msgs::{Int32, String as Text};

#[derive(Debug, Clone, PartialEq, BagMessage, Serialize, Deserialize)]
#[bag(type_name = "geometry/Point")]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, BagMessage, Serialize, Deserialize)]
#[bag(type_name = "nav/Trajectory")]
pub struct Trajectory {
    pub frame_id: String,
    pub seq: u32,
    pub closed: bool,
    pub poses: Vec<Point>,
    pub covariance: [f32; 4],
    pub flags: Vec<u8>,
}

pub fn sample_trajectory() -> Trajectory {
    Trajectory {
        frame_id: "map".into(),
        seq: 42,
        closed: false,
        poses: vec![
            Point { x: 1.0, y: 2.0, z: 0.5 },
            Point { x: -3.25, y: 0.0, z: 1e-3 },
        ],
        covariance: [0.5, 0.0, 0.0, 0.25],
        flags: vec![1, 0, 7],
    }
}

/// Bag with topics `/a: std_msgs/Int32` and `/b: std_msgs/String`,
/// records `[a(1), b("two"), a(3)]`, CDR-encoded.
pub fn write_abc_bag(dir: &Path) {
    let mut ser = Serializer::new("cdr").unwrap();
    let topics = vec![
        ser.topic_metadata::<Int32>("/a"),
        ser.topic_metadata::<Text>("/b"),
    ];
    let records = vec![
        ser.serialize(&Int32 { data: 1 }, "/a", 100).unwrap(),
        ser.serialize(&Text { data: "two".into() }, "/b", 200).unwrap(),
        ser.serialize(&Int32 { data: 3 }, "/a", 300).unwrap(),
    ];
    let mut metadata = metadata(topics);
    Int32::collect_schemas(&mut metadata.types);
    Text::collect_schemas(&mut metadata.types);
    write_bag(dir, &metadata, &records);
}

pub fn metadata(topics: Vec<TopicMetadata>) -> BagMetadata {
    BagMetadata {
        version: BAG_VERSION,
        storage_id: "jsonl".into(),
        topics,
        types: Default::default(),
    }
}

pub fn write_bag(dir: &Path, metadata: &BagMetadata, records: &[SerializedBagMessage]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(METADATA_FILE),
        serde_json::to_string_pretty(metadata).unwrap(),
    )
    .unwrap();
    let mut f = std::fs::File::create(dir.join(MESSAGES_FILE)).unwrap();
    for r in records {
        let line = DiskRecord {
            topic: r.topic_name.clone(),
            time_stamp: r.time_stamp,
            data: r.serialized_data.clone(),
        };
        writeln!(f, "{}", serde_json::to_string(&line).unwrap()).unwrap();
    }
}

pub fn uri(dir: &Path) -> String {
    dir.to_string_lossy().into_owned()
}
