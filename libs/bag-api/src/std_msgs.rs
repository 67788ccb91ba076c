//! Single-field `std_msgs` wrappers, bound to their wire names.

use serde::{Deserialize, Serialize};

use crate::BagMessage;

macro_rules! std_msg {
    ($name:ident, $wire:tt, $ty:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, BagMessage)]
        #[bag(type_name = $wire)]
        pub struct $name {
            pub data: $ty,
        }
    };
}

std_msg!(Bool, "std_msgs/Bool", bool);
std_msg!(Float32, "std_msgs/Float32", f32);
std_msg!(Float64, "std_msgs/Float64", f64);
std_msg!(Int8, "std_msgs/Int8", i8);
std_msg!(UInt8, "std_msgs/UInt8", u8);
std_msg!(Int16, "std_msgs/Int16", i16);
std_msg!(UInt16, "std_msgs/UInt16", u16);
std_msg!(Int32, "std_msgs/Int32", i32);
std_msg!(UInt32, "std_msgs/UInt32", u32);
std_msg!(Int64, "std_msgs/Int64", i64);
std_msg!(UInt64, "std_msgs/UInt64", u64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, BagMessage)]
#[bag(type_name = "std_msgs/String")]
pub struct String {
    pub data: std::string::String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, BagMessage)]
#[bag(type_name = "std_msgs/Byte")]
pub struct Byte {
    #[bag(wire = "byte")]
    pub data: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, BagMessage)]
#[bag(type_name = "std_msgs/Char")]
pub struct Char {
    #[bag(wire = "char")]
    pub data: u8,
}
