// Service map registry: versioned codec, entity model and status reports

pub mod addr;
pub mod codec;
pub mod config;
pub mod daemon;
pub mod dump;
pub mod samples;
pub mod service;
pub mod service_map;
pub mod utime;

// Re-export commonly used types
pub use addr::{AddrType, EntityAddr};
pub use codec::{decode_from_slice, encode_to_vec, DecodeError, DecodeResult, Features, Versioned};
pub use config::ToolConfig;
pub use daemon::Daemon;
pub use dump::Dump;
pub use samples::{check_round_trip, Entity, SampleInstances};
pub use service::Service;
pub use service_map::ServiceMap;
pub use utime::UTime;
