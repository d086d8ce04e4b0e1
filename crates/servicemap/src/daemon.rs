use std::collections::BTreeMap;

use serde_json::json;

use crate::addr::EntityAddr;
use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder, Versioned};
use crate::dump::{string_section, Dump};
use crate::utime::UTime;

pub const DAEMON_TYPE_KEY: &str = "daemon_type";
pub const DAEMON_PREFIX_KEY: &str = "daemon_prefix";
pub const DEFAULT_DAEMON_TYPE: &str = "daemon";

/// One registered service instance and its self-reported state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Daemon {
    /// Unique within the owning service only.
    pub gid: u64,
    pub addr: EntityAddr,
    pub start_epoch: u64,
    pub start_stamp: UTime,
    pub metadata: BTreeMap<String, String>,
    /// Empty when the payload predates schema v2.
    pub task_status: BTreeMap<String, String>,
}

impl Daemon {
    pub fn with_gid(gid: u64) -> Self {
        Self {
            gid,
            ..Default::default()
        }
    }

    /// The `daemon_type` metadata value, `"daemon"` when absent.
    pub fn daemon_type(&self) -> &str {
        self.metadata
            .get(DAEMON_TYPE_KEY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_DAEMON_TYPE)
    }

    /// The `daemon_prefix` metadata value, falling back to the daemon's
    /// name in its service.
    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.metadata
            .get(DAEMON_PREFIX_KEY)
            .map(String::as_str)
            .unwrap_or(name)
    }
}

impl Versioned for Daemon {
    const TYPE_NAME: &'static str = "Daemon";
    // v1: gid, addr, start_epoch, start_stamp, metadata
    // v2: + task_status
    const VERSION: u8 = 2;
    // Old readers may drop task_status.
    const COMPAT: u8 = 1;
}

impl Encode for Daemon {
    fn encode(&self, enc: &mut Encoder) {
        enc.versioned(Self::VERSION, Self::COMPAT, |enc| {
            enc.encode(&self.gid);
            enc.encode(&self.addr);
            enc.encode(&self.start_epoch);
            enc.encode(&self.start_stamp);
            enc.encode(&self.metadata);
            enc.encode(&self.task_status);
        });
    }
}

impl Decode for Daemon {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.versioned(Self::TYPE_NAME, Self::VERSION, |dec, struct_v| {
            let gid = dec.decode()?;
            let addr = dec.decode()?;
            let start_epoch = dec.decode()?;
            let start_stamp = dec.decode()?;
            let metadata = dec.decode()?;
            let task_status = if struct_v >= 2 {
                dec.decode()?
            } else {
                BTreeMap::new()
            };
            Ok(Daemon {
                gid,
                addr,
                start_epoch,
                start_stamp,
                metadata,
                task_status,
            })
        })
    }
}

impl Dump for Daemon {
    fn dump(&self) -> serde_json::Value {
        json!({
            "start_epoch": self.start_epoch,
            "start_stamp": self.start_stamp.to_string(),
            "gid": self.gid,
            "addr": self.addr.legacy_str(),
            "metadata": string_section(&self.metadata),
            "task_status": string_section(&self.task_status),
        })
    }
}
