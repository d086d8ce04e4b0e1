use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder, Versioned};
use crate::dump::{object_section, Dump};
use crate::service::Service;
use crate::utime::UTime;

/// Published snapshot of every registered service.
///
/// Snapshots are values: the owning authority clones the previous one,
/// edits the clone, bumps `epoch` and `modified`, then publishes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMap {
    pub epoch: u64,
    pub modified: UTime,
    pub services: BTreeMap<String, Service>,
}

impl ServiceMap {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Whether `self` may follow `prev` from the same authority.
    pub fn is_successor_of(&self, prev: &ServiceMap) -> bool {
        self.epoch >= prev.epoch
    }

    /// Metadata histogram across every service in the map.
    pub fn count_metadata(&self, field: &str) -> BTreeMap<String, u32> {
        let mut out = BTreeMap::new();
        for service in self.services.values() {
            service.count_metadata_into(field, &mut out);
        }
        out
    }
}

impl Versioned for ServiceMap {
    const TYPE_NAME: &'static str = "ServiceMap";
    const VERSION: u8 = 1;
    const COMPAT: u8 = 1;
}

impl Encode for ServiceMap {
    fn encode(&self, enc: &mut Encoder) {
        enc.versioned(Self::VERSION, Self::COMPAT, |enc| {
            enc.encode(&self.epoch);
            enc.encode(&self.modified);
            enc.encode(&self.services);
        });
    }
}

impl Decode for ServiceMap {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.versioned(Self::TYPE_NAME, Self::VERSION, |dec, _struct_v| {
            let epoch = dec.decode()?;
            let modified = dec.decode()?;
            let services = dec.decode()?;
            Ok(ServiceMap {
                epoch,
                modified,
                services,
            })
        })
    }
}

impl Dump for ServiceMap {
    fn dump(&self) -> Value {
        json!({
            "epoch": self.epoch,
            "modified": self.modified.to_string(),
            "services": object_section(&self.services),
        })
    }
}
