//! Representative instances of every encodable entity, plus the
//! decode/re-encode check run against stored payloads.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::codec::{decode_from_slice, encode_to_vec, DecodeError, Features, Versioned};
use crate::daemon::Daemon;
use crate::service::Service;
use crate::service_map::ServiceMap;

pub trait SampleInstances: Sized {
    /// Always starts with the default-constructed value.
    fn sample_instances() -> Vec<Self>;
}

impl SampleInstances for Daemon {
    fn sample_instances() -> Vec<Self> {
        let mut populated = Daemon::with_gid(222);
        populated
            .metadata
            .insert("this".to_string(), "that".to_string());
        populated
            .task_status
            .insert("task1".to_string(), "running".to_string());
        vec![Daemon::default(), populated]
    }
}

impl SampleInstances for Service {
    fn sample_instances() -> Vec<Self> {
        let mut populated = Service::default();
        populated
            .daemons
            .insert("one".to_string(), Daemon::with_gid(1));
        populated
            .daemons
            .insert("two".to_string(), Daemon::with_gid(2));
        vec![Service::default(), populated]
    }
}

impl SampleInstances for ServiceMap {
    fn sample_instances() -> Vec<Self> {
        let mut populated = ServiceMap {
            epoch: 123,
            ..Default::default()
        };
        let rgw = populated.services.entry("rgw".to_string()).or_default();
        rgw.daemons.insert("one".to_string(), Daemon::with_gid(123));
        rgw.daemons.insert("two".to_string(), Daemon::with_gid(344));
        populated
            .services
            .entry("iscsi".to_string())
            .or_default()
            .daemons
            .insert("foo".to_string(), Daemon::with_gid(3222));
        vec![ServiceMap::default(), populated]
    }
}

#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{type_name} changed across decode/encode/decode")]
    ValueMismatch { type_name: &'static str },
}

/// Decodes `bytes`, re-encodes with `features`, decodes again and requires
/// both decoded values to match. Works for payloads of any older schema
/// version the reader still accepts.
pub fn check_round_trip<T>(bytes: &[u8], features: Features) -> Result<T, ConformanceError>
where
    T: Versioned + PartialEq,
{
    let first: T = decode_from_slice(bytes)?;
    let second: T = decode_from_slice(&encode_to_vec(&first, features))?;
    if first != second {
        return Err(ConformanceError::ValueMismatch {
            type_name: T::TYPE_NAME,
        });
    }
    Ok(first)
}

/// Every entity the codec knows how to frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Daemon,
    Service,
    ServiceMap,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Daemon, Entity::Service, Entity::ServiceMap];

    pub fn name(self) -> &'static str {
        match self {
            Entity::Daemon => Daemon::TYPE_NAME,
            Entity::Service => Service::TYPE_NAME,
            Entity::ServiceMap => ServiceMap::TYPE_NAME,
        }
    }

    /// Encoded sample instances, in `sample_instances` order.
    pub fn encoded_samples(self, features: Features) -> Vec<Vec<u8>> {
        fn encode_all<T: SampleInstances + Versioned>(features: Features) -> Vec<Vec<u8>> {
            T::sample_instances()
                .iter()
                .map(|value| encode_to_vec(value, features))
                .collect()
        }
        match self {
            Entity::Daemon => encode_all::<Daemon>(features),
            Entity::Service => encode_all::<Service>(features),
            Entity::ServiceMap => encode_all::<ServiceMap>(features),
        }
    }

    pub fn check(self, bytes: &[u8], features: Features) -> Result<(), ConformanceError> {
        match self {
            Entity::Daemon => check_round_trip::<Daemon>(bytes, features).map(drop),
            Entity::Service => check_round_trip::<Service>(bytes, features).map(drop),
            Entity::ServiceMap => check_round_trip::<ServiceMap>(bytes, features).map(drop),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::ALL
            .into_iter()
            .find(|entity| entity.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown entity '{s}'"))
    }
}
