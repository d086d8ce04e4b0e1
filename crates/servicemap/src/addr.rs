use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::codec::{Decode, DecodeError, DecodeResult, Decoder, Encode, Encoder, Features};

const TYPE_NAME: &str = "EntityAddr";
const ADDR_VERSION: u8 = 1;
const ADDR_COMPAT: u8 = 1;

const MARKER_LEGACY: u8 = 0;
const MARKER_MODERN: u8 = 1;

// family (u16) + port (u16) + flowinfo (u32) + scope_id (u32) + 16 address bytes
const SOCK_BLOCK_LEN: usize = 28;
const AF_UNSPEC: u16 = 0;
const AF_INET: u16 = 2;
const AF_INET6: u16 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AddrType {
    #[default]
    None,
    Legacy,
    Msgr2,
    Any,
}

impl AddrType {
    fn to_wire(self) -> u32 {
        match self {
            AddrType::None => 0,
            AddrType::Legacy => 1,
            AddrType::Msgr2 => 2,
            AddrType::Any => 3,
        }
    }

    fn from_wire(raw: u32) -> DecodeResult<Self> {
        match raw {
            0 => Ok(AddrType::None),
            1 => Ok(AddrType::Legacy),
            2 => Ok(AddrType::Msgr2),
            3 => Ok(AddrType::Any),
            other => Err(DecodeError::malformed(format!("unknown address type {other}"))),
        }
    }
}

/// Network address a daemon registered with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntityAddr {
    pub addr_type: AddrType,
    pub nonce: u32,
    pub sockaddr: Option<SocketAddr>,
}

impl EntityAddr {
    pub fn new(addr_type: AddrType, sockaddr: SocketAddr, nonce: u32) -> Self {
        Self {
            addr_type,
            nonce,
            sockaddr: Some(sockaddr),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.sockaddr.is_none()
    }

    /// `ip:port/nonce`, or `-` for an unset address.
    pub fn legacy_str(&self) -> String {
        match self.sockaddr {
            Some(sa) => format!("{}/{}", sa, self.nonce),
            None => "-".to_string(),
        }
    }

    fn encode_sock_block(&self, enc: &mut Encoder) {
        let (family, port, flowinfo, scope_id, ip) = match self.sockaddr {
            None => (AF_UNSPEC, 0, 0, 0, [0u8; 16]),
            Some(SocketAddr::V4(v4)) => {
                let mut ip = [0u8; 16];
                ip[..4].copy_from_slice(&v4.ip().octets());
                (AF_INET, v4.port(), 0, 0, ip)
            }
            Some(SocketAddr::V6(v6)) => (
                AF_INET6,
                v6.port(),
                v6.flowinfo(),
                v6.scope_id(),
                v6.ip().octets(),
            ),
        };
        enc.put_u16(family);
        enc.put_u16(port);
        enc.put_u32(flowinfo);
        enc.put_u32(scope_id);
        enc.put_bytes(&ip);
    }

    fn decode_sock_block(dec: &mut Decoder<'_>) -> DecodeResult<Option<SocketAddr>> {
        let family = dec.get_u16()?;
        let port = dec.get_u16()?;
        let flowinfo = dec.get_u32()?;
        let scope_id = dec.get_u32()?;
        let raw = dec.take(16)?;
        match family {
            AF_UNSPEC => Ok(None),
            AF_INET => {
                let ip = Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]);
                Ok(Some(SocketAddr::V4(SocketAddrV4::new(ip, port))))
            }
            AF_INET6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(raw);
                let ip = Ipv6Addr::from(octets);
                Ok(Some(SocketAddr::V6(SocketAddrV6::new(ip, port, flowinfo, scope_id))))
            }
            other => Err(DecodeError::malformed(format!(
                "unknown socket address family {other}"
            ))),
        }
    }
}

impl fmt::Display for EntityAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.addr_type {
            AddrType::None => "",
            AddrType::Legacy => "v1:",
            AddrType::Msgr2 => "v2:",
            AddrType::Any => "any:",
        };
        write!(f, "{}{}", prefix, self.legacy_str())
    }
}

impl Encode for EntityAddr {
    fn encode(&self, enc: &mut Encoder) {
        if !enc.features().has(Features::MSG_ADDR2) {
            enc.put_u8(MARKER_LEGACY);
            enc.put_u32(self.addr_type.to_wire());
            enc.put_u32(self.nonce);
            self.encode_sock_block(enc);
            return;
        }

        enc.put_u8(MARKER_MODERN);
        enc.versioned(ADDR_VERSION, ADDR_COMPAT, |enc| {
            enc.put_u32(self.addr_type.to_wire());
            enc.put_u32(self.nonce);
            if self.sockaddr.is_some() {
                enc.put_len(SOCK_BLOCK_LEN);
                self.encode_sock_block(enc);
            } else {
                enc.put_len(0);
            }
        });
    }
}

impl Decode for EntityAddr {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        match dec.get_u8()? {
            MARKER_LEGACY => {
                let addr_type = AddrType::from_wire(dec.get_u32()?)?;
                let nonce = dec.get_u32()?;
                let sockaddr = Self::decode_sock_block(dec)?;
                Ok(Self {
                    addr_type,
                    nonce,
                    sockaddr,
                })
            }
            MARKER_MODERN => dec.versioned(TYPE_NAME, ADDR_VERSION, |dec, _struct_v| {
                let addr_type = AddrType::from_wire(dec.get_u32()?)?;
                let nonce = dec.get_u32()?;
                let sockaddr = match dec.get_len()? {
                    0 => None,
                    SOCK_BLOCK_LEN => Self::decode_sock_block(dec)?,
                    other => {
                        return Err(DecodeError::malformed(format!(
                            "socket address block of {other} bytes, expected 0 or {SOCK_BLOCK_LEN}"
                        )))
                    }
                };
                Ok(Self {
                    addr_type,
                    nonce,
                    sockaddr,
                })
            }),
            other => Err(DecodeError::malformed(format!(
                "unknown address marker {other}"
            ))),
        }
    }
}
