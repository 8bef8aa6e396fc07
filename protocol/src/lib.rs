use std::{fmt, str::FromStr};

use anyhow::bail;
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

pub mod auth;
pub mod clock;
pub mod encoding;
pub mod envelope;
pub mod keys;
pub mod txlog;

pub const VERSION: u32 = 1;

/// Length of an identifier in bytes (SHA-1 output).
pub const IDENTIFIER_LEN: usize = 20;

const TXLOG_SUFFIX: &[u8] = b"-transaction-log";

/// 160-bit opaque value addressing users and resources in the ring.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Default,
    derive_more::From,
    derive_more::Into,
)]
pub struct Identifier(pub [u8; IDENTIFIER_LEN]);

impl Identifier {
    pub fn hash(bytes: &[u8]) -> Self {
        Self(Sha1::digest(bytes).into())
    }

    /// Key of the resource stored under the given relative path.
    pub fn resource_id(path: &str) -> Self {
        Self::hash(path.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64_URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

impl FromStr for Identifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(s)?;
        let Ok(bytes) = <[u8; IDENTIFIER_LEN]>::try_from(bytes) else {
            bail!("invalid identifier length");
        };
        Ok(Self(bytes))
    }
}

/// Canonical byte form of an RSA public key (SPKI DER).
///
/// All identity derivations hash this encoding, so it must stay stable for a
/// given key across processes and versions.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::From)]
pub struct EncodedPublicKey(Vec<u8>);

impl EncodedPublicKey {
    pub fn from_key(key: &RsaPublicKey) -> anyhow::Result<Self> {
        Ok(Self(key.to_public_key_der()?.as_bytes().to_vec()))
    }

    pub fn to_key(&self) -> anyhow::Result<RsaPublicKey> {
        Ok(RsaPublicKey::from_public_key_der(&self.0)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn user_id(&self) -> Identifier {
        Identifier::hash(&self.0)
    }

    /// Key of this user's transaction log in the DHT.
    pub fn txlog_id(&self) -> Identifier {
        let mut hasher = Sha1::new();
        hasher.update(&self.0);
        hasher.update(TXLOG_SUFFIX);
        Identifier(hasher.finalize().into())
    }
}

impl fmt::Debug for EncodedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedPublicKey({})", self.user_id())
    }
}

/// A peer on the ring: where to reach it and the key it authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub addr: String,
    pub public_key: EncodedPublicKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    User,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    UserRegistration,
    GetSuccessor,
    GetFile,
    PostFile,
    DeleteFile,
    GetPublicKey,
    PostPublicKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success,
    Error,
}

/// A wrapped session key destined for another owner of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedSecret {
    pub id: Identifier,
    pub secret: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub origin: Origin,
    pub from: Identifier,
    pub key: Identifier,
    pub data_length: u64,
    pub public_key: EncodedPublicKey,
    pub resource_name: String,
    pub log: bool,
    pub clock: u64,
    pub secret: Vec<u8>,
    pub shared_with: Vec<SharedSecret>,
}

impl Header {
    pub fn new(origin: Origin, from: Identifier, public_key: EncodedPublicKey) -> Self {
        Self {
            origin,
            from,
            key: Identifier::default(),
            data_length: 0,
            public_key,
            resource_name: String::new(),
            log: false,
            clock: 0,
            secret: Vec::new(),
            shared_with: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub header: Header,
    pub method: Method,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub clock: u64,
    pub secret: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub header: ResponseHeader,
    pub data: Vec<u8>,
}

impl Response {
    pub fn success(clock: u64, data: Vec<u8>) -> Self {
        Self {
            status: Status::Success,
            header: ResponseHeader {
                clock,
                secret: Vec::new(),
            },
            data,
        }
    }

    pub fn error(clock: u64) -> Self {
        Self {
            status: Status::Error,
            header: ResponseHeader {
                clock,
                secret: Vec::new(),
            },
            data: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
