//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! `event_id` はエンベロープ生成時に採番される ULID です。
//! `Id<T>` で共通実装を持ち、`T` はマーカー型としてコンパイル時にだけ使います。
//!
//! `request_id` は呼び出し側が決める文字列なので、ULID ではなく
//! `RequestId` newtype で表現します（相関キー・冪等キーを兼ねる）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックスを提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// Wire format is the bare ULID string; the prefix only appears in `Display`
/// so log lines stay readable.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Envelope のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {}

impl IdMarker for Event {
    fn prefix() -> &'static str {
        "evt_"
    }
}

/// Consumer instance のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Consumer {}

impl IdMarker for Consumer {
    fn prefix() -> &'static str {
        "consumer_"
    }
}

/// Identifier of an envelope (generated at build time, immutable).
pub type EventId = Id<Event>;

/// Identifier of one running consumer instance (a member of a consumer group).
pub type ConsumerId = Id<Consumer>;

/// `eventId` as it appears on an envelope.
///
/// 自前で組み立てたエンベロープは ULID を採番しますが、他の producer が直接 publish した
/// レコードは UUID や `evt_123` のような任意の文字列を使うことがあります。
/// 後者は空白でないことだけ確認し、そのままの文字列で持ち回します。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvelopeId {
    Generated(EventId),
    External(String),
}

impl EnvelopeId {
    /// Read a wire `eventId`. Returns `None` for a blank string.
    ///
    /// Only a bare ULID becomes `Generated`, so the wire form survives re-encoding unchanged.
    pub fn from_wire(raw: String) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(match Ulid::from_string(&raw) {
            Ok(ulid) => Self::Generated(EventId::from_ulid(ulid)),
            Err(_) => Self::External(raw),
        })
    }

    pub fn to_wire(&self) -> String {
        match self {
            Self::Generated(id) => id.as_ulid().to_string(),
            Self::External(raw) => raw.clone(),
        }
    }

    pub fn as_ulid(&self) -> Option<Ulid> {
        match self {
            Self::Generated(id) => Some(id.as_ulid()),
            Self::External(_) => None,
        }
    }
}

impl From<EventId> for EnvelopeId {
    fn from(id: EventId) -> Self {
        Self::Generated(id)
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated(id) => id.fmt(f),
            Self::External(raw) => raw.fmt(f),
        }
    }
}

/// Caller-supplied correlation identifier.
///
/// Unique per logical unit of work. Every response envelope carries the
/// `RequestId` of the request envelope that spawned it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
