// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strum::EnumIter;

use tokenflow_storage_api::{Result, StorageError};
use tokenflow_types::identifiers::Key;

/// Every table key needs to have a key kind. This allows to multiplex different keys in the same
/// column family and to evolve a key if necessary.
///
/// # Important
/// There must exist a bijective mapping between the enum variant and its byte representation.
/// See [`KeyKind::as_bytes`] and [`KeyKind::from_bytes`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, EnumIter, derive_more::Display)]
pub enum KeyKind {
    DeferredEvent,
    ElementInstance,
    ElementInstanceChild,
    Fsm,
}

impl KeyKind {
    pub const SERIALIZED_LENGTH: usize = 2;

    /// A once assigned byte representation to a key kind variant must never be changed! Instead,
    /// create a new variant representing a new key.
    ///
    /// # Important
    /// The following invariant must hold:
    /// ```ignore
    /// KeyKind::from_bytes(key_kind.as_bytes()) == key_kind
    /// ```
    pub const fn as_bytes(&self) -> &'static [u8; Self::SERIALIZED_LENGTH] {
        match self {
            KeyKind::DeferredEvent => b"de",
            KeyKind::ElementInstance => b"ei",
            KeyKind::ElementInstanceChild => b"ec",
            KeyKind::Fsm => b"fs",
        }
    }

    pub const fn from_bytes(bytes: &[u8; Self::SERIALIZED_LENGTH]) -> Option<Self> {
        match bytes {
            b"de" => Some(KeyKind::DeferredEvent),
            b"ei" => Some(KeyKind::ElementInstance),
            b"ec" => Some(KeyKind::ElementInstanceChild),
            b"fs" => Some(KeyKind::Fsm),
            _ => None,
        }
    }

    /// Name of the column family holding the keys of this kind.
    pub const fn cf_name(&self) -> &'static str {
        match self {
            KeyKind::DeferredEvent => "deferred_event",
            KeyKind::ElementInstance => "element_instance",
            KeyKind::ElementInstanceChild => "element_instance_child",
            KeyKind::Fsm => "fsm",
        }
    }

    pub fn serialize<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(self.as_bytes());
    }

    pub fn deserialize<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < KeyKind::SERIALIZED_LENGTH {
            return Err(StorageError::DataIntegrityError);
        }

        let mut bytes = [0; KeyKind::SERIALIZED_LENGTH];
        buf.copy_to_slice(&mut bytes);
        Self::from_bytes(&bytes)
            .ok_or_else(|| StorageError::Generic(anyhow::anyhow!("unknown key kind: {:x?}", bytes)))
    }
}

/// Builds a table key out of its key kind followed by its components. Keys are written big endian
/// so that the byte order of two keys of the same kind equals the order of their components.
#[derive(Debug)]
pub(crate) struct TableKey {
    buf: BytesMut,
}

impl TableKey {
    pub fn new(kind: KeyKind) -> Self {
        let mut buf = BytesMut::with_capacity(KeyKind::SERIALIZED_LENGTH + 16);
        kind.serialize(&mut buf);
        Self { buf }
    }

    pub fn key(mut self, key: Key) -> Self {
        self.buf.put_i64(key.as_i64());
        self
    }

    pub fn id(mut self, id: u64) -> Self {
        self.buf.put_u64(id);
        self
    }

    pub fn build(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads the trailing [`Key`] component of a serialized table key.
pub(crate) fn last_key_component(key: &[u8]) -> Result<Key> {
    let Some(start) = key.len().checked_sub(size_of::<i64>()) else {
        return Err(StorageError::DataIntegrityError);
    };
    if start < KeyKind::SERIALIZED_LENGTH {
        return Err(StorageError::DataIntegrityError);
    }
    let mut component = &key[start..];
    Ok(Key::from_raw(component.get_i64()))
}
