// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identifiers of partitions, records, and deployed processes.

/// Identifying a partition. A partition owns an independently ordered journal and its state.
#[derive(
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Hash,
    derive_more::Deref,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
    derive_more::Debug,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
#[debug("{}", _0)]
pub struct PartitionId(u16);

impl From<PartitionId> for u64 {
    fn from(value: PartitionId) -> Self {
        u64::from(value.0)
    }
}

impl PartitionId {
    /// It's your responsibility to ensure the value is within the valid range.
    pub const fn new_unchecked(v: u16) -> Self {
        Self(v)
    }

    pub const MIN: Self = Self(u16::MIN);
    /// Keys reserve [`Key::PARTITION_BITS`] bits for the partition id.
    pub const MAX: Self = Self((1 << Key::PARTITION_BITS) - 1);

    #[inline]
    pub fn next(self) -> Self {
        Self(std::cmp::min(Self::MAX.0, self.0.saturating_add(1)))
    }
}

/// Globally unique key of a record or an element instance.
///
/// The upper [`Key::PARTITION_BITS`] bits (below the sign bit) carry the id of the partition which
/// generated the key, so that commands addressing an existing entity can be routed without lookup.
#[derive(
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
    derive_more::Debug,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
#[debug("{}", _0)]
pub struct Key(i64);

impl Key {
    pub const PARTITION_BITS: u32 = 12;
    pub const LOCAL_KEY_BITS: u32 = 63 - Self::PARTITION_BITS;

    const LOCAL_KEY_MASK: i64 = (1 << Self::LOCAL_KEY_BITS) - 1;

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn encode(partition_id: PartitionId, local_key: u64) -> Self {
        debug_assert!(local_key <= Self::LOCAL_KEY_MASK as u64);
        let partition = i64::from(*partition_id) << Self::LOCAL_KEY_BITS;
        Self(partition + (local_key as i64 & Self::LOCAL_KEY_MASK))
    }

    pub fn partition_id(&self) -> PartitionId {
        PartitionId((self.0 >> Self::LOCAL_KEY_BITS) as u16)
    }

    pub fn local_key(&self) -> u64 {
        (self.0 & Self::LOCAL_KEY_MASK) as u64
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// Key of a deployed process definition.
#[derive(
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
    derive_more::Debug,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
#[debug("{}", _0)]
pub struct ProcessDefinitionKey(i64);

impl ProcessDefinitionKey {
    pub const fn new(key: i64) -> Self {
        Self(key)
    }
}

/// Byte offset of an entry in a partition journal.
pub type Position = u64;
