// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;

use tokenflow_types::errors::MaybeRetryableError;

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("generic storage error: {0}")]
    Generic(#[from] anyhow::Error),
    #[error("failed to convert Rust objects to/from their stored representation: {0}")]
    Conversion(anyhow::Error),
    #[error("integrity constraint is violated")]
    DataIntegrityError,
    /// Errors which are expected to disappear when the operation is repeated, e.g. a commit that
    /// failed on contention or on a temporarily unavailable device.
    #[error("transient storage error: {0}")]
    Transient(anyhow::Error),
}

impl MaybeRetryableError for StorageError {
    fn retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub mod deferred_event_table;
pub mod element_instance_table;
pub mod fsm_table;

pub trait Storage {
    type TransactionType<'a>: Transaction
    where
        Self: 'a;

    /// Creates a transaction. Writes are buffered in the transaction and become visible
    /// atomically once it is committed. Dropping a transaction discards its writes.
    fn transaction(&mut self) -> Self::TransactionType<'_>;
}

pub trait Transaction:
    element_instance_table::ElementInstanceTable
    + deferred_event_table::DeferredEventTable
    + fsm_table::FsmTable
    + Send
{
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
