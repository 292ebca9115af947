// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokenflow_storage_api::element_instance_table::ElementInstanceState;
use tokenflow_types::record::RejectionType;

use super::{CommandContext, CommandHandler};
use crate::partition::state_machine::context::write_lifecycle;
use crate::partition::state_machine::Error;

pub struct CancelProcessInstance;

impl CommandHandler for CancelProcessInstance {
    fn handle(&self, ctx: &mut CommandContext<'_>) -> Result<(), Error> {
        let Some(key) = ctx.record.key else {
            ctx.reject(
                RejectionType::InvalidArgument,
                "Expected a process instance key, but none given",
            );
            return Ok(());
        };
        let Some(mut instance) = ctx.storage.get_element_instance(key)? else {
            ctx.reject(
                RejectionType::NotFound,
                format!("No process instance found with key '{key}'"),
            );
            return Ok(());
        };

        if instance.parent_key().is_some() {
            ctx.reject(
                RejectionType::InvalidArgument,
                format!("Element instance '{key}' is not a process instance"),
            );
            return Ok(());
        }
        if instance.is_terminating() {
            ctx.reject(
                RejectionType::InvalidState,
                format!("Process instance '{key}' is already being terminated"),
            );
            return Ok(());
        }
        if instance.state().is_final() {
            ctx.reject(
                RejectionType::InvalidState,
                format!("Process instance '{key}' is already {}", instance.state()),
            );
            return Ok(());
        }

        write_lifecycle(
            &mut *ctx.storage,
            &mut *ctx.output,
            &mut instance,
            ElementInstanceState::Terminating,
        )?;
        ctx.output.accept(key);
        Ok(())
    }
}
