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
use tokenflow_types::process::BpmnElementType;
use tokenflow_types::record::RejectionType;

use super::{CommandContext, CommandHandler};
use crate::partition::state_machine::context::write_lifecycle;
use crate::partition::state_machine::Error;

/// Completes an activated service task. Variables of the command are merged into the task.
pub struct CompleteElement;

impl CommandHandler for CompleteElement {
    fn handle(&self, ctx: &mut CommandContext<'_>) -> Result<(), Error> {
        let Some(key) = ctx.record.key else {
            ctx.reject(
                RejectionType::InvalidArgument,
                "Expected an element instance key, but none given",
            );
            return Ok(());
        };
        let Some(mut instance) = ctx.storage.get_element_instance(key)? else {
            ctx.reject(
                RejectionType::NotFound,
                format!("No element instance found with key '{key}'"),
            );
            return Ok(());
        };

        if instance.value().bpmn_element_type != Some(BpmnElementType::ServiceTask) {
            ctx.reject(
                RejectionType::InvalidArgument,
                format!("Element instance '{key}' is not a service task"),
            );
            return Ok(());
        }
        if !instance.is_active() {
            ctx.reject(
                RejectionType::InvalidState,
                format!(
                    "Expected service task '{key}' to be ACTIVATED, but it is {}",
                    instance.state()
                ),
            );
            return Ok(());
        }

        instance
            .value_mut()
            .merge_variables(&ctx.record.value.variables);
        write_lifecycle(
            &mut *ctx.storage,
            &mut *ctx.output,
            &mut instance,
            ElementInstanceState::Completing,
        )?;
        ctx.output.accept(key);
        Ok(())
    }
}
