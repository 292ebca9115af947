// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::trace;

use tokenflow_storage_api::element_instance_table::ElementInstanceState;
use tokenflow_types::record::Intent;

use super::{activate, complete, load_in_state, on_terminated, unexpected_intent};
use crate::partition::state_machine::context::BpmnStepContext;
use crate::partition::state_machine::registry::BpmnStepHandler;
use crate::partition::state_machine::Error;

/// Service tasks wait in `ACTIVATED` until a `CompleteElement` command completes them.
pub struct ServiceTaskHandler;

impl BpmnStepHandler for ServiceTaskHandler {
    fn handle(&self, ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
        match ctx.record.intent {
            Intent::ElementActivating => activate(ctx),
            Intent::ElementActivated => {
                trace!(key = ?ctx.record.key, "Service task is waiting for completion");
                Ok(())
            }
            Intent::ElementCompleting => complete(ctx),
            Intent::ElementCompleted => on_completed(ctx),
            Intent::ElementTerminating => on_terminating(ctx),
            Intent::ElementTerminated => on_terminated(ctx),
            _ => Err(unexpected_intent(ctx)),
        }
    }
}

fn on_completed(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    let Some(instance) = load_in_state(ctx, ElementInstanceState::Completed)? else {
        return Ok(());
    };
    ctx.delete_instance(instance.key())?;

    let node = ctx.flow_node()?;
    ctx.take_outgoing_flows(node, instance.value())
}

fn on_terminating(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    if let Some(mut instance) = load_in_state(ctx, ElementInstanceState::Terminating)? {
        ctx.write_lifecycle(&mut instance, ElementInstanceState::Terminated)?;
    }
    Ok(())
}
