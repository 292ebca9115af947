// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::{debug, trace};

use tokenflow_storage_api::element_instance_table::ElementInstanceState;
use tokenflow_types::process::BpmnElementType;
use tokenflow_types::record::Intent;

use super::{activate, complete, load_in_state, on_terminated, unexpected_intent};
use crate::partition::state_machine::context::BpmnStepContext;
use crate::partition::state_machine::registry::BpmnStepHandler;
use crate::partition::state_machine::{Error, ProcessingFault};

/// Lifecycle of processes and embedded sub-processes, i.e. of elements owning a flow scope.
pub struct ContainerHandler;

impl BpmnStepHandler for ContainerHandler {
    fn handle(&self, ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
        match ctx.record.intent {
            Intent::ElementActivating => activate(ctx),
            Intent::ElementActivated => on_activated(ctx),
            Intent::ElementCompleting => complete(ctx),
            Intent::ElementCompleted => on_completed(ctx),
            Intent::ElementTerminating => on_terminating(ctx),
            Intent::ElementTerminated => on_terminated(ctx),
            _ => Err(unexpected_intent(ctx)),
        }
    }
}

/// Starts the single path of the scope at its start event.
fn on_activated(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    let Some(mut instance) = load_in_state(ctx, ElementInstanceState::Activated)? else {
        return Ok(());
    };
    let node = ctx.flow_node()?;
    let start_event = ctx
        .process
        .start_event_of(node)
        .ok_or_else(|| ProcessingFault::MissingStartEvent(node.id.clone()))?;

    instance.spawn_token();
    ctx.storage.put_element_instance(&instance)?;
    ctx.output.append_new_event(
        Intent::StartEventOccurred,
        instance.value().for_element(
            &start_event.id,
            BpmnElementType::StartEvent,
            Some(instance.key()),
        ),
    );
    Ok(())
}

fn on_completed(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    let Some(instance) = load_in_state(ctx, ElementInstanceState::Completed)? else {
        return Ok(());
    };
    ctx.delete_instance(instance.key())?;

    if instance.parent_key().is_some() {
        let node = ctx.flow_node()?;
        ctx.take_outgoing_flows(node, instance.value())
    } else {
        debug!(
            process_instance_key = %instance.key(),
            bpmn_process_id = %instance.value().bpmn_process_id,
            "Process instance completed"
        );
        Ok(())
    }
}

/// Terminates all children of the scope and drops its deferred records. The scope itself is
/// terminated once the last child gave back its token.
fn on_terminating(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    let Some(mut instance) = load_in_state(ctx, ElementInstanceState::Terminating)? else {
        return Ok(());
    };

    for mut child in ctx.storage.get_children(instance.key())? {
        if child.state().is_final() || child.is_terminating() {
            continue;
        }
        trace!(key = %child.key(), element_id = %child.element_id(), "Terminating child");
        ctx.write_lifecycle(&mut child, ElementInstanceState::Terminating)?;
    }

    for deferred in ctx.storage.get_deferred_events(instance.key())? {
        ctx.output
            .remove_deferred_event(&mut *ctx.storage, instance.key(), deferred.key)?;
        instance.consume_token()?;
    }

    ctx.settle_scope(instance)
}
