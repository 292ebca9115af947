// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Step handlers of the supported BPMN elements.
//!
//! Activities (processes, sub-processes and service tasks) follow the element instance
//! lifecycle. Every lifecycle transition is applied to the instance when the corresponding event
//! is written, the handler of that event then performs the side effects of the new state. Events
//! of an instance which was terminated in between find the instance in another state and are
//! ignored.

mod container;
mod end_event;
mod parallel_gateway;
mod sequence_flow;
mod service_task;
mod start_event;

pub use container::ContainerHandler;
pub use end_event::EndEventHandler;
pub use parallel_gateway::ParallelGatewayHandler;
pub use sequence_flow::SequenceFlowHandler;
pub use service_task::ServiceTaskHandler;
pub use start_event::StartEventHandler;

use tracing::{debug, trace};

use tokenflow_storage_api::element_instance_table::{ElementInstance, ElementInstanceState};

use super::context::BpmnStepContext;
use super::{Error, ProcessingFault};

fn unexpected_intent(ctx: &BpmnStepContext<'_>) -> Error {
    ProcessingFault::MissingHandler {
        element_type: ctx.element.element_type(),
        intent: ctx.record.intent,
    }
    .into()
}

/// Creates the element instance of the activated element and activates it.
fn activate(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    let node = ctx.flow_node()?;
    let key = ctx.record_key()?;

    let mut value = ctx.value().clone();
    value.bpmn_element_type = Some(node.element_type);
    let mut instance = ElementInstance::new(key, value);
    ctx.write_lifecycle(&mut instance, ElementInstanceState::Activated)
}

/// Loads the instance of the record, unless it left `expected` in the meantime.
fn load_in_state(
    ctx: &BpmnStepContext<'_>,
    expected: ElementInstanceState,
) -> Result<Option<ElementInstance>, Error> {
    let instance = ctx.load_instance(ctx.record_key()?)?;
    if instance.state() != expected {
        trace!(
            key = %instance.key(),
            state = %instance.state(),
            %expected,
            "Ignoring stale lifecycle record"
        );
        return Ok(None);
    }
    Ok(Some(instance))
}

fn complete(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    if let Some(mut instance) = load_in_state(ctx, ElementInstanceState::Completing)? {
        ctx.write_lifecycle(&mut instance, ElementInstanceState::Completed)?;
    }
    Ok(())
}

/// Removes a terminated child and gives its token back to the flow scope.
fn on_terminated(ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
    let Some(instance) = load_in_state(ctx, ElementInstanceState::Terminated)? else {
        return Ok(());
    };
    ctx.delete_instance(instance.key())?;

    if instance.parent_key().is_some() {
        let mut scope = ctx.load_flow_scope()?;
        scope.consume_token()?;
        ctx.settle_scope(scope)?;
    } else {
        debug!(
            process_instance_key = %instance.key(),
            bpmn_process_id = %instance.value().bpmn_process_id,
            "Process instance terminated"
        );
    }
    Ok(())
}
