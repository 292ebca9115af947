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

use tokenflow_storage_api::deferred_event_table::IndexedRecord;
use tokenflow_types::process::{BpmnElementType, ExecutableFlowNode};
use tokenflow_types::record::{Intent, Variables};

use crate::partition::state_machine::context::BpmnStepContext;
use crate::partition::state_machine::registry::BpmnStepHandler;
use crate::partition::state_machine::Error;

/// Forks the path which activated the gateway onto all outgoing flows.
pub struct ParallelGatewayHandler;

impl BpmnStepHandler for ParallelGatewayHandler {
    fn handle(&self, ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
        let node = ctx.flow_node()?;
        let value = ctx.value();
        ctx.take_outgoing_flows(node, value)
    }
}

/// Joins the paths arriving at a gateway with several incoming flows.
///
/// The taken sequence flow is deferred in the flow scope, keeping its token. Once every incoming
/// flow holds a deferred record, the first record of each flow is merged: the records are
/// removed, their tokens consumed, and the gateway is activated with a single new token. A flow
/// taken twice before the others arrived keeps its second record for the next activation.
pub(super) fn join(ctx: &mut BpmnStepContext<'_>, gateway: &ExecutableFlowNode) -> Result<(), Error> {
    let scope_key = ctx.flow_scope_key()?;
    ctx.output
        .defer_event(&mut *ctx.storage, scope_key, ctx.record)?;

    let deferred = ctx.storage.get_deferred_events(scope_key)?;
    let mergeable: Vec<&IndexedRecord> = ctx
        .process
        .incoming_flows(gateway)
        .filter_map(|flow| {
            deferred
                .iter()
                .find(|record| record.value.element_id == flow.id)
        })
        .collect();

    // at most one record per incoming flow is picked
    let incoming = gateway.incoming.len();
    if mergeable.len() < incoming {
        trace!(
            gateway = %gateway.id,
            arrived = mergeable.len(),
            incoming,
            "Waiting for remaining incoming flows"
        );
        return Ok(());
    }

    let mut scope = ctx.load_flow_scope()?;
    let mut variables = Variables::new();
    for record in mergeable {
        ctx.output
            .remove_deferred_event(&mut *ctx.storage, scope_key, record.key)?;
        scope.consume_token()?;
        variables.extend(
            record
                .value
                .variables
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
    }
    scope.spawn_token();
    ctx.storage.put_element_instance(&scope)?;

    let mut value = ctx
        .value()
        .for_element(&gateway.id, BpmnElementType::ParallelGateway, Some(scope_key));
    value.variables = variables;
    debug!(gateway = %gateway.id, %scope_key, "Parallel gateway joined");
    ctx.output.append_new_event(Intent::GatewayActivated, value);
    Ok(())
}
