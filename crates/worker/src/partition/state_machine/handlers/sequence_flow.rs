// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tokenflow_types::process::BpmnElementType;
use tokenflow_types::record::Intent;

use super::parallel_gateway;
use crate::partition::state_machine::context::BpmnStepContext;
use crate::partition::state_machine::registry::BpmnStepHandler;
use crate::partition::state_machine::{Error, ProcessingFault};

/// Moves the path along a taken sequence flow to its target.
pub struct SequenceFlowHandler;

impl BpmnStepHandler for SequenceFlowHandler {
    fn handle(&self, ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
        let flow = ctx.sequence_flow()?;
        let target = ctx.process.node(flow.target);
        let value = ctx.value().for_element(
            &target.id,
            target.element_type,
            Some(ctx.flow_scope_key()?),
        );

        match target.element_type {
            BpmnElementType::ServiceTask | BpmnElementType::SubProcess => {
                ctx.output
                    .append_new_event(Intent::ElementActivating, value);
            }
            BpmnElementType::EndEvent => {
                ctx.output.append_new_event(Intent::EndEventOccurred, value);
            }
            BpmnElementType::ParallelGateway if target.incoming.len() <= 1 => {
                ctx.output.append_new_event(Intent::GatewayActivated, value);
            }
            BpmnElementType::ParallelGateway => parallel_gateway::join(ctx, target)?,
            element_type => {
                return Err(ProcessingFault::UnsupportedFlowTarget {
                    element_id: target.id.clone(),
                    element_type,
                }
                .into());
            }
        }
        Ok(())
    }
}
