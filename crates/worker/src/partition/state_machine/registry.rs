// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;

use tokenflow_types::process::BpmnElementType;
use tokenflow_types::record::Intent;

use super::context::BpmnStepContext;
use super::handlers::{
    ContainerHandler, EndEventHandler, ParallelGatewayHandler, SequenceFlowHandler,
    ServiceTaskHandler, StartEventHandler,
};
use super::Error;

/// Processes the events of one kind of BPMN element.
pub trait BpmnStepHandler: Send + Sync {
    fn handle(&self, ctx: &mut BpmnStepContext<'_>) -> Result<(), Error>;
}

pub struct StepHandlerRegistry {
    handlers: HashMap<(BpmnElementType, Intent), Arc<dyn BpmnStepHandler>>,
}

impl StepHandlerRegistry {
    pub fn get(
        &self,
        element_type: BpmnElementType,
        intent: Intent,
    ) -> Option<&Arc<dyn BpmnStepHandler>> {
        self.handlers.get(&(element_type, intent))
    }

    fn register(
        &mut self,
        element_type: BpmnElementType,
        intents: &[Intent],
        handler: Arc<dyn BpmnStepHandler>,
    ) {
        for intent in intents {
            self.handlers
                .insert((element_type, *intent), Arc::clone(&handler));
        }
    }
}

impl Default for StepHandlerRegistry {
    fn default() -> Self {
        const LIFECYCLE: [Intent; 6] = [
            Intent::ElementActivating,
            Intent::ElementActivated,
            Intent::ElementCompleting,
            Intent::ElementCompleted,
            Intent::ElementTerminating,
            Intent::ElementTerminated,
        ];

        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(
            BpmnElementType::Process,
            &LIFECYCLE,
            Arc::new(ContainerHandler),
        );
        registry.register(
            BpmnElementType::SubProcess,
            &LIFECYCLE,
            Arc::new(ContainerHandler),
        );
        registry.register(
            BpmnElementType::ServiceTask,
            &LIFECYCLE,
            Arc::new(ServiceTaskHandler),
        );
        registry.register(
            BpmnElementType::StartEvent,
            &[Intent::StartEventOccurred],
            Arc::new(StartEventHandler),
        );
        registry.register(
            BpmnElementType::EndEvent,
            &[Intent::EndEventOccurred],
            Arc::new(EndEventHandler),
        );
        registry.register(
            BpmnElementType::SequenceFlow,
            &[Intent::SequenceFlowTaken],
            Arc::new(SequenceFlowHandler),
        );
        registry.register(
            BpmnElementType::ParallelGateway,
            &[Intent::GatewayActivated],
            Arc::new(ParallelGatewayHandler),
        );
        registry
    }
}
