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

use tokenflow_storage_api::element_instance_table::{ElementInstance, ElementInstanceState};
use tokenflow_types::identifiers::Key;
use tokenflow_types::process::{
    BpmnElementType, Element, ExecutableFlowNode, ExecutableProcess, ExecutableSequenceFlow,
};
use tokenflow_types::record::{Intent, ProcessInstanceRecord, Record};

use super::event_output::EventOutput;
use super::{Error, ProcessingFault, StepStorage};

/// Everything a [`BpmnStepHandler`](super::registry::BpmnStepHandler) needs to process one event.
pub struct BpmnStepContext<'a> {
    pub record: &'a Record,
    pub process: &'a ExecutableProcess,
    pub element: Element<'a>,
    pub storage: &'a mut dyn StepStorage,
    pub output: &'a mut EventOutput,
}

impl<'a> BpmnStepContext<'a> {
    pub fn value(&self) -> &'a ProcessInstanceRecord {
        &self.record.value
    }

    pub fn record_key(&self) -> Result<Key, Error> {
        Ok(self.record.key.ok_or(ProcessingFault::MissingRecordKey {
            intent: self.record.intent,
        })?)
    }

    pub fn flow_node(&self) -> Result<&'a ExecutableFlowNode, Error> {
        match self.element {
            Element::FlowNode(_, node) => Ok(node),
            Element::SequenceFlow(..) => Err(self.unexpected_element()),
        }
    }

    pub fn sequence_flow(&self) -> Result<&'a ExecutableSequenceFlow, Error> {
        match self.element {
            Element::SequenceFlow(_, flow) => Ok(flow),
            Element::FlowNode(..) => Err(self.unexpected_element()),
        }
    }

    fn unexpected_element(&self) -> Error {
        ProcessingFault::MissingHandler {
            element_type: self.element.element_type(),
            intent: self.record.intent,
        }
        .into()
    }

    pub fn flow_scope_key(&self) -> Result<Key, Error> {
        Ok(self
            .value()
            .flow_scope_key
            .ok_or_else(|| ProcessingFault::MissingFlowScope {
                element_id: self.value().element_id.clone(),
                scope_key: None,
            })?)
    }

    pub fn load_flow_scope(&self) -> Result<ElementInstance, Error> {
        let scope_key = self.flow_scope_key()?;
        Ok(self
            .storage
            .get_element_instance(scope_key)?
            .ok_or_else(|| ProcessingFault::MissingFlowScope {
                element_id: self.value().element_id.clone(),
                scope_key: Some(scope_key),
            })?)
    }

    pub fn load_instance(&self, key: Key) -> Result<ElementInstance, Error> {
        load_instance(&*self.storage, key)
    }

    /// Deletes the instance together with the records deferred in its scope.
    pub fn delete_instance(&mut self, key: Key) -> Result<(), Error> {
        self.storage.delete_element_instance(key)?;
        self.storage.remove_all_deferred_events(key)?;
        Ok(())
    }

    pub fn write_lifecycle(
        &mut self,
        instance: &mut ElementInstance,
        state: ElementInstanceState,
    ) -> Result<(), Error> {
        write_lifecycle(&mut *self.storage, &mut *self.output, instance, state)
    }

    /// Drops a token carrying record whose flow scope is being terminated. The token of the
    /// record is given back to the scope.
    pub fn drop_if_flow_scope_terminates(&mut self) -> Result<bool, Error> {
        if self.value().flow_scope_key.is_none() {
            return Ok(false);
        }
        let mut scope = self.load_flow_scope()?;
        if !scope.is_terminating() {
            return Ok(false);
        }

        trace!(
            scope_key = %scope.key(),
            element_id = %self.value().element_id,
            "Dropping record of terminating flow scope"
        );
        scope.consume_token()?;
        self.settle_scope(scope)?;
        Ok(true)
    }

    /// Persists the scope after its tokens changed. A scope without active tokens and without
    /// deferred records moves on: an active scope starts completing, a terminating one is
    /// terminated.
    pub fn settle_scope(&mut self, mut scope: ElementInstance) -> Result<(), Error> {
        if scope.can_complete() && self.storage.get_deferred_events(scope.key())?.is_empty() {
            match scope.state() {
                ElementInstanceState::Activated => {
                    return self.write_lifecycle(&mut scope, ElementInstanceState::Completing);
                }
                ElementInstanceState::Terminating => {
                    return self.write_lifecycle(&mut scope, ElementInstanceState::Terminated);
                }
                _ => {}
            }
        }
        self.storage.put_element_instance(&scope)?;
        Ok(())
    }

    /// Continues the path which arrived at `node` on each of its outgoing flows. The arriving
    /// token is replaced by one token per outgoing flow, so a node without outgoing flows ends
    /// the path.
    pub fn take_outgoing_flows(
        &mut self,
        node: &ExecutableFlowNode,
        value: &ProcessInstanceRecord,
    ) -> Result<(), Error> {
        let process = self.process;
        let mut scope = self.load_flow_scope()?;
        if !scope.is_terminating() {
            for flow in process.outgoing_flows(node) {
                scope.spawn_token();
                self.output.append_new_event(
                    Intent::SequenceFlowTaken,
                    value.for_element(&flow.id, BpmnElementType::SequenceFlow, Some(scope.key())),
                );
            }
        }
        scope.consume_token()?;
        self.settle_scope(scope)
    }
}

pub(super) fn load_instance(
    storage: &dyn StepStorage,
    key: Key,
) -> Result<ElementInstance, Error> {
    Ok(storage
        .get_element_instance(key)?
        .ok_or(ProcessingFault::MissingElementInstance(key))?)
}

/// Moves the instance to `state`, persists it and appends the matching lifecycle event.
pub(super) fn write_lifecycle(
    storage: &mut dyn StepStorage,
    output: &mut EventOutput,
    instance: &mut ElementInstance,
    state: ElementInstanceState,
) -> Result<(), Error> {
    instance.transition_to(state)?;
    storage.put_element_instance(instance)?;
    output.append_follow_up_event(instance.key(), lifecycle_intent(state), instance.value().clone());
    Ok(())
}

fn lifecycle_intent(state: ElementInstanceState) -> Intent {
    match state {
        ElementInstanceState::Activating => Intent::ElementActivating,
        ElementInstanceState::Activated => Intent::ElementActivated,
        ElementInstanceState::Completing => Intent::ElementCompleting,
        ElementInstanceState::Completed => Intent::ElementCompleted,
        ElementInstanceState::Terminating => Intent::ElementTerminating,
        ElementInstanceState::Terminated => Intent::ElementTerminated,
    }
}
