// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Static, executable model of a deployed process.
//!
//! An [`ExecutableProcess`] is an arena: flow nodes and sequence flows live in two vectors and
//! reference each other through [`FlowNodeIdx`] and [`SequenceFlowIdx`]. The model is immutable
//! after it has been built and is shared read-only between all instances of the process.

mod builder;

pub use builder::*;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BpmnElementType {
    Process,
    SubProcess,
    StartEvent,
    EndEvent,
    ServiceTask,
    ParallelGateway,
    SequenceFlow,
}

impl BpmnElementType {
    /// Containers own a flow scope with their own start event and tokens.
    pub fn is_container(&self) -> bool {
        matches!(self, BpmnElementType::Process | BpmnElementType::SubProcess)
    }

    /// Elements which get an element instance when they are activated.
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            BpmnElementType::Process | BpmnElementType::SubProcess | BpmnElementType::ServiceTask
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display,
)]
#[display("node#{}", _0)]
pub struct FlowNodeIdx(usize);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display,
)]
#[display("flow#{}", _0)]
pub struct SequenceFlowIdx(usize);

#[derive(Debug, Clone)]
pub struct ExecutableFlowNode {
    pub id: String,
    pub element_type: BpmnElementType,
    /// The container this node lives in, `None` only for the process element.
    pub flow_scope: Option<FlowNodeIdx>,
    /// Incoming flows in model order.
    pub incoming: Vec<SequenceFlowIdx>,
    /// Outgoing flows in model order.
    pub outgoing: Vec<SequenceFlowIdx>,
    /// Start event of the scope owned by this node, set for containers.
    pub start_event: Option<FlowNodeIdx>,
}

#[derive(Debug, Clone)]
pub struct ExecutableSequenceFlow {
    pub id: String,
    pub source: FlowNodeIdx,
    pub target: FlowNodeIdx,
}

/// An element of a process, looked up by id.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    FlowNode(FlowNodeIdx, &'a ExecutableFlowNode),
    SequenceFlow(SequenceFlowIdx, &'a ExecutableSequenceFlow),
}

impl Element<'_> {
    pub fn id(&self) -> &str {
        match self {
            Element::FlowNode(_, node) => &node.id,
            Element::SequenceFlow(_, flow) => &flow.id,
        }
    }

    pub fn element_type(&self) -> BpmnElementType {
        match self {
            Element::FlowNode(_, node) => node.element_type,
            Element::SequenceFlow(..) => BpmnElementType::SequenceFlow,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutableProcess {
    bpmn_process_id: String,
    nodes: Vec<ExecutableFlowNode>,
    flows: Vec<ExecutableSequenceFlow>,
    node_ids: HashMap<String, FlowNodeIdx>,
    flow_ids: HashMap<String, SequenceFlowIdx>,
}

impl ExecutableProcess {
    const PROCESS_ELEMENT: FlowNodeIdx = FlowNodeIdx(0);

    pub fn bpmn_process_id(&self) -> &str {
        &self.bpmn_process_id
    }

    /// The node representing the process itself.
    pub fn process_element(&self) -> &ExecutableFlowNode {
        self.node(Self::PROCESS_ELEMENT)
    }

    pub fn node(&self, idx: FlowNodeIdx) -> &ExecutableFlowNode {
        &self.nodes[idx.0]
    }

    pub fn flow(&self, idx: SequenceFlowIdx) -> &ExecutableSequenceFlow {
        &self.flows[idx.0]
    }

    pub fn node_by_id(&self, id: &str) -> Option<(FlowNodeIdx, &ExecutableFlowNode)> {
        self.node_ids.get(id).map(|idx| (*idx, self.node(*idx)))
    }

    pub fn flow_by_id(&self, id: &str) -> Option<(SequenceFlowIdx, &ExecutableSequenceFlow)> {
        self.flow_ids.get(id).map(|idx| (*idx, self.flow(*idx)))
    }

    pub fn element(&self, id: &str) -> Option<Element<'_>> {
        self.node_by_id(id)
            .map(|(idx, node)| Element::FlowNode(idx, node))
            .or_else(|| {
                self.flow_by_id(id)
                    .map(|(idx, flow)| Element::SequenceFlow(idx, flow))
            })
    }

    pub fn incoming_flows<'a>(
        &'a self,
        node: &'a ExecutableFlowNode,
    ) -> impl Iterator<Item = &'a ExecutableSequenceFlow> + 'a {
        node.incoming.iter().map(|idx| self.flow(*idx))
    }

    pub fn outgoing_flows<'a>(
        &'a self,
        node: &'a ExecutableFlowNode,
    ) -> impl Iterator<Item = &'a ExecutableSequenceFlow> + 'a {
        node.outgoing.iter().map(|idx| self.flow(*idx))
    }

    /// Start event of the given container.
    pub fn start_event_of(&self, container: &ExecutableFlowNode) -> Option<&ExecutableFlowNode> {
        container.start_event.map(|idx| self.node(idx))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExecutableFlowNode> {
        self.nodes.iter()
    }

    pub fn flows(&self) -> impl Iterator<Item = &ExecutableSequenceFlow> {
        self.flows.iter()
    }
}
