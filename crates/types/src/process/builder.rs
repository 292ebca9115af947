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

use serde::{Deserialize, Serialize};

use super::{
    BpmnElementType, ExecutableFlowNode, ExecutableProcess, ExecutableSequenceFlow, FlowNodeIdx,
    SequenceFlowIdx,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("the root element '{0}' must be a process, but was {1}")]
    RootIsNotAProcess(String, BpmnElementType),
    #[error("element '{0}' of type {1} cannot be nested into a scope")]
    IllegalNestedElement(String, BpmnElementType),
    #[error("element '{0}' of type {1} cannot contain other elements")]
    NotAContainer(String, BpmnElementType),
    #[error("duplicate element id '{0}'")]
    DuplicateId(String),
    #[error("scope '{0}' has no start event")]
    MissingStartEvent(String),
    #[error("scope '{scope}' has more than one start event: '{first}' and '{second}'")]
    MultipleStartEvents {
        scope: String,
        first: String,
        second: String,
    },
    #[error("sequence flow '{flow}' references unknown element '{element}'")]
    UnknownFlowNode { flow: String, element: String },
    #[error("sequence flow '{flow}' connects element '{element}' of another scope")]
    FlowCrossesScope { flow: String, element: String },
    #[error("start event '{0}' must not have incoming sequence flows")]
    StartEventWithIncomingFlow(String),
    #[error("end event '{0}' must not have outgoing sequence flows")]
    EndEventWithOutgoingFlow(String),
}

/// Serializable definition of a container element and everything it contains.
///
/// This is the format process models are deployed in:
///
/// ```json
/// {
///   "id": "order",
///   "type": "process",
///   "elements": [
///     { "id": "start", "type": "start-event" },
///     { "id": "end", "type": "end-event" }
///   ],
///   "sequence-flows": [{ "id": "f1", "source": "start", "target": "end" }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ElementDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: BpmnElementType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ElementDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence_flows: Vec<SequenceFlowDefinition>,
}

impl ElementDefinition {
    pub fn new(id: impl Into<String>, element_type: BpmnElementType) -> Self {
        Self {
            id: id.into(),
            element_type,
            elements: Vec::new(),
            sequence_flows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SequenceFlowDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Fluent builder for process models.
///
/// ```rust
/// use tokenflow_types::process::ProcessBuilder;
///
/// let process = ProcessBuilder::new("order")
///     .start_event("start")
///     .service_task("ship")
///     .end_event("end")
///     .sequence_flow("f1", "start", "ship")
///     .sequence_flow("f2", "ship", "end")
///     .build()
///     .unwrap();
///
/// assert_eq!("order", process.bpmn_process_id());
/// ```
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    definition: ElementDefinition,
}

impl ProcessBuilder {
    pub fn new(bpmn_process_id: impl Into<String>) -> Self {
        Self {
            definition: ElementDefinition::new(bpmn_process_id, BpmnElementType::Process),
        }
    }

    fn scope(id: impl Into<String>, element_type: BpmnElementType) -> Self {
        Self {
            definition: ElementDefinition::new(id, element_type),
        }
    }

    pub fn element(mut self, id: impl Into<String>, element_type: BpmnElementType) -> Self {
        self.definition
            .elements
            .push(ElementDefinition::new(id, element_type));
        self
    }

    pub fn start_event(self, id: impl Into<String>) -> Self {
        self.element(id, BpmnElementType::StartEvent)
    }

    pub fn end_event(self, id: impl Into<String>) -> Self {
        self.element(id, BpmnElementType::EndEvent)
    }

    pub fn service_task(self, id: impl Into<String>) -> Self {
        self.element(id, BpmnElementType::ServiceTask)
    }

    pub fn parallel_gateway(self, id: impl Into<String>) -> Self {
        self.element(id, BpmnElementType::ParallelGateway)
    }

    /// Adds an embedded sub-process whose content is described by `content`.
    pub fn sub_process(
        mut self,
        id: impl Into<String>,
        content: impl FnOnce(ProcessBuilder) -> ProcessBuilder,
    ) -> Self {
        let sub_process = content(Self::scope(id, BpmnElementType::SubProcess));
        self.definition.elements.push(sub_process.definition);
        self
    }

    pub fn sequence_flow(
        mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.definition.sequence_flows.push(SequenceFlowDefinition {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn into_definition(self) -> ElementDefinition {
        self.definition
    }

    pub fn build(self) -> Result<ExecutableProcess, ModelError> {
        ExecutableProcess::try_from(self.definition)
    }
}

impl TryFrom<ElementDefinition> for ExecutableProcess {
    type Error = ModelError;

    fn try_from(definition: ElementDefinition) -> Result<Self, Self::Error> {
        if definition.element_type != BpmnElementType::Process {
            return Err(ModelError::RootIsNotAProcess(
                definition.id,
                definition.element_type,
            ));
        }

        let mut compiler = Compiler::default();
        compiler.add_node(&definition, None)?;
        compiler.add_scope(&definition, ExecutableProcess::PROCESS_ELEMENT)?;
        compiler.validate_events()?;

        Ok(ExecutableProcess {
            bpmn_process_id: definition.id,
            nodes: compiler.nodes,
            flows: compiler.flows,
            node_ids: compiler.node_ids,
            flow_ids: compiler.flow_ids,
        })
    }
}

#[derive(Default)]
struct Compiler {
    nodes: Vec<ExecutableFlowNode>,
    flows: Vec<ExecutableSequenceFlow>,
    node_ids: HashMap<String, FlowNodeIdx>,
    flow_ids: HashMap<String, SequenceFlowIdx>,
}

impl Compiler {
    fn ensure_unique(&self, id: &str) -> Result<(), ModelError> {
        if self.node_ids.contains_key(id) || self.flow_ids.contains_key(id) {
            return Err(ModelError::DuplicateId(id.to_owned()));
        }
        Ok(())
    }

    fn add_node(
        &mut self,
        definition: &ElementDefinition,
        flow_scope: Option<FlowNodeIdx>,
    ) -> Result<FlowNodeIdx, ModelError> {
        self.ensure_unique(&definition.id)?;

        if !definition.element_type.is_container()
            && (!definition.elements.is_empty() || !definition.sequence_flows.is_empty())
        {
            return Err(ModelError::NotAContainer(
                definition.id.clone(),
                definition.element_type,
            ));
        }

        let idx = FlowNodeIdx(self.nodes.len());
        self.nodes.push(ExecutableFlowNode {
            id: definition.id.clone(),
            element_type: definition.element_type,
            flow_scope,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            start_event: None,
        });
        self.node_ids.insert(definition.id.clone(), idx);
        Ok(idx)
    }

    fn add_scope(
        &mut self,
        definition: &ElementDefinition,
        scope: FlowNodeIdx,
    ) -> Result<(), ModelError> {
        let mut children = Vec::with_capacity(definition.elements.len());
        for element in &definition.elements {
            if matches!(
                element.element_type,
                BpmnElementType::Process | BpmnElementType::SequenceFlow
            ) {
                return Err(ModelError::IllegalNestedElement(
                    element.id.clone(),
                    element.element_type,
                ));
            }

            let idx = self.add_node(element, Some(scope))?;
            if element.element_type == BpmnElementType::StartEvent {
                if let Some(first) = self.nodes[scope.0].start_event {
                    return Err(ModelError::MultipleStartEvents {
                        scope: definition.id.clone(),
                        first: self.nodes[first.0].id.clone(),
                        second: element.id.clone(),
                    });
                }
                self.nodes[scope.0].start_event = Some(idx);
            }
            children.push((idx, element));
        }

        if self.nodes[scope.0].start_event.is_none() {
            return Err(ModelError::MissingStartEvent(definition.id.clone()));
        }

        for flow in &definition.sequence_flows {
            self.ensure_unique(&flow.id)?;
            let source = self.resolve_in_scope(flow, &flow.source, scope)?;
            let target = self.resolve_in_scope(flow, &flow.target, scope)?;

            let idx = SequenceFlowIdx(self.flows.len());
            self.flows.push(ExecutableSequenceFlow {
                id: flow.id.clone(),
                source,
                target,
            });
            self.flow_ids.insert(flow.id.clone(), idx);
            self.nodes[source.0].outgoing.push(idx);
            self.nodes[target.0].incoming.push(idx);
        }

        for (idx, element) in children {
            if element.element_type.is_container() {
                self.add_scope(element, idx)?;
            }
        }
        Ok(())
    }

    fn resolve_in_scope(
        &self,
        flow: &SequenceFlowDefinition,
        element: &str,
        scope: FlowNodeIdx,
    ) -> Result<FlowNodeIdx, ModelError> {
        let idx = *self
            .node_ids
            .get(element)
            .ok_or_else(|| ModelError::UnknownFlowNode {
                flow: flow.id.clone(),
                element: element.to_owned(),
            })?;
        if self.nodes[idx.0].flow_scope != Some(scope) {
            return Err(ModelError::FlowCrossesScope {
                flow: flow.id.clone(),
                element: element.to_owned(),
            });
        }
        Ok(idx)
    }

    fn validate_events(&self) -> Result<(), ModelError> {
        for node in &self.nodes {
            match node.element_type {
                BpmnElementType::StartEvent if !node.incoming.is_empty() => {
                    return Err(ModelError::StartEventWithIncomingFlow(node.id.clone()));
                }
                BpmnElementType::EndEvent if !node.outgoing.is_empty() => {
                    return Err(ModelError::EndEventWithOutgoingFlow(node.id.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    fn fork_join() -> ProcessBuilder {
        ProcessBuilder::new("fork-join")
            .start_event("start")
            .parallel_gateway("fork")
            .service_task("a")
            .service_task("b")
            .parallel_gateway("join")
            .end_event("end")
            .sequence_flow("f0", "start", "fork")
            .sequence_flow("fa", "fork", "a")
            .sequence_flow("fb", "fork", "b")
            .sequence_flow("f1", "a", "join")
            .sequence_flow("f2", "b", "join")
            .sequence_flow("f3", "join", "end")
    }

    #[test]
    fn builds_arena_with_ordered_flows() {
        let process = fork_join().build().unwrap();

        let (_, join) = process.node_by_id("join").unwrap();
        assert_that!(join.element_type, eq(BpmnElementType::ParallelGateway));
        assert_that!(
            process
                .incoming_flows(join)
                .map(|flow| flow.id.as_str())
                .collect::<Vec<_>>(),
            elements_are![eq(&"f1"), eq(&"f2")]
        );

        let (_, fork) = process.node_by_id("fork").unwrap();
        assert_that!(fork.outgoing, len(eq(2)));

        let start = process.start_event_of(process.process_element()).unwrap();
        assert_that!(start.id.as_str(), eq("start"));

        let flow = process.element("f3").unwrap();
        assert_that!(flow.element_type(), eq(BpmnElementType::SequenceFlow));
        assert_that!(process.element("unknown").is_none(), eq(true));
    }

    #[test]
    fn sub_process_has_its_own_scope() {
        let process = ProcessBuilder::new("outer")
            .start_event("start")
            .sub_process("sub", |sub| {
                sub.start_event("sub-start")
                    .end_event("sub-end")
                    .sequence_flow("s1", "sub-start", "sub-end")
            })
            .end_event("end")
            .sequence_flow("f1", "start", "sub")
            .sequence_flow("f2", "sub", "end")
            .build()
            .unwrap();

        let (sub_idx, sub) = process.node_by_id("sub").unwrap();
        let (_, sub_start) = process.node_by_id("sub-start").unwrap();
        assert_that!(sub_start.flow_scope, some(eq(sub_idx)));
        assert_that!(
            process.start_event_of(sub).map(|n| n.id.clone()),
            some(eq("sub-start"))
        );
    }

    #[test]
    fn rejects_invalid_models() {
        assert_that!(
            ProcessBuilder::new("p").end_event("end").build().unwrap_err(),
            eq(&ModelError::MissingStartEvent("p".to_owned()))
        );

        assert_that!(
            ProcessBuilder::new("p")
                .start_event("s1")
                .start_event("s2")
                .build()
                .unwrap_err(),
            eq(&ModelError::MultipleStartEvents {
                scope: "p".to_owned(),
                first: "s1".to_owned(),
                second: "s2".to_owned(),
            })
        );

        assert_that!(
            ProcessBuilder::new("p")
                .start_event("start")
                .end_event("start")
                .build()
                .unwrap_err(),
            eq(&ModelError::DuplicateId("start".to_owned()))
        );

        assert_that!(
            ProcessBuilder::new("p")
                .start_event("start")
                .sequence_flow("f1", "start", "missing")
                .build()
                .unwrap_err(),
            eq(&ModelError::UnknownFlowNode {
                flow: "f1".to_owned(),
                element: "missing".to_owned(),
            })
        );

        assert_that!(
            ProcessBuilder::new("p")
                .start_event("start")
                .end_event("end")
                .sequence_flow("f1", "end", "start")
                .build()
                .unwrap_err(),
            eq(&ModelError::StartEventWithIncomingFlow("start".to_owned()))
        );

        assert_that!(
            ProcessBuilder::new("p")
                .start_event("start")
                .sub_process("sub", |sub| sub.start_event("inner"))
                .sequence_flow("f1", "start", "inner")
                .build()
                .unwrap_err(),
            eq(&ModelError::FlowCrossesScope {
                flow: "f1".to_owned(),
                element: "inner".to_owned(),
            })
        );
    }

    #[test]
    fn deserializes_json_definition() {
        let definition: ElementDefinition = serde_json::from_str(
            r#"{
                "id": "order",
                "type": "process",
                "elements": [
                    { "id": "start", "type": "start-event" },
                    { "id": "task", "type": "service-task" },
                    { "id": "end", "type": "end-event" }
                ],
                "sequence-flows": [
                    { "id": "f1", "source": "start", "target": "task" },
                    { "id": "f2", "source": "task", "target": "end" }
                ]
            }"#,
        )
        .unwrap();

        let expected = ProcessBuilder::new("order")
            .start_event("start")
            .service_task("task")
            .end_event("end")
            .sequence_flow("f1", "start", "task")
            .sequence_flow("f2", "task", "end")
            .into_definition();
        assert_that!(definition, eq(&expected));

        let process = ExecutableProcess::try_from(definition).unwrap();
        assert_that!(process.flows().count(), eq(2));
    }
}
