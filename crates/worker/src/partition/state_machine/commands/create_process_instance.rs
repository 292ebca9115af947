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
use tokenflow_types::record::{Intent, ProcessInstanceRecord, RejectionType};

use super::{CommandContext, CommandHandler};
use crate::partition::state_machine::Error;

/// Starts a new instance of a deployed process. The process is addressed by its definition key,
/// or by its bpmn process id together with a version (latest if the version is `0`).
pub struct CreateProcessInstance;

impl CommandHandler for CreateProcessInstance {
    fn handle(&self, ctx: &mut CommandContext<'_>) -> Result<(), Error> {
        let record = ctx.record;
        let command = &record.value;
        let deployed = match command.process_definition_key {
            Some(key) => ctx.processes.get_by_key(key),
            None if command.bpmn_process_id.is_empty() => {
                ctx.reject(
                    RejectionType::InvalidArgument,
                    "Expected either a process definition key or a bpmn process id, but none given",
                );
                return Ok(());
            }
            None if command.version > 0 => ctx
                .processes
                .get_version(&command.bpmn_process_id, command.version),
            None => ctx.processes.get_latest(&command.bpmn_process_id),
        };

        let Some(deployed) = deployed else {
            let reason = match command.process_definition_key {
                Some(key) => format!("No process deployed with key '{key}'"),
                None => format!(
                    "No process deployed with bpmn process id '{}'",
                    command.bpmn_process_id
                ),
            };
            ctx.reject(RejectionType::NotFound, reason);
            return Ok(());
        };

        let key = ctx.output.next_key();
        let value = ProcessInstanceRecord {
            bpmn_process_id: deployed.bpmn_process_id().to_owned(),
            version: deployed.version,
            process_definition_key: Some(deployed.key),
            process_instance_key: Some(key),
            element_id: deployed.process.process_element().id.clone(),
            flow_scope_key: None,
            bpmn_element_type: Some(BpmnElementType::Process),
            variables: command.variables.clone(),
        };
        ctx.output
            .append_follow_up_event(key, Intent::ElementActivating, value);
        ctx.output.accept(key);
        Ok(())
    }
}
