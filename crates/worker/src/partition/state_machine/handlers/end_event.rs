// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::partition::state_machine::context::BpmnStepContext;
use crate::partition::state_machine::registry::BpmnStepHandler;
use crate::partition::state_machine::Error;

/// Ends the arriving path. Its variables become part of the flow scope.
pub struct EndEventHandler;

impl BpmnStepHandler for EndEventHandler {
    fn handle(&self, ctx: &mut BpmnStepContext<'_>) -> Result<(), Error> {
        let mut scope = ctx.load_flow_scope()?;
        scope.value_mut().merge_variables(&ctx.value().variables);
        scope.consume_token()?;
        ctx.settle_scope(scope)
    }
}
