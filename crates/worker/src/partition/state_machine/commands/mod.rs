// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Handlers of client commands. A command is either rejected or turned into the first event of
//! the requested change.

mod cancel_process_instance;
mod complete_element;
mod create_process_instance;

use tracing::debug;

use tokenflow_types::record::{Intent, Record, RejectionType};

use super::event_output::EventOutput;
use super::{Error, StepStorage};
use crate::process_repository::ProcessRepository;

pub struct CommandContext<'a> {
    pub record: &'a Record,
    pub processes: &'a ProcessRepository,
    pub storage: &'a mut dyn StepStorage,
    pub output: &'a mut EventOutput,
}

impl CommandContext<'_> {
    pub fn reject(&mut self, rejection_type: RejectionType, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(
            intent = %self.record.intent,
            %rejection_type,
            %reason,
            "Rejecting command"
        );
        self.output
            .append_rejection(self.record, rejection_type, reason);
    }
}

pub trait CommandHandler {
    fn handle(&self, ctx: &mut CommandContext<'_>) -> Result<(), Error>;
}

pub fn apply(ctx: &mut CommandContext<'_>) -> Result<(), Error> {
    match ctx.record.intent {
        Intent::Create => create_process_instance::CreateProcessInstance.handle(ctx),
        Intent::Cancel => cancel_process_instance::CancelProcessInstance.handle(ctx),
        Intent::CompleteElement => complete_element::CompleteElement.handle(ctx),
        intent => {
            ctx.reject(
                RejectionType::InvalidArgument,
                format!("{intent} is not a command"),
            );
            Ok(())
        }
    }
}
