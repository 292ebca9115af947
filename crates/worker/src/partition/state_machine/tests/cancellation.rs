// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use googletest::prelude::*;
use test_log::test;

use tokenflow_types::process::ProcessBuilder;
use tokenflow_types::record::{Intent, RejectionType};

use super::*;

fn rejection_type(response: CommandResponse) -> Option<RejectionType> {
    match response {
        CommandResponse::Rejected(rejection) => Some(rejection.rejection_type),
        CommandResponse::Accepted { .. } => None,
    }
}

#[test(tokio::test)]
async fn cancel_terminates_active_children() {
    let mut env = TestEnv::new();
    env.deploy(
        ProcessBuilder::new("pair")
            .start_event("start")
            .parallel_gateway("split")
            .service_task("a")
            .service_task("b")
            .sequence_flow("f0", "start", "split")
            .sequence_flow("fa", "split", "a")
            .sequence_flow("fb", "split", "b"),
    );
    let process_key = env.create("pair").await;
    let a = env.task("a");
    let b = env.task("b");

    let response = env.execute(cancel(process_key)).await;
    assert_that!(response, eq(&CommandResponse::Accepted { key: process_key }));

    for task in [a, b] {
        assert_that!(env.instance(task), none());
        assert_that!(
            env.lifecycle_of(task),
            elements_are![
                eq(&Intent::ElementActivating),
                eq(&Intent::ElementActivated),
                eq(&Intent::ElementTerminating),
                eq(&Intent::ElementTerminated),
            ]
        );
    }
    assert_that!(env.instance(process_key), none());
    assert_that!(env.events(Intent::ElementTerminated, "pair"), len(eq(1)));
    assert_that!(env.events(Intent::ElementCompleted, "pair"), len(eq(0)));
}

#[test(tokio::test)]
async fn cancel_terminates_nested_scopes() {
    let mut env = TestEnv::new();
    env.deploy(
        ProcessBuilder::new("nested")
            .start_event("start")
            .sub_process("sub", |sub| {
                sub.start_event("sub-start")
                    .service_task("inner")
                    .sequence_flow("s1", "sub-start", "inner")
            })
            .end_event("end")
            .sequence_flow("f1", "start", "sub")
            .sequence_flow("f2", "sub", "end"),
    );
    let process_key = env.create("nested").await;
    let sub = env.task("sub");
    let inner = env.task("inner");

    env.execute(cancel(process_key)).await;

    assert_that!(env.instance(inner), none());
    assert_that!(env.instance(sub), none());
    assert_that!(env.instance(process_key), none());
    assert_that!(env.events(Intent::ElementTerminated, "sub"), len(eq(1)));
    assert_that!(env.events(Intent::EndEventOccurred, "end"), len(eq(0)));
}

#[test(tokio::test)]
async fn records_in_flight_are_dropped_when_scope_terminates() {
    let mut env = TestEnv::new();
    env.deploy(one_task());
    env.submit(create("one-task", Default::default()));
    // apply the create command and the process activation, the start event is still queued
    env.run_until(|record| record.intent == Intent::ElementActivated)
        .await;
    let process_key = env.log[1].key.unwrap();

    let response = env.execute(cancel(process_key)).await;
    assert_that!(response, eq(&CommandResponse::Accepted { key: process_key }));

    assert_that!(env.instance(process_key), none());
    // the start event was still applied, its taken flow was dropped with the terminating scope
    assert_that!(env.events(Intent::SequenceFlowTaken, "f1"), len(eq(1)));
    assert_that!(env.events(Intent::ElementActivating, "task"), len(eq(0)));
    assert_that!(env.events(Intent::ElementTerminated, "one-task"), len(eq(1)));
}

#[test(tokio::test)]
async fn completion_racing_with_cancel_does_not_continue() {
    let mut env = TestEnv::new();
    env.deploy(one_task());
    let process_key = env.create("one-task").await;
    let task = env.task("task");

    env.submit(complete(task, Default::default()));
    env.submit(cancel(process_key));
    let responses = env.run().await;
    assert_that!(responses, len(eq(2)));
    assert!(responses
        .iter()
        .all(|response| matches!(response, CommandResponse::Accepted { .. })));

    assert_that!(
        env.lifecycle_of(task),
        elements_are![
            eq(&Intent::ElementActivating),
            eq(&Intent::ElementActivated),
            eq(&Intent::ElementCompleting),
            eq(&Intent::ElementCompleted),
        ]
    );
    assert_that!(env.instance(process_key), none());
    assert_that!(env.events(Intent::SequenceFlowTaken, "f2"), len(eq(0)));
    assert_that!(env.events(Intent::EndEventOccurred, "end"), len(eq(0)));
    assert_that!(env.events(Intent::ElementTerminated, "one-task"), len(eq(1)));
}

#[test(tokio::test)]
async fn cancel_rejections() {
    let mut env = TestEnv::new();
    env.deploy(one_task());
    let process_key = env.create("one-task").await;
    let task = env.task("task");

    let response = env.execute(cancel(task)).await;
    assert_that!(rejection_type(response), some(eq(RejectionType::InvalidArgument)));

    env.submit(cancel(process_key));
    env.submit(cancel(process_key));
    let responses = env.run().await;
    assert_that!(responses, len(eq(2)));
    assert_that!(responses[0], eq(&CommandResponse::Accepted { key: process_key }));
    assert_that!(
        rejection_type(responses[1].clone()),
        some(eq(RejectionType::InvalidState))
    );

    let response = env.execute(cancel(process_key)).await;
    assert_that!(rejection_type(response), some(eq(RejectionType::NotFound)));

    let mut without_key = cancel(process_key);
    without_key.key = None;
    let response = env.execute(without_key).await;
    assert_that!(rejection_type(response), some(eq(RejectionType::InvalidArgument)));
}
