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
use serde_json::json;
use test_log::test;

use tokenflow_types::record::{Intent, ProcessInstanceRecord, Record, RejectionType};

use super::*;

fn rejection(response: CommandResponse) -> (RejectionType, String) {
    match response {
        CommandResponse::Rejected(rejection) => (rejection.rejection_type, rejection.reason),
        CommandResponse::Accepted { key } => panic!("expected a rejection, but {key} was accepted"),
    }
}

#[test(tokio::test)]
async fn create_resolves_versions() {
    let mut env = TestEnv::new();
    env.deploy(one_task());
    let latest = env.processes.deploy(one_task().build().unwrap());

    let key = env.create("one-task").await;
    let activating = env.events(Intent::ElementActivating, "one-task")[0]
        .value
        .clone();
    assert_that!(activating.version, eq(2));
    assert_that!(activating.process_definition_key, some(eq(latest.key)));
    assert_that!(activating.process_instance_key, some(eq(key)));

    let mut by_version = create("one-task", Default::default());
    by_version.value.version = 1;
    let CommandResponse::Accepted { key: first_version } = env.execute(by_version).await else {
        panic!("create by version was rejected");
    };
    assert_that!(
        env.instance(first_version).map(|i| i.value().version),
        some(eq(1))
    );

    let by_key = Record::command(
        None,
        Intent::Create,
        ProcessInstanceRecord {
            process_definition_key: Some(latest.key),
            variables: variables(&[("order", json!(7))]),
            ..Default::default()
        },
    );
    let CommandResponse::Accepted { key: by_key } = env.execute(by_key).await else {
        panic!("create by key was rejected");
    };
    let instance = env.instance(by_key).unwrap();
    assert_that!(instance.value().bpmn_process_id.as_str(), eq("one-task"));
    assert_that!(instance.value().variables.get("order"), some(eq(&json!(7))));
}

#[test(tokio::test)]
async fn create_rejections() {
    let mut env = TestEnv::new();
    env.deploy(one_task());

    let (rejection_type, reason) = rejection(env.execute(create("unknown", Default::default())).await);
    assert_that!(rejection_type, eq(RejectionType::NotFound));
    assert_that!(reason, contains_substring("unknown"));

    let (rejection_type, _) = rejection(env.execute(create("", Default::default())).await);
    assert_that!(rejection_type, eq(RejectionType::InvalidArgument));

    let mut unknown_version = create("one-task", Default::default());
    unknown_version.value.version = 3;
    let (rejection_type, _) = rejection(env.execute(unknown_version).await);
    assert_that!(rejection_type, eq(RejectionType::NotFound));
}

#[test(tokio::test)]
async fn rejection_keeps_request_correlation() {
    let mut env = TestEnv::new();
    env.submit(create("unknown", Default::default()).with_request_id(17));
    env.run().await;

    let rejection = env.log.iter().find(|record| record.is_rejection()).unwrap();
    assert_that!(rejection.request_id, some(eq(17)));
    assert_that!(rejection.intent, eq(Intent::Create));
    assert_that!(rejection.source_position, some(eq(env.log[0].position)));
    assert!(rejection.rejection.is_some());
}

#[test(tokio::test)]
async fn complete_rejections() {
    let mut env = TestEnv::new();
    env.deploy(one_task());
    let process_key = env.create("one-task").await;
    let task = env.task("task");

    let (rejection_type, _) = rejection(env.execute(complete(process_key, Default::default())).await);
    assert_that!(rejection_type, eq(RejectionType::InvalidArgument));

    let unknown = tokenflow_types::identifiers::Key::from_raw(process_key.as_i64() + 1000);
    let (rejection_type, _) = rejection(env.execute(complete(unknown, Default::default())).await);
    assert_that!(rejection_type, eq(RejectionType::NotFound));

    env.submit(complete(task, Default::default()));
    env.submit(complete(task, Default::default()));
    let responses = env.run().await;
    assert_that!(responses, len(eq(2)));
    assert_that!(responses[0], eq(&CommandResponse::Accepted { key: task }));
    let (rejection_type, reason) = rejection(responses[1].clone());
    assert_that!(rejection_type, eq(RejectionType::InvalidState));
    assert_that!(reason, contains_substring("COMPLETING"));
}

#[test(tokio::test)]
async fn events_submitted_as_commands_are_rejected() {
    let mut env = TestEnv::new();
    let mut record = create("one-task", Default::default());
    record.intent = Intent::ElementActivating;

    let (rejection_type, _) = rejection(env.execute(record).await);
    assert_that!(rejection_type, eq(RejectionType::InvalidArgument));
}
