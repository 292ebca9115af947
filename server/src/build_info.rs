// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Build information

/// The version of the tokenflow server.
pub const TOKENFLOW_SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const TOKENFLOW_SERVER_NAME: &str = env!("CARGO_PKG_NAME");

pub fn build_info() -> String {
    format!(
        "{TOKENFLOW_SERVER_NAME} {TOKENFLOW_SERVER_VERSION} ({})",
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
    )
}
