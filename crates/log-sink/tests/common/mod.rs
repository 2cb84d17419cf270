// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures: a scriptable upstream and ingress helpers

#[allow(dead_code)]
pub mod helpers;
#[allow(dead_code)]
pub mod mock_server;
