// Copyright 2025 StreamAdmin Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics for one orchestrator operation (add_index, restart, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub call_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Fan-out rounds started, including the first one of every call
    pub rounds: u64,
    /// Rounds abandoned and reissued
    pub round_retries: u64,
    /// Round retries keyed by the error kind that caused them
    pub retries_by_kind: BTreeMap<String, u64>,
    pub avg_latency_us: u64,
    pub p50_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,
}

/// Admin requests issued to one producer node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node_addr: String,
    pub request_count: u64,
    pub failure_count: u64,
    pub last_request_ms: u64,
}

impl NodeMetrics {
    pub fn new(node_addr: String) -> Self {
        Self {
            node_addr,
            request_count: 0,
            failure_count: 0,
            last_request_ms: 0,
        }
    }
}

/// Complete metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_ms: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Partitions found active on more than one producer after a round
    pub split_ownership_detections: u64,
    pub operations: BTreeMap<String, OperationMetrics>,
    pub nodes: BTreeMap<String, NodeMetrics>,
}
