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

//! # StreamAdmin CLI
//!
//! Command-line front end for the stream administration orchestrator.
//!
//! Each invocation loads a cluster map (bucket to server list and partition
//! ownership) and an optional configuration file, runs one administrative
//! operation against the producer nodes and prints a JSON report to stdout.
//!
//! ## Key Commands
//!
//! - `streamadmin add-index`: start or augment a stream for new index instances
//! - `streamadmin delete-index`: remove index instances from a stream
//! - `streamadmin repair-endpoint`: ask producers to reconnect an endpoint
//! - `streamadmin restart`: restart partitions from given positions

pub mod commands;
