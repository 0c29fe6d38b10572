/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Integration tests for the cadence reconciler.
//!
//! Everything except the `postgres` module runs in-process against
//! [`cadence::MemoryStore`] and [`cadence::InMemoryScheduler`]. The
//! `postgres` tests need `CADENCE_TEST_DATABASE_URL` and skip otherwise.

mod fixtures;
mod lifecycle;
mod postgres;
mod queue;
mod rollover;
mod sweep;
#[cfg(feature = "temporal-http")]
mod temporal_http;
