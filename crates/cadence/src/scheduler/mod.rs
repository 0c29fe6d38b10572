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

//! The external scheduler seam.
//!
//! [`SchedulerClient`] is the raw capability. Two implementations ship with
//! the crate: [`InMemoryScheduler`] and, with the `temporal-http` feature,
//! [`TemporalHttpClient`].

pub mod client;
pub mod handle;
pub mod memory;
pub mod spec;
#[cfg(feature = "temporal-http")]
pub mod temporal;
pub mod timing;

pub use client::{ScheduleDescription, SchedulerClient};
pub use handle::ScheduleHandle;
pub use memory::{CallCounts, InMemoryScheduler, SchedulerOp};
pub use spec::{
    CalendarSpec, IntervalSpec, OverlapPolicy, Schedule, ScheduleAction, ScheduleRange,
    ScheduleSpec,
};
#[cfg(feature = "temporal-http")]
pub use temporal::{TemporalHttpClient, TemporalHttpConfig};
