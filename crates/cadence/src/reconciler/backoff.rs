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

//! Retry delays for failed queue rows.

use std::time::Duration;

/// Delay before a row that failed on its `attempts`-th claim is retried.
///
/// `min(cap, 2^(attempts - 1))` seconds. Attempt counts below one are
/// treated as one.
pub fn backoff_delay(attempts: i32, cap: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).max(0) as u32;
    let secs = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(cap)
}
