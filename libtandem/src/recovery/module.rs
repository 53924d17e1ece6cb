// Copyright 2023 Bitwise IO, Inc.
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

/// One kind of recovery work, run by the scanner in two passes.
///
/// The first pass only collects candidates. The scanner then waits out its backoff period before
/// the second pass, giving actions which were mid-protocol during the first pass time to finish,
/// so the second pass re-checks every candidate before acting on it.
pub trait RecoveryModule: Send {
    fn name(&self) -> &str;

    fn first_pass(&mut self);

    fn second_pass(&mut self);
}
