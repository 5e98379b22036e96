// SPDX-License-Identifier: Apache-2.0

use opentelemetry::global;
use opentelemetry::metrics::Meter;

/// Meter for all pipeline counters. Recording is a no-op until a meter
/// provider is installed globally.
pub fn get_meter() -> Meter {
    global::meter("tailrelay")
}
