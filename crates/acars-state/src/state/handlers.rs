// Copyright 2025 Chris Custine
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

//! Routing of inbound events to container entry points.

use serde::de::DeserializeOwned;

use super::StateContainer;
use crate::protocol::decode;
use crate::protocol::events::{self, names};
use crate::stream::EventStreamClient;

/// Register `apply` for `event`, narrowing the payload to `T` first.
fn route<T, F>(client: &mut EventStreamClient<StateContainer>, event: &'static str, mut apply: F)
where
    T: DeserializeOwned,
    F: FnMut(&mut StateContainer, T) + Send + 'static,
{
    client.subscribe(event, move |state, data| {
        let payload: T = decode(event, data)?;
        apply(state, payload);
        Ok(())
    });
}

/// Wire every inbound event to its [`StateContainer`] entry point.
pub fn register_handlers(client: &mut EventStreamClient<StateContainer>) {
    client.subscribe(names::CONNECT, |state, _| {
        state.on_connect();
        Ok(())
    });
    route(client, names::DISCONNECT, |state, d: events::Disconnect| {
        state.on_disconnect(&d.reason);
    });
    route(client, names::RECONNECT, |state, r: events::Reconnect| {
        state.on_reconnect(r.attempt);
    });

    route(client, names::MESSAGE, StateContainer::on_message);
    route(client, names::MESSAGE_BATCH, StateContainer::on_message_batch);
    route(client, names::ALERT_MESSAGE, StateContainer::on_alert_message);
    route(client, names::ALERT_MESSAGE_BATCH, StateContainer::on_alert_message_batch);

    route(client, names::LABELS_CONFIG, StateContainer::on_labels);
    route(client, names::ALERT_TERMS_CONFIG, StateContainer::on_alert_terms);
    route(client, names::DECODER_FEATURES, StateContainer::on_decoder_features);
    route(client, names::SYSTEM_STATUS, StateContainer::on_system_status);
    route(client, names::VERSION_INFO, StateContainer::on_version_info);
    route(client, names::STORAGE_SIZE, StateContainer::on_storage_size);
    route(client, names::AIRCRAFT_STATUS, StateContainer::on_aircraft_status);
    route(client, names::AIRCRAFT_SNAPSHOT, StateContainer::on_aircraft_snapshot);

    route(client, names::SIGNAL_LEVELS, StateContainer::on_signal_levels);
    route(client, names::ALERT_TERM_COUNTS, StateContainer::on_alert_term_counts);
    route(client, names::STATION_IDS, StateContainer::on_station_ids);
    route(client, names::FREQUENCY_DISTRIBUTION, StateContainer::on_frequency_distribution);
    route(client, names::MESSAGE_TYPE_COUNTS, StateContainer::on_message_type_counts);
    route(client, names::TIME_SERIES_PUSH, StateContainer::on_time_series);
}
