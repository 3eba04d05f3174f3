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

//! Filtered, paginated views over a group store.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::groups::MessageGroup;
use crate::message::CanonicalMessage;

/// Live feed filter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    /// Case-insensitive substring matched against text and identity fields.
    pub text: String,
    /// ACARS labels hidden from the feed.
    pub excluded_labels: BTreeSet<String>,
    pub only_alerts: bool,
}

impl FilterState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.text.is_empty() || !self.excluded_labels.is_empty() || self.only_alerts
    }

    #[must_use]
    pub fn matches(&self, message: &CanonicalMessage) -> bool {
        if let Some(label) = &message.label {
            if self.excluded_labels.contains(label) {
                return false;
            }
        }
        if self.only_alerts && !message.alert.matched {
            return false;
        }
        if self.text.is_empty() {
            return true;
        }

        let needle = self.text.to_uppercase();
        message.payload_text().to_uppercase().contains(&needle)
            || [
                message.identity.flight.as_deref(),
                message.identity.tail.as_deref(),
                message.identity.hex.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|value| value.contains(&needle))
    }
}

/// One group with the messages that pass the filter.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView<'a> {
    pub group: &'a MessageGroup,
    pub messages: Vec<&'a CanonicalMessage>,
}

/// A page of filtered groups, most recently updated first.
#[derive(Debug, Clone, Serialize)]
pub struct Page<'a> {
    pub groups: Vec<GroupView<'a>>,
    /// Zero-based page actually returned.
    pub page: usize,
    pub page_size: usize,
    pub total_groups: usize,
    pub total_pages: usize,
}

/// Filter `groups` and cut out one page.
///
/// Out-of-range page numbers are clamped to the last page.
pub fn paginate<'a, I>(groups: I, filters: &FilterState, page: usize, page_size: usize) -> Page<'a>
where
    I: IntoIterator<Item = &'a MessageGroup>,
{
    let page_size = page_size.max(1);
    let visible: Vec<GroupView<'a>> = groups
        .into_iter()
        .filter_map(|group| {
            let messages: Vec<&CanonicalMessage> =
                group.messages.iter().filter(|m| filters.matches(m)).collect();
            (!messages.is_empty()).then_some(GroupView { group, messages })
        })
        .collect();

    let total_groups = visible.len();
    let total_pages = total_groups.div_ceil(page_size).max(1);
    let page = page.min(total_pages - 1);

    Page {
        groups: visible.into_iter().skip(page * page_size).take(page_size).collect(),
        page,
        page_size,
        total_groups,
        total_pages,
    }
}
