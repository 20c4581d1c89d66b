//! Subscription set value.
//!
//! A [`SubscribeInput`] is rebuilt on every subscription change and never
//! mutated in place. It knows which identifiers the application asked for and
//! derives the wire-level lists, which also carry a presence-shadow name for
//! every entry with presence tracking enabled.

use crate::messages::PRESENCE_SUFFIX;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A channel or channel group, optionally with presence tracking.
///
/// Equality and hashing only consider the identifier.
#[derive(Clone, Debug)]
pub struct ChannelDescriptor {
    pub id: String,
    pub presence: bool,
}

impl ChannelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            presence: false,
        }
    }

    pub fn with_presence(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            presence: true,
        }
    }

    /// Presence-shadow identifier for this entry.
    pub fn presence_id(&self) -> String {
        format!("{}{}", self.id, PRESENCE_SUFFIX)
    }
}

impl PartialEq for ChannelDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChannelDescriptor {}

impl Hash for ChannelDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Requested channels and groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeInput {
    /// Identifier -> presence flag.
    channels: BTreeMap<String, bool>,
    groups: BTreeMap<String, bool>,
}

impl SubscribeInput {
    pub fn new(
        channels: impl IntoIterator<Item = ChannelDescriptor>,
        groups: impl IntoIterator<Item = ChannelDescriptor>,
    ) -> Self {
        Self::default().by_adding(channels, groups)
    }

    /// Input for plain channel names without presence.
    pub fn channels<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::new(names.into_iter().map(ChannelDescriptor::new), [])
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.groups.is_empty()
    }

    pub fn contains_channel(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    pub fn contains_group(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    /// Channel names the application asked for.
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Group names the application asked for.
    pub fn subscribed_groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Wire-level channel list including presence-shadow names.
    pub fn all_subscribed_channels(&self) -> Vec<String> {
        expand(&self.channels)
    }

    /// Wire-level group list including presence-shadow names.
    pub fn all_subscribed_groups(&self) -> Vec<String> {
        expand(&self.groups)
    }

    /// Set-union with the given descriptors.
    ///
    /// An identifier that is already present keeps its presence flag.
    pub fn by_adding(
        &self,
        channels: impl IntoIterator<Item = ChannelDescriptor>,
        groups: impl IntoIterator<Item = ChannelDescriptor>,
    ) -> Self {
        let mut next = self.clone();
        for descriptor in channels {
            next.channels.entry(descriptor.id).or_insert(descriptor.presence);
        }
        for descriptor in groups {
            next.groups.entry(descriptor.id).or_insert(descriptor.presence);
        }
        next
    }

    /// Set-difference by identifier.
    ///
    /// With `presence_only`, matching entries stay subscribed and only lose
    /// presence tracking.
    pub fn by_removing<S: AsRef<str>>(
        &self,
        channel_ids: &[S],
        group_ids: &[S],
        presence_only: bool,
    ) -> Self {
        let mut next = self.clone();
        remove_ids(&mut next.channels, channel_ids, presence_only);
        remove_ids(&mut next.groups, group_ids, presence_only);
        next
    }
}

fn expand(entries: &BTreeMap<String, bool>) -> Vec<String> {
    let mut all = Vec::with_capacity(entries.len() * 2);
    for (id, presence) in entries {
        all.push(id.clone());
        if *presence {
            all.push(format!("{id}{PRESENCE_SUFFIX}"));
        }
    }
    all
}

fn remove_ids<S: AsRef<str>>(entries: &mut BTreeMap<String, bool>, ids: &[S], presence_only: bool) {
    for id in ids {
        let id = id.as_ref();
        if presence_only {
            if let Some(presence) = entries.get_mut(id) {
                *presence = false;
            }
        } else {
            entries.remove(id);
        }
    }
}
