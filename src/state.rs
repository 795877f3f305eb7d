use crate::protocol::{decode_line, split_lines, Event};
use crate::subscription::StateUpdate;
use crate::types::{
    GroupId, GroupOptions, Power, SourceIndex, StateSnapshot, ZoneId, ZoneSnapshot,
    DEFAULT_MAX_VOLUME,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Size of the local group slot space
pub const MAX_GROUPS: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ZoneState {
    power: Option<Power>,
    volume: Option<u8>,
    source: Option<SourceIndex>,
    max_volume: u8,
    name: Option<String>,
    source_names: BTreeMap<SourceIndex, String>,
    group: Option<GroupId>,
}

impl Default for ZoneState {
    fn default() -> Self {
        Self {
            power: None,
            volume: None,
            source: None,
            max_volume: DEFAULT_MAX_VOLUME,
            name: None,
            source_names: BTreeMap::new(),
            group: None,
        }
    }
}

impl ZoneState {
    fn power_slot(&mut self) -> &mut Option<Power> {
        &mut self.power
    }

    fn volume_slot(&mut self) -> &mut Option<u8> {
        &mut self.volume
    }

    fn source_slot(&mut self) -> &mut Option<SourceIndex> {
        &mut self.source
    }

    fn snapshot(&self, zone: ZoneId) -> ZoneSnapshot {
        ZoneSnapshot {
            zone,
            power: self.power,
            volume: self.volume,
            source: self.source,
            max_volume: self.max_volume,
            name: self.name.clone(),
            source_names: self.source_names.clone(),
            group: self.group,
        }
    }
}

/// Store `value` into `slot`, reporting whether it differed
fn set_field<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Canonical amplifier state
///
/// Mutated only through [`AmpState::apply`]; every call reports whether a
/// tracked value actually changed.
#[derive(Debug, Clone)]
pub struct AmpState {
    configured: Vec<ZoneId>,
    zones: BTreeMap<ZoneId, ZoneState>,
    groups: [Option<GroupOptions>; MAX_GROUPS],
}

impl AmpState {
    pub fn new(zones: &[ZoneId]) -> Self {
        Self {
            configured: zones.to_vec(),
            zones: zones.iter().map(|z| (*z, ZoneState::default())).collect(),
            groups: [None; MAX_GROUPS],
        }
    }

    pub fn configured_zones(&self) -> &[ZoneId] {
        &self.configured
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            zones: self
                .zones
                .iter()
                .map(|(zone, state)| (*zone, state.snapshot(*zone)))
                .collect(),
        }
    }

    pub fn zone(&self, zone: ZoneId) -> Option<ZoneSnapshot> {
        self.zones.get(&zone).map(|state| state.snapshot(zone))
    }

    /// Options recorded for a group slot
    pub fn group_options(&self, group: GroupId) -> Option<GroupOptions> {
        self.groups.get(group as usize).copied().flatten()
    }

    /// Zones currently pointing at `group`
    pub fn group_members(&self, group: GroupId) -> Vec<ZoneId> {
        self.zones
            .iter()
            .filter(|(_, state)| state.group == Some(group))
            .map(|(zone, _)| *zone)
            .collect()
    }

    /// Configured zones that have not reported a name yet
    pub fn zones_missing_names(&self) -> Vec<ZoneId> {
        self.configured
            .iter()
            .copied()
            .filter(|z| self.zones.get(z).map_or(true, |s| s.name.is_none()))
            .collect()
    }

    /// Apply one decoded event; returns `true` if anything observable changed
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Power { zone, power } => {
                let linked = self.link_options(*zone).is_some_and(GroupOptions::power_linked);
                self.set_linked(*zone, linked, *power, ZoneState::power_slot)
            }
            Event::Source {
                zone,
                source,
                powered_on,
            } => {
                let mut changed = false;
                if *powered_on {
                    changed |= set_field(&mut self.zone_mut(*zone).power, Some(Power::On));
                }
                let linked = self.link_options(*zone).is_some_and(GroupOptions::source_linked);
                changed | self.set_linked(*zone, linked, *source, ZoneState::source_slot)
            }
            Event::Volume { zone, volume } => {
                let linked = self.link_options(*zone).is_some_and(GroupOptions::volume_linked);
                self.set_linked(*zone, linked, *volume, ZoneState::volume_slot)
            }
            Event::MaxVolume { zone, max_volume } => {
                set_field(&mut self.zone_mut(*zone).max_volume, *max_volume)
            }
            Event::ZoneName { zone, name } => {
                let changed = set_field(&mut self.zone_mut(*zone).name, Some(name.clone()));
                if changed {
                    tracing::debug!("Zone {} name is now {:?}", zone, name);
                }
                changed
            }
            Event::SourceName { zone, source, name } => {
                let targets = match zone {
                    Some(zone) => vec![*zone],
                    None => self.configured.clone(),
                };
                let mut changed = false;
                for target in targets {
                    let names = &mut self.zone_mut(target).source_names;
                    if names.get(source) != Some(name) {
                        names.insert(*source, name.clone());
                        changed = true;
                    }
                }
                changed
            }
            Event::PresetName { preset, name } => {
                // not part of the published model
                tracing::debug!("Preset {} is named {:?}", preset, name);
                false
            }
            Event::GroupLink { options, zones } => self.regroup(*options, zones),
            Event::Noop => false,
        }
    }

    fn zone_mut(&mut self, zone: ZoneId) -> &mut ZoneState {
        self.zones.entry(zone).or_default()
    }

    fn link_options(&self, zone: ZoneId) -> Option<GroupOptions> {
        let group = self.zones.get(&zone)?.group?;
        self.group_options(group)
    }

    fn peers(&self, zone: ZoneId) -> Vec<ZoneId> {
        match self.zones.get(&zone).and_then(|s| s.group) {
            Some(group) => self
                .group_members(group)
                .into_iter()
                .filter(|z| *z != zone)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Set a field on `zone` and, when linked, on its direct group peers
    fn set_linked<T: PartialEq + Copy>(
        &mut self,
        zone: ZoneId,
        linked: bool,
        value: T,
        slot: fn(&mut ZoneState) -> &mut Option<T>,
    ) -> bool {
        let mut changed = set_field(slot(self.zone_mut(zone)), Some(value));
        if linked {
            for peer in self.peers(zone) {
                changed |= set_field(slot(self.zone_mut(peer)), Some(value));
            }
        }
        changed
    }

    fn regroup(&mut self, options: GroupOptions, listed: &[ZoneId]) -> bool {
        let mut zones: Vec<ZoneId> = Vec::with_capacity(listed.len());
        for zone in listed {
            if !zones.contains(zone) {
                zones.push(*zone);
            }
        }

        let before: Vec<Option<GroupId>> = zones
            .iter()
            .map(|z| self.zones.get(z).and_then(|s| s.group))
            .collect();

        for zone in &zones {
            if let Some(state) = self.zones.get_mut(zone) {
                state.group = None;
            }
        }

        let mut options_changed = false;
        if zones.len() > 1 {
            let used: BTreeSet<GroupId> = self.zones.values().filter_map(|s| s.group).collect();
            match (0..MAX_GROUPS as GroupId).find(|g| !used.contains(g)) {
                Some(slot) => {
                    options_changed = set_field(&mut self.groups[slot as usize], Some(options));
                    for zone in &zones {
                        self.zone_mut(*zone).group = Some(slot);
                    }
                    tracing::debug!(
                        "Group {} formed from zones {:?} (options {:#04x})",
                        slot,
                        zones,
                        options.bits()
                    );
                }
                None => tracing::warn!("No free group slot for zones {:?}", zones),
            }
        }

        let membership_changed = zones
            .iter()
            .zip(before)
            .any(|(z, prev)| self.zones.get(z).and_then(|s| s.group) != prev);

        membership_changed || options_changed
    }
}

/// Shared state plus the update channel consumers subscribe to
///
/// All lines are reduced under one lock, so no two frames are ever applied
/// concurrently.
pub(crate) struct StateStore {
    state: Mutex<AmpState>,
    updates: broadcast::Sender<StateUpdate>,
}

impl StateStore {
    pub(crate) fn new(zones: &[ZoneId]) -> Self {
        let (updates, _) = broadcast::channel(100);
        Self {
            state: Mutex::new(AmpState::new(zones)),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AmpState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }

    pub(crate) fn notify(&self, update: StateUpdate) {
        let _ = self.updates.send(update);
    }

    pub(crate) fn snapshot(&self) -> StateSnapshot {
        self.lock().snapshot()
    }

    pub(crate) fn zone(&self, zone: ZoneId) -> Option<ZoneSnapshot> {
        self.lock().zone(zone)
    }

    pub(crate) fn configured_zones(&self) -> Vec<ZoneId> {
        self.lock().configured_zones().to_vec()
    }

    pub(crate) fn zones_missing_names(&self) -> Vec<ZoneId> {
        self.lock().zones_missing_names()
    }

    /// Apply an event and publish a snapshot if it changed anything
    pub(crate) fn apply(&self, event: &Event) -> bool {
        let snapshot = {
            let mut state = self.lock();
            if !state.apply(event) {
                return false;
            }
            state.snapshot()
        };
        self.notify(StateUpdate::Snapshot(Box::new(snapshot)));
        true
    }

    /// Decode and apply one received line
    pub(crate) fn ingest_line(&self, line: &str, origin: &str) -> bool {
        tracing::debug!("RX ({}): {}", origin, line);
        match decode_line(line) {
            Some(frame) => self.apply(&frame.event),
            None => {
                tracing::debug!("Ignoring malformed frame: {:?}", line);
                false
            }
        }
    }

    /// Apply every line of a response body; returns `true` if any changed state
    pub(crate) fn ingest_text(&self, text: &str, origin: &str) -> bool {
        split_lines(text).fold(false, |changed, line| self.ingest_line(line, origin) | changed)
    }
}
