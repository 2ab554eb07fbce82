//! JSON keymap description and its validation into runtime tables.
//!
//! ```json
//! {
//!   "profile": { "tap_hold_term_ms": 180 },
//!   "groups": [
//!     { "id": 0, "keys": { "1": [1], "2": [2], "3": [1, 2] } },
//!     { "id": 1, "side": "secondary", "keys": { "4": [10] } }
//!   ],
//!   "vkey_order": [1, 2, 3, 4],
//!   "layers": [
//!     { "name": "base", "cells": ["A", "B", "ESC", "SPACE"] },
//!     { "name": "num",  "cells": ["1", "2", "_", ""] }
//!   ],
//!   "tap_hold": { "1": { "modifier": "LCTRL" }, "4": { "layer": "num" } }
//! }
//! ```

use crate::config::Profile;
use crate::engine::Engine;
use crate::error::{KeymapError, KeymapResult};
use crate::key_group::KeyGroup;
use crate::keyboard::VirtualKeyboard;
use crate::keycodes::key_name_to_code;
use crate::layer::{Layer, LayerTable};
use crate::link::SerialLink;
use crate::split::{PrimaryHalf, SecondaryHalf};
use crate::types::{KeyCode, KeyReaction, PKeyId, VKeyId, VirtualKeyRole};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Which half scans a key group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Deserialize)]
struct GroupDesc {
    id: usize,
    #[serde(default)]
    side: Side,
    keys: BTreeMap<String, Vec<u16>>,
}

#[derive(Debug, Deserialize)]
struct LayerDesc {
    name: String,
    cells: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TapHoldDesc {
    modifier: Option<String>,
    layer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeymapDesc {
    #[serde(default)]
    profile: Profile,
    groups: Vec<GroupDesc>,
    vkey_order: Vec<u16>,
    layers: Vec<LayerDesc>,
    #[serde(default)]
    tap_hold: BTreeMap<String, TapHoldDesc>,
}

/// Validated keymap. Cheap to turn into keyboards and engines.
#[derive(Debug, Clone)]
pub struct Keymap {
    profile: Profile,
    groups: Vec<(Side, KeyGroup)>,
    layers: LayerTable,
    roles: BTreeMap<VKeyId, VirtualKeyRole>,
}

impl Keymap {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn layers(&self) -> &LayerTable {
        &self.layers
    }

    pub fn role(&self, vkey: VKeyId) -> Option<VirtualKeyRole> {
        self.roles.get(&vkey).copied()
    }

    pub fn roles(&self) -> impl Iterator<Item = (VKeyId, VirtualKeyRole)> + '_ {
        self.roles.iter().map(|(v, r)| (*v, *r))
    }

    pub fn build_keyboard(&self, side: Side) -> VirtualKeyboard {
        VirtualKeyboard::new(
            self.groups
                .iter()
                .filter(|(s, _)| *s == side)
                .map(|(_, g)| g.clone())
                .collect(),
        )
    }

    pub fn build_engine(&self) -> Engine {
        Engine::new(&self.profile, self.layers.clone(), self.roles())
    }

    pub fn primary<L: SerialLink>(&self, link: L) -> PrimaryHalf<L> {
        PrimaryHalf::new(
            &self.profile,
            self.build_keyboard(Side::Primary),
            self.build_engine(),
            link,
        )
    }

    pub fn secondary<L: SerialLink>(&self, link: L) -> SecondaryHalf<L> {
        SecondaryHalf::new(&self.profile, self.build_keyboard(Side::Secondary), link)
    }
}

pub fn load_keymap<P: AsRef<Path>>(path: P) -> Result<Keymap> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read keymap {}", path.display()))?;
    let keymap = parse_keymap_content(&text)
        .with_context(|| format!("invalid keymap {}", path.display()))?;
    info!(
        path = %path.display(),
        vkeys = keymap.roles.len(),
        layers = keymap.layers.len(),
        "keymap loaded"
    );
    Ok(keymap)
}

pub fn parse_keymap_content(content: &str) -> KeymapResult<Keymap> {
    let desc: KeymapDesc = serde_json::from_str(content)?;
    build(desc)
}

fn build(desc: KeymapDesc) -> KeymapResult<Keymap> {
    let profile = desc.profile;

    let mut groups = Vec::with_capacity(desc.groups.len());
    let mut roles = BTreeMap::new();
    let mut owner_of: HashMap<PKeyId, usize> = HashMap::new();
    let mut group_ids = HashSet::new();

    for g in &desc.groups {
        if !group_ids.insert(g.id) {
            return Err(KeymapError::DuplicateGroup(g.id));
        }
        let mut chords = Vec::with_capacity(g.keys.len());
        for (label, pkeys) in &g.keys {
            let vkey = parse_vkey(label)?;
            if roles.insert(vkey, VirtualKeyRole::Simple).is_some() {
                return Err(KeymapError::DuplicateVKey(vkey.0));
            }
            let pkeys: Vec<PKeyId> = pkeys.iter().map(|p| PKeyId(*p)).collect();
            for p in &pkeys {
                match owner_of.get(p) {
                    Some(first) if *first != g.id => {
                        return Err(KeymapError::SharedPhysicalKey {
                            pkey: p.0,
                            first: *first,
                            second: g.id,
                        });
                    }
                    _ => {
                        owner_of.insert(*p, g.id);
                    }
                }
            }
            chords.push((vkey, pkeys));
        }
        let group = KeyGroup::new(g.id, &profile, chords)?;
        debug!(group = g.id, side = ?g.side, vkeys = g.keys.len(), "key group built");
        groups.push((g.side, group));
    }

    let mut order = Vec::with_capacity(desc.vkey_order.len());
    for serial in &desc.vkey_order {
        if *serial == 0 {
            order.push(None);
            continue;
        }
        let vkey = to_vkey(*serial)?;
        if !roles.contains_key(&vkey) {
            return Err(KeymapError::UnmappedVKey(vkey.0));
        }
        order.push(Some(vkey));
    }

    let mut built = Vec::with_capacity(desc.layers.len());
    for l in &desc.layers {
        if l.cells.len() != order.len() {
            return Err(KeymapError::GridMismatch {
                layer: l.name.clone(),
                cells: l.cells.len(),
                expected: order.len(),
            });
        }
        let mut layer = Layer::new(l.name.clone());
        for (cell, vkey) in l.cells.iter().zip(&order) {
            let Some(vkey) = vkey else {
                continue;
            };
            if let Some(reaction) = parse_reaction(cell)? {
                layer.insert(*vkey, reaction);
            }
        }
        built.push(layer);
    }
    let mut built = built.into_iter();
    let mut layers = LayerTable::new(built.next().ok_or(KeymapError::NoLayers)?);
    for layer in built {
        layers.push(layer);
    }

    for (label, th) in &desc.tap_hold {
        let vkey = parse_vkey(label)?;
        let Some(role) = roles.get_mut(&vkey) else {
            return Err(KeymapError::UnmappedVKey(vkey.0));
        };
        *role = match (&th.modifier, &th.layer) {
            (Some(name), None) => VirtualKeyRole::ModTap(parse_key_name(name)?),
            (None, Some(name)) => VirtualKeyRole::LayerTap(
                layers
                    .by_name(name)
                    .ok_or_else(|| KeymapError::UnknownLayer(name.clone()))?,
            ),
            _ => return Err(KeymapError::InvalidTapHold(vkey.0)),
        };
    }

    Ok(Keymap {
        profile,
        groups,
        layers,
        roles,
    })
}

fn parse_vkey(label: &str) -> KeymapResult<VKeyId> {
    let serial: u16 = label
        .trim()
        .parse()
        .map_err(|_| KeymapError::BadVKeyLabel(label.to_string()))?;
    to_vkey(serial)
}

fn to_vkey(serial: u16) -> KeymapResult<VKeyId> {
    u8::try_from(serial)
        .ok()
        .map(VKeyId)
        .filter(|v| v.is_valid())
        .ok_or(KeymapError::InvalidVKey(serial))
}

fn parse_key_name(name: &str) -> KeymapResult<KeyCode> {
    key_name_to_code(name.trim()).ok_or_else(|| KeymapError::UnknownKeyName(name.to_string()))
}

/// `""` and `"_"` are transparent; `"LSHIFT+1"` is a chord.
fn parse_reaction(cell: &str) -> KeymapResult<Option<KeyReaction>> {
    let cell = cell.trim();
    if cell.is_empty() || cell == "_" {
        return Ok(None);
    }
    let codes = cell
        .split('+')
        .map(parse_key_name)
        .collect::<KeymapResult<Vec<_>>>()?;
    Ok(Some(KeyReaction::chord(&codes)))
}
