use crate::types::{KeyReaction, LayerId, VKeyId};
use std::collections::HashMap;
use tracing::debug;

/// One full mapping from virtual keys to host reactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    pub name: String,
    reactions: HashMap<VKeyId, KeyReaction>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reactions: HashMap::new(),
        }
    }

    pub fn with(mut self, vkey: VKeyId, reaction: KeyReaction) -> Self {
        self.insert(vkey, reaction);
        self
    }

    pub fn insert(&mut self, vkey: VKeyId, reaction: KeyReaction) {
        self.reactions.insert(vkey, reaction);
    }

    pub fn get(&self, vkey: VKeyId) -> Option<&KeyReaction> {
        self.reactions.get(&vkey)
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}

/// Static layer set. Index 0 is the default layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerTable {
    layers: Vec<Layer>,
}

impl LayerTable {
    pub fn new(default: Layer) -> Self {
        Self {
            layers: vec![default],
        }
    }

    pub fn push(&mut self, layer: Layer) -> LayerId {
        self.layers.push(layer);
        LayerId(self.layers.len() - 1)
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<LayerId> {
        self.layers.iter().position(|l| l.name == name).map(LayerId)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Reaction of `vkey` on `layer`, falling through to the default layer
    /// when the cell is transparent.
    pub fn reaction(&self, vkey: VKeyId, layer: LayerId) -> Option<&KeyReaction> {
        self.get(layer)
            .and_then(|l| l.get(vkey))
            .or_else(|| self.layers.first().and_then(|l| l.get(vkey)))
    }
}

/// Which layer is active and which layer-shift key owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLayer {
    current: LayerId,
    owner: Option<VKeyId>,
}

impl Default for ActiveLayer {
    fn default() -> Self {
        Self {
            current: LayerId::DEFAULT,
            owner: None,
        }
    }
}

impl ActiveLayer {
    pub fn current(&self) -> LayerId {
        self.current
    }

    pub fn owner(&self) -> Option<VKeyId> {
        self.owner
    }

    pub fn shift(&mut self, layer: LayerId, owner: VKeyId) {
        debug!(?layer, %owner, "layer shift");
        self.current = layer;
        self.owner = Some(owner);
    }

    /// Returns to the default layer if `owner` still controls the active one.
    pub fn restore(&mut self, owner: VKeyId) -> bool {
        if self.owner != Some(owner) {
            debug!(%owner, "layer release ignored, key no longer owns the layer");
            return false;
        }
        debug!(%owner, "layer restored to default");
        *self = Self::default();
        true
    }
}
