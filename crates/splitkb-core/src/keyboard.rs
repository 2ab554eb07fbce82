use crate::key_group::KeyGroup;
use crate::physical::{KeySampler, PhysicalKeys};
use crate::types::{VKeyId, VKeyPressEvent};
use std::cmp::Reverse;
use std::time::Instant;

/// Switches and key groups scanned by one half of the keyboard.
#[derive(Debug, Clone)]
pub struct VirtualKeyboard {
    physical: PhysicalKeys,
    groups: Vec<KeyGroup>,
}

impl VirtualKeyboard {
    /// Groups holding bigger chords are updated first.
    pub fn new(mut groups: Vec<KeyGroup>) -> Self {
        groups.sort_by_key(|g| (Reverse(g.max_chord_len()), g.id));
        let physical = PhysicalKeys::new(
            groups
                .iter()
                .flat_map(|g| g.universe().iter().copied())
                .collect::<Vec<_>>(),
        );
        Self { physical, groups }
    }

    pub fn physical(&self) -> &PhysicalKeys {
        &self.physical
    }

    pub fn groups(&self) -> &[KeyGroup] {
        &self.groups
    }

    pub fn vkeys(&self) -> impl Iterator<Item = VKeyId> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.virtual_keys().map(|v| v.id))
    }

    /// Samples every switch and resolves the groups. Events come out in
    /// group order, each group's events in the order it produced them.
    pub fn scan<S: KeySampler + ?Sized>(
        &mut self,
        now: Instant,
        sampler: &mut S,
    ) -> Vec<VKeyPressEvent> {
        let pressed = self.physical.refresh(now, sampler);
        let mut events = Vec::new();
        for group in self.groups.iter_mut() {
            events.extend(group.update(now, &pressed));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::physical::SharedSampler;
    use crate::types::PKeyId;
    use std::time::Duration;

    fn keyboard() -> VirtualKeyboard {
        let profile = Profile::default();
        let singles = KeyGroup::new(0, &profile, vec![(VKeyId(1), vec![PKeyId(1)])]).unwrap();
        let combos = KeyGroup::new(
            1,
            &profile,
            vec![
                (VKeyId(2), vec![PKeyId(2)]),
                (VKeyId(3), vec![PKeyId(3)]),
                (VKeyId(4), vec![PKeyId(2), PKeyId(3)]),
            ],
        )
        .unwrap();
        VirtualKeyboard::new(vec![singles, combos])
    }

    #[test]
    fn test_chord_groups_scanned_first() {
        let kb = keyboard();
        let ids: Vec<usize> = kb.groups().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 0]);
        assert_eq!(kb.physical().len(), 3);
    }

    #[test]
    fn test_scan_merges_group_events() {
        let mut kb = keyboard();
        let mut sampler = SharedSampler::new();
        let t0 = Instant::now();

        sampler.press(PKeyId(1));
        sampler.press(PKeyId(2));
        sampler.press(PKeyId(3));
        let events = kb.scan(t0, &mut sampler);
        let got: Vec<(u8, bool)> = events.iter().map(|e| (e.vkey.0, e.pressed)).collect();
        assert_eq!(got, vec![(4, true), (1, true)]);

        sampler.release(PKeyId(2));
        sampler.release(PKeyId(3));
        let events = kb.scan(t0 + Duration::from_millis(30), &mut sampler);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].vkey, VKeyId(4));
        assert!(!events[0].pressed);
    }
}
