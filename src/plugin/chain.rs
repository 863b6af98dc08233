//! Ordered plugin chain of a render node

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::buffer::AudioBuffer;
use crate::error::PluginError;
use crate::midi::NoteEvent;
use crate::node::PluginId;
use crate::plugin::Plugin;
use crate::transport::TransportContext;

struct Slot {
    id: PluginId,
    plugin: Box<dyn Plugin>,
    bypassed: bool,
}

/// Plugins applied in order to a node's signal.
///
/// The slot list is reserved at creation; inserting into a full chain hands
/// the plugin back instead of growing.
pub struct PluginChain {
    slots: Vec<Slot>,
}

impl PluginChain {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.slots.iter().map(|s| s.id)
    }

    pub fn contains(&self, id: PluginId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: PluginId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    pub fn plugin(&self, id: PluginId) -> Option<&dyn Plugin> {
        self.slots.iter().find(|s| s.id == id).map(|s| s.plugin.as_ref())
    }

    pub fn is_bypassed(&self, id: PluginId) -> Option<bool> {
        self.slots.iter().find(|s| s.id == id).map(|s| s.bypassed)
    }

    /// Insert at `index` (clamped to the end).
    pub fn add(
        &mut self,
        id: PluginId,
        plugin: Box<dyn Plugin>,
        index: usize,
    ) -> Result<(), Box<dyn Plugin>> {
        if self.slots.len() == self.slots.capacity() || self.contains(id) {
            return Err(plugin);
        }
        let index = index.min(self.slots.len());
        self.slots.insert(index, Slot { id, plugin, bypassed: false });
        Ok(())
    }

    pub fn remove(&mut self, id: PluginId) -> Option<Box<dyn Plugin>> {
        let index = self.position(id)?;
        Some(self.slots.remove(index).plugin)
    }

    /// Move a plugin to `index` (clamped), shifting the others.
    pub fn move_to(&mut self, id: PluginId, index: usize) -> bool {
        let Some(from) = self.position(id) else {
            return false;
        };
        let to = index.min(self.slots.len() - 1);
        if from < to {
            self.slots[from..=to].rotate_left(1);
        } else if from > to {
            self.slots[to..=from].rotate_right(1);
        }
        true
    }

    pub fn set_parameter(&mut self, id: PluginId, index: usize, value: f32) -> bool {
        match self.slots.iter_mut().find(|s| s.id == id) {
            Some(slot) => {
                let value = match slot.plugin.parameters().get(index) {
                    Some(info) => info.clamp(value),
                    None => return false,
                };
                slot.plugin.set_parameter(index, value);
                true
            }
            None => false,
        }
    }

    pub fn set_bypass(&mut self, id: PluginId, bypassed: bool) -> bool {
        match self.slots.iter_mut().find(|s| s.id == id) {
            Some(slot) => {
                slot.bypassed = bypassed;
                true
            }
            None => false,
        }
    }

    /// Total latency of the active (non-bypassed) plugins.
    pub fn latency_samples(&self) -> u32 {
        self.slots
            .iter()
            .filter(|s| !s.bypassed)
            .map(|s| s.plugin.latency_samples())
            .sum()
    }

    /// Run every active plugin in order, in place. Stops at the first error.
    pub fn process(
        &mut self,
        ctx: &TransportContext,
        events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError> {
        for slot in self.slots.iter_mut().filter(|s| !s.bypassed) {
            slot.plugin.process(ctx, events, buffer)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| s.plugin.reset());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ParameterInfo;
    use crate::timeline::{TempoMap, TimeSignature};
    use crate::transport::TransportContext;

    const PARAMS: [ParameterInfo; 1] = [ParameterInfo::new("amount", 0.0, 2.0, 1.0)];

    /// Adds a constant, so the order of plugins is visible in the output.
    struct Offset {
        amount: f32,
        latency: u32,
    }

    impl Plugin for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn parameters(&self) -> &[ParameterInfo] {
            &PARAMS
        }

        fn set_parameter(&mut self, _index: usize, value: f32) {
            self.amount = value;
        }

        fn latency_samples(&self) -> u32 {
            self.latency
        }

        fn process(
            &mut self,
            _ctx: &TransportContext,
            _events: &[NoteEvent],
            buffer: &mut AudioBuffer,
        ) -> Result<(), PluginError> {
            for ch in buffer.iter_channels_mut() {
                ch.iter_mut().for_each(|s| *s = *s * 2.0 + self.amount);
            }
            Ok(())
        }
    }

    fn offset(amount: f32, latency: u32) -> Box<dyn Plugin> {
        Box::new(Offset { amount, latency })
    }

    fn ctx() -> TransportContext {
        let tm = TempoMap::new(120.0, TimeSignature::default(), 1).unwrap();
        TransportContext::for_block(&tm, 0.0, 0, 48_000, 4, true)
    }

    fn run(chain: &mut PluginChain) -> f32 {
        let mut buffer = AudioBuffer::new(1, 4);
        chain.process(&ctx(), &[], &mut buffer).unwrap();
        buffer.channel(0)[0]
    }

    #[test]
    fn test_order_add_and_move() {
        let mut chain = PluginChain::with_capacity(4);
        chain.add(PluginId(1), offset(1.0, 0), 0).ok().unwrap();
        chain.add(PluginId(2), offset(0.5, 0), 99).ok().unwrap();
        // (0 * 2 + 1) * 2 + 0.5
        assert_eq!(run(&mut chain), 2.5);

        assert!(chain.move_to(PluginId(2), 0));
        // (0 * 2 + 0.5) * 2 + 1
        assert_eq!(run(&mut chain), 2.0);
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![PluginId(2), PluginId(1)]);
        assert!(!chain.move_to(PluginId(7), 0));
    }

    #[test]
    fn test_move_across_longer_chain() {
        let mut chain = PluginChain::with_capacity(4);
        for id in 1..=4 {
            chain.add(PluginId(id), offset(0.0, 0), usize::MAX).ok().unwrap();
        }
        chain.move_to(PluginId(1), 2);
        assert_eq!(
            chain.ids().collect::<Vec<_>>(),
            vec![PluginId(2), PluginId(3), PluginId(1), PluginId(4)]
        );
        chain.move_to(PluginId(4), 0);
        assert_eq!(
            chain.ids().collect::<Vec<_>>(),
            vec![PluginId(4), PluginId(2), PluginId(3), PluginId(1)]
        );
    }

    #[test]
    fn test_bypass_passes_through() {
        let mut chain = PluginChain::with_capacity(2);
        chain.add(PluginId(1), offset(1.0, 64), 0).ok().unwrap();
        chain.add(PluginId(2), offset(1.0, 32), 1).ok().unwrap();
        assert_eq!(chain.latency_samples(), 96);

        assert!(chain.set_bypass(PluginId(1), true));
        assert_eq!(run(&mut chain), 1.0);
        assert_eq!(chain.latency_samples(), 32);
        assert_eq!(chain.is_bypassed(PluginId(1)), Some(true));
    }

    #[test]
    fn test_capacity_and_duplicates_hand_plugin_back() {
        let mut chain = PluginChain::with_capacity(1);
        assert!(chain.add(PluginId(1), offset(0.0, 0), 0).is_ok());
        assert!(chain.add(PluginId(2), offset(0.0, 0), 0).is_err());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_parameters_are_clamped_and_checked() {
        let mut chain = PluginChain::with_capacity(1);
        chain.add(PluginId(1), offset(0.0, 0), 0).ok().unwrap();
        assert!(chain.set_parameter(PluginId(1), 0, 10.0));
        assert_eq!(run(&mut chain), 2.0);
        assert!(!chain.set_parameter(PluginId(1), 3, 1.0));
        assert!(!chain.set_parameter(PluginId(9), 0, 1.0));
    }

    #[test]
    fn test_remove() {
        let mut chain = PluginChain::with_capacity(3);
        for id in 1..=3 {
            chain.add(PluginId(id), offset(0.0, 0), usize::MAX).ok().unwrap();
        }
        assert_eq!(chain.remove(PluginId(2)).map(|p| p.name().to_string()), Some("offset".into()));
        assert!(chain.remove(PluginId(2)).is_none());
        assert_eq!(chain.ids().collect::<Vec<_>>(), vec![PluginId(1), PluginId(3)]);
    }
}
