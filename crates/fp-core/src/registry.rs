//! Process-wide table of live devices.
//!
//! Dense array indexed by device id, guarded by one lock. Slots are
//! append-only; removal blanks a slot and ids are never recycled, so an
//! id observed by a caller stays meaningful for the registry's
//! lifetime. Built for a handful of devices, not for churn.

use crate::device::PunchDevice;
use fp_error::{PunchError, Result};
use fp_types::{DeviceId, MAX_DEVICES};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Option<Arc<PunchDevice>>>,
    live: usize,
}

pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Append a new device, handing the builder its assigned id. The
    /// append and the live-count bump happen atomically under the
    /// registry lock. Ids stop at the single-letter namespace bound.
    pub(crate) fn insert_with(
        &self,
        build: impl FnOnce(DeviceId) -> Arc<PunchDevice>,
    ) -> Result<DeviceId> {
        let mut inner = self.inner.lock();
        if inner.slots.len() >= MAX_DEVICES {
            return Err(PunchError::NamespaceExhausted { max: MAX_DEVICES });
        }
        let id = DeviceId(inner.slots.len());
        let device = build(id);
        inner.slots.push(Some(device));
        inner.live += 1;
        Ok(id)
    }

    /// Bounds-checked lookup.
    pub fn get(&self, id: DeviceId) -> Result<Arc<PunchDevice>> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(id.0)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or(PunchError::NotFound { id: id.0 })
    }

    /// Blank a slot, returning the removed device. The id is not
    /// reused; future ids keep incrementing.
    pub(crate) fn remove(&self, id: DeviceId) -> Result<Arc<PunchDevice>> {
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .get_mut(id.0)
            .ok_or(PunchError::NotFound { id: id.0 })?;
        let device = slot.take().ok_or(PunchError::NotFound { id: id.0 })?;
        inner.live -= 1;
        Ok(device)
    }

    /// Number of live devices.
    #[must_use]
    pub fn live(&self) -> usize {
        self.inner.lock().live
    }

    /// Live ids in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<DeviceId> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| DeviceId(i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockSource, make_device};

    fn insert(registry: &Registry) -> DeviceId {
        registry
            .insert_with(|id| make_device(id, MockSource::eligible()))
            .expect("insert")
    }

    #[test]
    fn ids_are_dense_and_in_creation_order() {
        let registry = Registry::new();
        for expected in 0..5 {
            assert_eq!(insert(&registry), DeviceId(expected));
        }
        assert_eq!(registry.live(), 5);
        assert_eq!(
            registry.ids(),
            (0..5).map(DeviceId).collect::<Vec<_>>()
        );
    }

    #[test]
    fn removal_keeps_other_lookups_intact() {
        let registry = Registry::new();
        let a = insert(&registry);
        let b = insert(&registry);
        let c = insert(&registry);

        registry.remove(b).expect("remove middle");
        assert_eq!(registry.live(), 2);

        assert!(registry.get(a).is_ok());
        assert!(matches!(
            registry.get(b).unwrap_err(),
            PunchError::NotFound { id } if id == b.0
        ));
        assert!(registry.get(c).is_ok());

        // Ids are not recycled: the next insert extends the array.
        assert_eq!(insert(&registry), DeviceId(3));
    }

    #[test]
    fn out_of_range_lookup_is_not_found() {
        let registry = Registry::new();
        assert!(matches!(
            registry.get(DeviceId(7)).unwrap_err(),
            PunchError::NotFound { id: 7 }
        ));
        assert!(registry.remove(DeviceId(7)).is_err());
    }

    #[test]
    fn namespace_is_bounded_by_letter_ids() {
        let registry = Registry::new();
        for _ in 0..fp_types::MAX_DEVICES {
            insert(&registry);
        }
        let err = registry
            .insert_with(|id| make_device(id, MockSource::eligible()))
            .unwrap_err();
        assert!(matches!(err, PunchError::NamespaceExhausted { max } if max == fp_types::MAX_DEVICES));
    }
}
