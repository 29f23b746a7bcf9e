//! Guest id to object record map.
//!
//! The table owns every record; removing an entry destroys the record. It is
//! only touched while the context lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::vk;
use vkr_driver::{HandleMap, HostHandle};
use vkr_protocol::{ObjectId, ObjectType};

use crate::device::Device;
use crate::error::Fatal;
use crate::object::{DeviceMemory, Instance, Object, ObjectKind, Pool};
use crate::physical_device::PhysicalDevice;
use crate::queue::Queue;

macro_rules! typed_accessors {
    ($($get:ident, $get_mut:ident => $variant:ident: $ty:ty;)*) => {
        $(
            pub fn $get(&self, id: ObjectId) -> Result<&$ty, Fatal> {
                let object = self.lookup(id, ObjectType::$variant)?;
                match &object.kind {
                    ObjectKind::$variant(inner) => Ok(inner),
                    _ => Err(mismatch(object, ObjectType::$variant)),
                }
            }

            pub fn $get_mut(&mut self, id: ObjectId) -> Result<&mut $ty, Fatal> {
                let object = self.lookup_mut(id, ObjectType::$variant)?;
                let actual = object.object_type();
                match &mut object.kind {
                    ObjectKind::$variant(inner) => Ok(inner),
                    _ => Err(Fatal::TypeMismatch {
                        id,
                        expected: ObjectType::$variant,
                        actual,
                    }),
                }
            }
        )*
    };
}

fn mismatch(object: &Object, expected: ObjectType) -> Fatal {
    Fatal::TypeMismatch {
        id: object.id,
        expected,
        actual: object.object_type(),
    }
}

#[derive(Default)]
pub struct ObjectTable {
    objects: HashMap<ObjectId, Object>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_new_id(&self, id: ObjectId) -> Result<(), Fatal> {
        if id == 0 {
            return Err(Fatal::InvalidId);
        }
        if self.objects.contains_key(&id) {
            return Err(Fatal::DuplicateId(id));
        }
        Ok(())
    }

    /// Validate a batch of new ids, which must also be distinct.
    pub fn validate_new_ids(&self, ids: &[ObjectId]) -> Result<(), Fatal> {
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            self.validate_new_id(*id)?;
            if !seen.insert(*id) {
                return Err(Fatal::DuplicateId(*id));
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, object: Object) -> Result<(), Fatal> {
        self.validate_new_id(object.id)?;
        self.objects.insert(object.id, object);
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn ids_of_type(&self, ty: ObjectType) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|object| object.object_type() == ty)
            .map(|object| object.id)
            .collect()
    }

    pub fn remove(&mut self, id: ObjectId) -> Result<Object, Fatal> {
        self.objects.remove(&id).ok_or(Fatal::UnknownId(id))
    }

    /// Look up `id` and check its kind.
    pub fn lookup(&self, id: ObjectId, expected: ObjectType) -> Result<&Object, Fatal> {
        let object = self.objects.get(&id).ok_or(Fatal::UnknownId(id))?;
        if object.object_type() != expected {
            return Err(mismatch(object, expected));
        }
        Ok(object)
    }

    pub fn lookup_mut(&mut self, id: ObjectId, expected: ObjectType) -> Result<&mut Object, Fatal> {
        let object = self.objects.get_mut(&id).ok_or(Fatal::UnknownId(id))?;
        if object.object_type() != expected {
            return Err(mismatch(object, expected));
        }
        Ok(object)
    }

    /// Host handle of a device or pool child, checking that it belongs to
    /// `device`.
    pub fn owned_handle(
        &self,
        id: ObjectId,
        expected: ObjectType,
        device: ObjectId,
    ) -> Result<HostHandle, Fatal> {
        let object = self.lookup(id, expected)?;
        if object.device != Some(device) {
            return Err(Fatal::WrongOwner { id, owner: device });
        }
        Ok(object.host_handle())
    }

    /// Resolve `id` into `handles`.
    pub fn resolve(
        &self,
        handles: &mut HandleMap,
        id: ObjectId,
        expected: ObjectType,
        device: ObjectId,
    ) -> Result<(), Fatal> {
        let handle = self.owned_handle(id, expected, device)?;
        handles.insert(id, handle);
        Ok(())
    }

    pub fn resolve_all(
        &self,
        handles: &mut HandleMap,
        ids: &[ObjectId],
        expected: ObjectType,
        device: ObjectId,
    ) -> Result<(), Fatal> {
        ids.iter()
            .try_for_each(|id| self.resolve(handles, *id, expected, device))
    }

    pub fn resolve_optional(
        &self,
        handles: &mut HandleMap,
        id: Option<ObjectId>,
        expected: ObjectType,
        device: ObjectId,
    ) -> Result<(), Fatal> {
        match id {
            Some(id) => self.resolve(handles, id, expected, device),
            None => Ok(()),
        }
    }

    /// A command buffer's host handle and owning device.
    pub fn command_buffer(&self, id: ObjectId) -> Result<(vk::CommandBuffer, ObjectId), Fatal> {
        let object = self.lookup(id, ObjectType::CommandBuffer)?;
        match (&object.kind, object.device) {
            (ObjectKind::CommandBuffer { handle, .. }, Some(device)) => Ok((*handle, device)),
            _ => Err(mismatch(object, ObjectType::CommandBuffer)),
        }
    }

    typed_accessors! {
        instance, instance_mut => Instance: Instance;
        physical_device, physical_device_mut => PhysicalDevice: PhysicalDevice;
        device, device_mut => Device: Device;
        queue, queue_mut => Queue: Arc<Queue>;
        memory, memory_mut => DeviceMemory: DeviceMemory;
        command_pool, command_pool_mut => CommandPool: Pool<vk::CommandPool>;
        descriptor_pool, descriptor_pool_mut => DescriptorPool: Pool<vk::DescriptorPool>;
    }
}
