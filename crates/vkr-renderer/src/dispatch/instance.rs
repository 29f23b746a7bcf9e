use ash::vk;
use tracing::{debug, info};
use vkr_driver::Driver;
use vkr_protocol::commands::{CreateInstanceArgs, EnumeratePhysicalDevicesArgs, InstanceArgs, PhysicalDeviceArgs};
use vkr_protocol::{ObjectId, Reply};

use super::{failure, success, Dispatcher};
use crate::error::Fatal;
use crate::object::{Instance, Object, ObjectKind};
use crate::physical_device::PhysicalDevice;
use crate::queue::Waiters;
use crate::state::ContextState;

impl Dispatcher<'_> {
    pub(super) fn create_instance(&mut self, args: CreateInstanceArgs) -> Result<Reply, Fatal> {
        self.state.objects.validate_new_id(args.instance)?;
        let handle = match self
            .driver
            .create_instance(&args, self.config.debug.validation)
        {
            Ok(handle) => handle,
            Err(err) => return Ok(failure(err)),
        };

        self.state.objects.insert(Object::new(
            args.instance,
            ObjectKind::Instance(Instance {
                handle,
                api_version: args.api_version,
                host_physical_devices: None,
                physical_devices: Vec::new(),
            }),
        ))?;
        info!(
            ctx_id = self.ctx_id,
            id = args.instance,
            application = %args.application_name,
            "instance created"
        );
        Ok(success())
    }

    pub(super) fn destroy_instance(&mut self, args: InstanceArgs) -> Result<Reply, Fatal> {
        destroy_instance(self.driver, self.waiters, self.state, args.instance)?;
        Ok(Reply::None)
    }

    /// An empty id list asks for the count. Otherwise the ids name the host
    /// devices in order; ids seen before must be repeated unchanged.
    pub(super) fn enumerate_physical_devices(
        &mut self,
        args: EnumeratePhysicalDevicesArgs,
    ) -> Result<Reply, Fatal> {
        let instance = self.state.objects.instance(args.instance)?;
        let handle = instance.handle;
        let api_version = instance.api_version;
        let host = match &instance.host_physical_devices {
            Some(host) => host.clone(),
            None => match self.driver.enumerate_physical_devices(handle) {
                Ok(host) => {
                    self.state.objects.instance_mut(args.instance)?.host_physical_devices =
                        Some(host.clone());
                    host
                }
                Err(err) => {
                    return Ok(Reply::PhysicalDeviceCount {
                        result: err.as_raw(),
                        count: 0,
                    })
                }
            },
        };

        if args.physical_devices.is_empty() {
            return Ok(Reply::PhysicalDeviceCount {
                result: vk::Result::SUCCESS.as_raw(),
                count: host.len() as u32,
            });
        }

        let count = args.physical_devices.len().min(host.len());
        let known = self
            .state
            .objects
            .instance(args.instance)?
            .physical_devices
            .clone();
        for (i, id) in args.physical_devices[..count].iter().enumerate() {
            if let Some(existing) = known.get(i) {
                if existing != id {
                    return Err(Fatal::InvalidArgument(
                        "physical device ids differ from an earlier enumeration",
                    ));
                }
            }
        }
        let new_ids = &args.physical_devices[known.len().min(count)..count];
        self.state.objects.validate_new_ids(new_ids)?;

        for (offset, id) in new_ids.iter().enumerate() {
            let pd = host[known.len() + offset];
            let physical_device =
                match PhysicalDevice::query(self.driver, pd, args.instance, api_version, self.config) {
                    Ok(physical_device) => physical_device,
                    Err(err) => {
                        return Ok(Reply::PhysicalDeviceCount {
                            result: err.as_raw(),
                            count: 0,
                        })
                    }
                };
            self.state
                .objects
                .insert(Object::new(*id, ObjectKind::PhysicalDevice(physical_device)))?;
            self.state
                .objects
                .instance_mut(args.instance)?
                .physical_devices
                .push(*id);
            debug!(ctx_id = self.ctx_id, id = *id, "physical device created");
        }

        let result = if count < host.len() {
            vk::Result::INCOMPLETE
        } else {
            vk::Result::SUCCESS
        };
        Ok(Reply::PhysicalDeviceCount {
            result: result.as_raw(),
            count: count as u32,
        })
    }

    // ── Physical Device Queries ─────────────────────────────

    pub(super) fn physical_device_properties(&mut self, args: PhysicalDeviceArgs) -> Result<Reply, Fatal> {
        let physical_device = self.state.objects.physical_device(args.physical_device)?;
        Ok(Reply::PhysicalDeviceProperties(physical_device.properties.clone()))
    }

    pub(super) fn queue_family_properties(&mut self, args: PhysicalDeviceArgs) -> Result<Reply, Fatal> {
        let physical_device = self.state.objects.physical_device(args.physical_device)?;
        Ok(Reply::QueueFamilyProperties(physical_device.queue_families.clone()))
    }

    pub(super) fn memory_properties(&mut self, args: PhysicalDeviceArgs) -> Result<Reply, Fatal> {
        let physical_device = self.state.objects.physical_device(args.physical_device)?;
        Ok(Reply::MemoryProperties(physical_device.memory_properties.clone()))
    }

    pub(super) fn device_extensions(&mut self, args: PhysicalDeviceArgs) -> Result<Reply, Fatal> {
        let physical_device = self.state.objects.physical_device(args.physical_device)?;
        Ok(Reply::ExtensionProperties {
            result: vk::Result::SUCCESS.as_raw(),
            extensions: physical_device.extensions.clone(),
        })
    }
}

/// Destroy an instance, its physical devices and every device created
/// against them.
pub(crate) fn destroy_instance(
    driver: &dyn Driver,
    waiters: &Waiters,
    state: &mut ContextState,
    id: ObjectId,
) -> Result<(), Fatal> {
    let physical_devices = state.objects.instance(id)?.physical_devices.clone();
    for pd in physical_devices {
        let devices = state
            .objects
            .physical_device(pd)
            .map(|p| p.devices.clone())
            .unwrap_or_default();
        for device in devices {
            crate::device::destroy_device(driver, waiters, state, device)?;
        }
        let _ = state.objects.remove(pd);
    }

    let object = state.objects.remove(id)?;
    if let ObjectKind::Instance(instance) = object.kind {
        driver.destroy_instance(instance.handle);
    }
    info!(id, "instance destroyed");
    Ok(())
}
