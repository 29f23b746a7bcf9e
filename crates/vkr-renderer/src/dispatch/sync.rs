use ash::vk;
use vkr_driver::HandleMap;
use vkr_protocol::commands::{DeviceObjectArgs, FencesArgs, WaitForFencesArgs};
use vkr_protocol::{ObjectId, ObjectType, Opcode, Reply};

use super::{failure, result_reply, Dispatcher};
use crate::error::Fatal;

impl Dispatcher<'_> {
    fn fence_handles(&self, device: ObjectId, fences: &[ObjectId]) -> Result<Vec<vk::Fence>, Fatal> {
        let mut handles = HandleMap::new();
        self.state
            .objects
            .resolve_all(&mut handles, fences, ObjectType::Fence, device)?;
        Ok(fences.iter().map(|id| handles.fence(*id)).collect())
    }

    pub(super) fn reset_fences(&mut self, args: FencesArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let fences = self.fence_handles(args.device, &args.fences)?;
        Ok(result_reply(self.driver.reset_fences(device, &fences)))
    }

    pub(super) fn get_fence_status(&mut self, args: DeviceObjectArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let fence = self.fence_handles(args.device, &[args.object])?[0];
        Ok(match self.driver.get_fence_status(device, fence) {
            Ok(true) => Reply::Result(vk::Result::SUCCESS.as_raw()),
            Ok(false) => Reply::Result(vk::Result::NOT_READY.as_raw()),
            Err(err) => failure(err),
        })
    }

    /// Only zero-timeout waits are served: they are status polls. Anything
    /// longer would block the dispatch thread.
    pub(super) fn wait_for_fences(&mut self, args: WaitForFencesArgs) -> Result<Reply, Fatal> {
        if args.timeout != 0 {
            return Err(Fatal::BlockingWait(Opcode::WaitForFences));
        }
        let device = self.device_handle(args.device)?;
        let fences = self.fence_handles(args.device, &args.fences)?;

        let mut signaled = 0usize;
        for fence in &fences {
            match self.driver.get_fence_status(device, *fence) {
                Ok(true) => signaled += 1,
                Ok(false) => {}
                Err(err) => return Ok(failure(err)),
            }
        }
        let done = if args.wait_all {
            signaled == fences.len()
        } else {
            signaled > 0
        };
        let result = if done {
            vk::Result::SUCCESS
        } else {
            vk::Result::TIMEOUT
        };
        Ok(Reply::Result(result.as_raw()))
    }

    pub(super) fn get_event_status(&mut self, args: DeviceObjectArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let event = self.event_handle(&args)?;
        Ok(match self.driver.get_event_status(device, event) {
            Ok(true) => Reply::Result(vk::Result::EVENT_SET.as_raw()),
            Ok(false) => Reply::Result(vk::Result::EVENT_RESET.as_raw()),
            Err(err) => failure(err),
        })
    }

    pub(super) fn set_event(&mut self, args: DeviceObjectArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let event = self.event_handle(&args)?;
        Ok(result_reply(self.driver.set_event(device, event)))
    }

    pub(super) fn reset_event(&mut self, args: DeviceObjectArgs) -> Result<Reply, Fatal> {
        let device = self.device_handle(args.device)?;
        let event = self.event_handle(&args)?;
        Ok(result_reply(self.driver.reset_event(device, event)))
    }

    fn event_handle(&self, args: &DeviceObjectArgs) -> Result<vk::Event, Fatal> {
        let handle = self
            .state
            .objects
            .owned_handle(args.object, ObjectType::Event, args.device)?;
        Ok(handle.event().unwrap_or_default())
    }
}
