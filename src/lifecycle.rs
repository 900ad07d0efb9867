use crate::hardware::{HardwareError, ObjectRegistry};
use crate::scheduler::Reactor;

/// Host readiness and shutdown notifications.
///
/// `on_ready` is where components resolve their sensors and heaters; before
/// it runs they hold no capabilities. `on_shutdown` must leave no timer or
/// wait registered that could call back into the component.
pub trait LifecycleHandler {
    fn on_ready(&mut self, registry: &mut ObjectRegistry) -> Result<(), HardwareError>;
    fn on_shutdown(&mut self, reactor: &mut Reactor);
}
