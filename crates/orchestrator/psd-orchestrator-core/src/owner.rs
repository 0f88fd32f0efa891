use psd_weights_core::PoseLibrary;

use crate::capture::CaptureBuffer;
use crate::controllers::DriverController;
use crate::ids::OwnerId;

/// One registered animated object and everything authored on it.
#[derive(Debug, Clone)]
pub struct Owner {
    pub id: OwnerId,
    /// Current display name; used to resolve host objects, never as identity.
    pub name: String,
    pub library: PoseLibrary,
    pub captures: CaptureBuffer,
    /// Name of the object whose property container receives persisted weights.
    pub persist_proxy: Option<String>,
    pub drivers: DriverController,
}

impl Owner {
    pub fn new(id: OwnerId, name: impl Into<String>, driver_apply_epsilon: f64) -> Self {
        Self {
            id,
            name: name.into(),
            library: PoseLibrary::new(),
            captures: CaptureBuffer::new(),
            persist_proxy: None,
            drivers: DriverController::new(driver_apply_epsilon),
        }
    }
}
