//! services/client/src/adapters/location.rs
//!
//! Implements the `LocationProvider` port for a terminal host, which has no GPS
//! driver: the permission answer and the device position come from configuration.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use vaccimap_core::domain::{Accuracy, Coordinates, LocationFix, Permission};
use vaccimap_core::ports::{LocationProvider, PortError, PortResult};

#[derive(Clone, Debug)]
pub struct DeviceLocationAdapter {
    permission: Permission,
    position: Option<Coordinates>,
}

impl DeviceLocationAdapter {
    pub fn new(permission: Permission, position: Option<Coordinates>) -> Self {
        Self {
            permission,
            position,
        }
    }
}

#[async_trait]
impl LocationProvider for DeviceLocationAdapter {
    async fn request_permission(&self) -> PortResult<Permission> {
        Ok(self.permission)
    }

    async fn current_fix(&self, accuracy: Accuracy) -> PortResult<LocationFix> {
        if self.permission == Permission::Denied {
            return Err(PortError::PermissionDenied(
                "Location permission has not been granted".to_string(),
            ));
        }
        let coordinates = self.position.ok_or_else(|| {
            PortError::Unavailable("No position is available for this device".to_string())
        })?;
        debug!("Serving {:?} fix at ({}, {})", accuracy, coordinates.latitude, coordinates.longitude);
        Ok(LocationFix {
            coordinates,
            captured_at: Utc::now(),
        })
    }
}
