use async_trait::async_trait;
use log::{debug, info, warn};
use open;
use tokio::task::spawn_blocking;

use crate::error::{LinkOpenError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Scan,
    Connect,
    Location,
}

/// Which permission scheme the operating system uses for bluetooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionModel {
    /// Separate scan, connect and location grants.
    Modern,
    /// A single location grant covers bluetooth scanning.
    Legacy,
}

impl PermissionModel {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            PermissionModel::Modern => &[Capability::Scan, Capability::Connect, Capability::Location],
            PermissionModel::Legacy => &[Capability::Location],
        }
    }
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn model(&self) -> PermissionModel;

    async fn check(&self, capability: Capability) -> Result<bool, TransportError>;

    /// Ask for a capability. May show an OS dialog and only resolves once the user answered it.
    async fn request(&self, capability: Capability) -> Result<bool, TransportError>;
}

async fn is_granted<P: PermissionProvider + ?Sized>(provider: &P, capability: Capability) -> bool {
    match provider.check(capability).await {
        Ok(granted) => granted,
        Err(err) => {
            warn!("Failed to check {:?} permission: {}", capability, err);
            false
        },
    }
}

/// Make sure every capability required by the provider's permission model is granted, requesting
/// the ones that are not. Never fails: any error counts as a denial.
pub async fn ensure_permissions<P: PermissionProvider + ?Sized>(provider: &P) -> bool {
    let capabilities = provider.model().capabilities();

    let mut missing = Vec::new();
    for capability in capabilities {
        if !is_granted(provider, *capability).await {
            missing.push(*capability);
        }
    }

    if missing.is_empty() {
        debug!("All bluetooth permissions already granted");
        return true;
    }

    info!("Requesting bluetooth permissions {:?}", missing);
    let mut all_granted = true;

    for capability in missing {
        let granted = match provider.request(capability).await {
            Ok(granted) => granted,
            Err(err) => {
                warn!("Failed to request {:?} permission: {}", capability, err);
                false
            },
        };

        if !granted {
            warn!("Permission {:?} was denied", capability);
            all_granted = false;
        }
    }

    all_granted
}

#[cfg(target_os = "windows")]
const BLUETOOTH_SETTINGS_URI: Option<&str> = Some("ms-settings:bluetooth");

#[cfg(target_os = "macos")]
const BLUETOOTH_SETTINGS_URI: Option<&str> = Some("x-apple.systempreferences:com.apple.preference.security?Privacy_Bluetooth");

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const BLUETOOTH_SETTINGS_URI: Option<&str> = None;

/// Deep-link into the OS settings so the user can grant bluetooth access after a denial.
pub async fn open_bluetooth_settings() -> Result<(), LinkOpenError> {
    let uri = BLUETOOTH_SETTINGS_URI.ok_or(LinkOpenError::UnsupportedPlatform)?;

    spawn_blocking(move || {
        open::that(uri)
    }).await.map_err(|err| LinkOpenError::IOError { source: err.into() })??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::device::fake::FakePermissions;
    use super::*;

    #[tokio::test]
    async fn modern_all_granted_requests_nothing() {
        let provider = FakePermissions::granted(PermissionModel::Modern);

        assert!(ensure_permissions(&provider).await);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn modern_requests_only_missing() {
        let provider = FakePermissions::new(PermissionModel::Modern)
            .with_granted(&[Capability::Scan])
            .with_grant_on_request(&[Capability::Connect, Capability::Location]);

        assert!(ensure_permissions(&provider).await);
        assert_eq!(provider.requests(), vec![Capability::Connect, Capability::Location]);
    }

    #[tokio::test]
    async fn modern_one_denial_fails() {
        let provider = FakePermissions::new(PermissionModel::Modern)
            .with_grant_on_request(&[Capability::Scan, Capability::Connect]);

        assert!(!ensure_permissions(&provider).await);
        assert_eq!(provider.requests(), vec![Capability::Scan, Capability::Connect, Capability::Location]);
    }

    #[tokio::test]
    async fn legacy_requests_location_only() {
        let provider = FakePermissions::new(PermissionModel::Legacy)
            .with_grant_on_request(&[Capability::Location]);

        assert!(ensure_permissions(&provider).await);
        assert_eq!(provider.requests(), vec![Capability::Location]);
    }

    #[tokio::test]
    async fn provider_errors_count_as_denial() {
        let provider = FakePermissions::new(PermissionModel::Legacy).failing();

        assert!(!ensure_permissions(&provider).await);
    }
}
