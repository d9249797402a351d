//! Package staging and installation.
//!
//! The mission never touches packages itself: it asks a [`Loader`] to stage
//! each unit and an [`Installer`] to put it in place. The local
//! implementations read packages from a repository directory and copy them
//! into the installation root.

mod checksum;
mod installer;
mod loader;

use async_trait::async_trait;

use crate::error::Result;
use crate::plan::{DeploymentUnit, Plan};

pub use checksum::PackageHasher;
pub use installer::DirectoryInstaller;
pub use loader::DirectoryLoader;

/// Stages a unit's package.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Loader: Send + Sync {
    /// Stages the package and marks the unit as loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is missing or does not verify.
    async fn load(&self, unit: &DeploymentUnit) -> Result<()>;
}

/// Installs and removes staged packages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Installer: Send + Sync {
    /// Installs a loaded unit and marks it as installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit is not loaded or cannot be installed.
    async fn install(&self, unit: &DeploymentUnit) -> Result<()>;

    /// Removes every installed unit of the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if installed files cannot be removed.
    async fn clean(&self, plan: &Plan) -> Result<()>;
}
