use log::{debug, warn};

use crate::error::{CompensationError, TransactionFailure};
use crate::package::Package;
use crate::solver::Action;

use super::Installer;

fn run(installer: &dyn Installer, action: Action, package: &Package) -> anyhow::Result<()> {
    match action {
        Action::Install => installer.install(package),
        Action::Uninstall => installer.uninstall(package),
    }
}

fn opposite(action: Action) -> Action {
    match action {
        Action::Install => Action::Uninstall,
        Action::Uninstall => Action::Install,
    }
}

/// Run `action` for `package` on every installer, in order.
///
/// When an installer fails, the installers that already succeeded are undone
/// with the opposite action, newest first. Undo failures do not stop the
/// rollback; they are logged and returned alongside the original error.
#[tracing::instrument(skip(installers, package), fields(name = package.name()))]
pub fn apply(
    installers: &[(&str, &dyn Installer)],
    action: Action,
    package: &Package,
) -> Result<(), TransactionFailure> {
    for (index, (id, installer)) in installers.iter().enumerate() {
        debug!("Running {} for {} via '{}'", action, package.name(), id);

        if let Err(cause) = run(*installer, action, package) {
            warn!(
                "Installer '{}' failed to {} {}: {}",
                id,
                action,
                package.name(),
                cause
            );

            return Err(TransactionFailure {
                installer: id.to_string(),
                cause,
                compensation_errors: revert(&installers[..index], action, package),
            });
        }
    }
    Ok(())
}

/// Undo `action` on installers that completed it, newest first.
pub fn revert(
    installers: &[(&str, &dyn Installer)],
    action: Action,
    package: &Package,
) -> Vec<CompensationError> {
    let undo = opposite(action);
    let mut compensation_errors = Vec::new();
    for (id, installer) in installers.iter().rev() {
        if let Err(error) = run(*installer, undo, package) {
            warn!(
                "Rollback of installer '{}' ({}) for {} failed: {}",
                id,
                undo,
                package.name(),
                error
            );
            compensation_errors.push(CompensationError {
                installer: id.to_string(),
                error,
            });
        }
    }
    compensation_errors
}
