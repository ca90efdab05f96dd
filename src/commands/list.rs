use anyhow::Result;
use std::io::Write;

use super::print_report;
use crate::manager::PackageManager;
use crate::runtime::Runtime;

/// Print every registered package as `name | status | version`, after a line
/// for each package registered on the way.
#[tracing::instrument(skip_all)]
pub fn list<R: Runtime>(manager: &mut PackageManager<'_, R>, out: &mut impl Write) -> Result<()> {
    let registered = manager.register_available()?;
    print_report(&registered, out)?;

    let packages = manager.packages()?;
    if packages.is_empty() {
        writeln!(out, "No packages available.")?;
        return Ok(());
    }

    for name in packages.keys() {
        let status = manager.status(name)?;
        let version = manager.version(name)?;
        writeln!(
            out,
            "{} | {} | {}",
            name,
            status.label(),
            version.as_deref().unwrap_or("(unknown)")
        )?;
    }
    Ok(())
}
