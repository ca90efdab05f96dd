use anyhow::Result;
use std::io::Write;

use super::print_report;
use crate::manager::PackageManager;
use crate::runtime::Runtime;

/// Register, install and unregister packages until the registry matches the
/// lock file, printing `action : name` for everything done.
#[tracing::instrument(skip_all)]
pub fn sync<R: Runtime>(manager: &mut PackageManager<'_, R>, out: &mut impl Write) -> Result<()> {
    let report = manager.sync()?;
    if report.is_empty() {
        writeln!(out, "Nothing to do.")?;
    }
    print_report(&report, out)
}
