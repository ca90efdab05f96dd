use anyhow::Result;
use log::debug;
use std::io::Write;

use super::print_report;
use crate::manager::PackageManager;
use crate::runtime::Runtime;
use crate::solver::Problem;

/// Install `name` together with the dependencies it is missing.
#[tracing::instrument(skip(manager, out))]
pub fn install<R: Runtime>(
    manager: &mut PackageManager<'_, R>,
    name: &str,
    yes: bool,
    out: &mut impl Write,
) -> Result<()> {
    let registered = manager.register_available()?;
    print_report(&registered, out)?;
    let package = manager.create_instance(name)?;
    let problem = manager.test_install(&package)?;
    run(manager, &problem, yes, out)
}

/// Uninstall `name` after the installed packages that depend on it.
#[tracing::instrument(skip(manager, out))]
pub fn uninstall<R: Runtime>(
    manager: &mut PackageManager<'_, R>,
    name: &str,
    yes: bool,
    out: &mut impl Write,
) -> Result<()> {
    let registered = manager.register_available()?;
    print_report(&registered, out)?;
    let package = manager.create_instance(name)?;
    let problem = manager.test_uninstall(&package)?;
    run(manager, &problem, yes, out)
}

fn run<R: Runtime>(
    manager: &mut PackageManager<'_, R>,
    problem: &Problem,
    yes: bool,
    out: &mut impl Write,
) -> Result<()> {
    if problem.len() > 1 && !yes {
        writeln!(out, "The following jobs will be applied:")?;
        for job in problem {
            writeln!(out, "  {}", job)?;
        }
        out.flush()?;

        if !manager.runtime().confirm("Continue?")? {
            writeln!(out, "Aborted.")?;
            return Ok(());
        }
    }

    debug!("Applying {} job(s)", problem.len());
    let report = manager.apply(problem)?;
    print_report(&report, out)
}
