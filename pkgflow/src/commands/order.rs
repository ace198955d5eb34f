//! Processing order of a lockfile

use super::{CommandError, OutputFormat};
use pkgflow_core::{Lockfile, Pipeline};
use std::fmt::Write as _;
use std::path::Path;

/// Print the order in which packages would be processed
pub fn execute(lockfile: &Path, format: OutputFormat) -> Result<(), CommandError> {
    let lock = Lockfile::from_path(lockfile)?;
    print!("{}", render(&lock, format)?);
    Ok(())
}

fn render(lock: &Lockfile, format: OutputFormat) -> Result<String, CommandError> {
    let plan = Pipeline::plan(lock);

    if format == OutputFormat::Json {
        let out = serde_json::json!({
            "order": plan.order,
            "cycles": plan.cycles,
            "fingerprint": plan.graph.fingerprint(),
        });
        return Ok(format!("{}\n", serde_json::to_string_pretty(&out)?));
    }

    let mut out = String::new();
    for (i, name) in plan.order.iter().enumerate() {
        let deps = plan.graph.dependencies(name).map_or(0, |d| d.len());
        writeln!(out, "{:>4}. {name} ({deps} deps)", i + 1)?;
    }
    writeln!(out)?;
    writeln!(out, "{} packages", plan.order.len())?;

    if !plan.cycles.is_empty() {
        writeln!(out)?;
        writeln!(out, "⚠️  Dependency cycles, order inside them is best effort:")?;
        for cycle in &plan.cycles {
            writeln!(out, "  • {}", cycle.join(" → "))?;
        }
    }
    Ok(out)
}
