use crate::file_handler::list_file_names;
use crate::manifest::{Case, InverseManifest};
use crate::naming::{NamingConvention, OutputKind};
use crate::RelayError;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Also rename probability exports (`.npz`, `.pkl`).
    pub restore_auxiliary: bool,
    /// Replace files already sitting at a restore target.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedReason {
    /// Looks like a predictor output but its case id is not in the manifest.
    UnknownCase,
    /// Does not follow the predictor's output naming at all.
    NotAnOutput,
}

/// An output-folder file that was left alone because nothing maps it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedOutput {
    pub file_name: String,
    pub reason: UnmappedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// (predictor name, restored name)
    pub restored: Vec<(String, String)>,
    pub unmapped: Vec<UnmappedOutput>,
    /// Mapped auxiliary outputs left under their canonical names.
    pub skipped: Vec<String>,
}

/// Rename every predictor output that the inverse manifest knows back to
/// its original name. Unknown files are reported, never touched.
#[instrument(skip_all, fields(output = %output.display()))]
pub fn restore(
    output: &Path,
    inverse: &InverseManifest,
    convention: &NamingConvention,
    options: RestoreOptions,
) -> Result<RestoreReport, RelayError> {
    let mut report = RestoreReport::default();
    let mut plan: Vec<(String, String)> = Vec::new();

    for name in list_file_names(output)? {
        let Some(parsed) = convention.parse_output(&name) else {
            debug!(file = %name, "not a predictor output, leaving as is");
            report.unmapped.push(UnmappedOutput {
                file_name: name,
                reason: UnmappedReason::NotAnOutput,
            });
            continue;
        };
        let Some(case) = inverse.get(&parsed.case_id) else {
            warn!(file = %name, "no manifest entry for predictor output, leaving as is");
            report.unmapped.push(UnmappedOutput {
                file_name: name,
                reason: UnmappedReason::UnknownCase,
            });
            continue;
        };
        let target = match parsed.kind {
            OutputKind::Segmentation => case.original_name.clone(),
            OutputKind::Auxiliary if options.restore_auxiliary => {
                convention.auxiliary_name(&case.original_name, &parsed.ending)
            }
            OutputKind::Auxiliary => {
                report.skipped.push(name);
                continue;
            }
        };
        plan.push((name, target));
    }

    check_plan(output, &plan, options.overwrite)?;
    let moves: Vec<(String, String)> =
        plan.iter().filter(|(from, to)| from != to).cloned().collect();
    apply_plan(output, &moves)?;

    info!(
        restored = plan.len(),
        renamed = moves.len(),
        unmapped = report.unmapped.len(),
        skipped = report.skipped.len(),
        "outputs restored to original names"
    );
    report.restored = plan;
    Ok(report)
}

/// Every name `case` can be restored to under `options`.
pub fn restore_targets(
    case: &Case,
    convention: &NamingConvention,
    options: RestoreOptions,
) -> Vec<String> {
    let mut targets = vec![case.original_name.clone()];
    if options.restore_auxiliary {
        targets.extend(
            convention
                .auxiliary_endings()
                .iter()
                .map(|ending| convention.auxiliary_name(&case.original_name, ending)),
        );
    }
    targets
}

/// Fail before the predictor runs if a restore target is already taken.
/// Segmentations the predictor left for known cases may sit there, they are
/// renamed away before anything lands on them.
pub fn check_targets(
    output: &Path,
    inverse: &InverseManifest,
    convention: &NamingConvention,
    options: RestoreOptions,
) -> Result<(), RelayError> {
    if options.overwrite {
        return Ok(());
    }
    for case in inverse.cases() {
        for target in restore_targets(case, convention, options) {
            let path = output.join(&target);
            if !path.exists() {
                continue;
            }
            let pending = convention.parse_output(&target).is_some_and(|parsed| {
                parsed.kind == OutputKind::Segmentation && inverse.get(&parsed.case_id).is_some()
            });
            if !pending {
                return Err(already_exists(&path, "restore target already exists"));
            }
        }
    }
    Ok(())
}

fn already_exists(path: &Path, message: &str) -> RelayError {
    RelayError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{}: {}", message, path.display()),
    ))
}

/// Reject the whole plan before any rename if two outputs share a target or
/// a target is occupied by something that is not being renamed away.
fn check_plan(
    output: &Path,
    plan: &[(String, String)],
    overwrite: bool,
) -> Result<(), RelayError> {
    let sources: HashSet<&str> = plan.iter().map(|(from, _)| from.as_str()).collect();
    let mut targets = HashSet::new();
    for (from, to) in plan {
        let target_path = output.join(to);
        if !targets.insert(to.as_str()) {
            return Err(already_exists(&target_path, "two outputs restore to the same name"));
        }
        if !overwrite && from != to && !sources.contains(to.as_str()) && target_path.exists() {
            return Err(already_exists(&target_path, "restore target already exists"));
        }
    }
    Ok(())
}

fn apply_plan(output: &Path, plan: &[(String, String)]) -> Result<(), RelayError> {
    let sources: HashSet<&str> = plan.iter().map(|(from, _)| from.as_str()).collect();
    let chained = plan.iter().any(|(_, to)| sources.contains(to.as_str()));

    if !chained {
        for (from, to) in plan {
            rename(&output.join(from), &output.join(to))?;
        }
        return Ok(());
    }

    // A target is also a pending source: park everything under unique
    // hidden names first so no rename lands on a file still to be moved.
    let pid = std::process::id();
    let staged: Vec<(String, &String)> = plan
        .iter()
        .enumerate()
        .map(|(i, (_, to))| (format!(".relay-restore-{}-{}", pid, i), to))
        .collect();
    for (stage, to) in &staged {
        info!(staged = %stage, target = %to, "staging rename");
    }
    for (i, ((from, _), (stage, _))) in plan.iter().zip(&staged).enumerate() {
        if let Err(e) = rename(&output.join(from), &output.join(stage)) {
            return Err(stranded(output, &staged[..i], e));
        }
    }
    for (i, (stage, to)) in staged.iter().enumerate() {
        if let Err(e) = rename(&output.join(stage), &output.join(to.as_str())) {
            return Err(stranded(output, &staged[i..], e));
        }
    }
    Ok(())
}

/// Name the staged files a failed rename left behind and where they belong.
fn stranded(output: &Path, left: &[(String, &String)], cause: io::Error) -> RelayError {
    let pairs: Vec<String> = left
        .iter()
        .map(|(stage, to)| format!("{} -> {}", stage, to))
        .collect();
    RelayError::Io(io::Error::new(
        cause.kind(),
        format!(
            "{}; staged files left in {}: {}",
            cause,
            output.display(),
            pairs.join(", ")
        ),
    ))
}

fn rename(from: &Path, to: &Path) -> io::Result<()> {
    if to.is_file() {
        // Windows refuses to rename onto an existing file.
        fs::remove_file(to)?;
    }
    fs::rename(from, to).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("rename {} -> {}: {}", from.display(), to.display(), e),
        )
    })?;
    debug!(from = %from.display(), to = %to.display(), "renamed");
    Ok(())
}
