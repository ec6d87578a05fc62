use super::enforce::{clamp_max_int, enforce_bool_only_true, enforce_mode_tighten, enforce_path_within};
use super::mounts::sanitize_workspace_mounts;

/// Approval modes from strictest to most permissive.
const APPROVAL_MODES: &[&str] = &["auto_deny", "interactive", "approve_all"];

/// Enforce that the workspace layer can only **tighten** the configuration.
/// Call this after merging the workspace layer but before deserialization.
///
/// `baseline` is the merged config *before* the workspace layer was applied,
/// so enforcement also works when no user config file exists.
pub fn enforce_restrictions(merged: &mut toml::Value, baseline: &toml::Value, workspace_layer: &toml::Value) {
    // sandbox.readonly: can only become true.
    enforce_bool_only_true(
        merged,
        baseline,
        workspace_layer,
        &["sandbox", "readonly"],
        "sandbox.readonly",
    );

    // sandbox.root: can only move deeper.
    enforce_path_within(merged, baseline, workspace_layer, &["sandbox", "root"], "sandbox.root");

    // sandbox.mounts: no new mounts, read-only stays read-only.
    sanitize_workspace_mounts(merged, baseline, workspace_layer);

    // approval.mode: auto_deny < interactive < approve_all.
    enforce_mode_tighten(
        merged,
        baseline,
        workspace_layer,
        &["approval", "mode"],
        "approval.mode",
        APPROVAL_MODES,
    );

    // delegation.max_depth: can only decrease.
    clamp_max_int(
        merged,
        baseline,
        workspace_layer,
        &["delegation", "max_depth"],
        "delegation.max_depth",
    );

    // Tool approval flags: can only become true.
    for flag in ["require_approval_for_reads", "require_approval_for_writes"] {
        enforce_bool_only_true(
            merged,
            baseline,
            workspace_layer,
            &["tools", flag],
            &format!("tools.{flag}"),
        );
    }
}
