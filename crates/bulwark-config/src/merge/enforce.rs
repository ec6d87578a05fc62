use tracing::warn;

use super::path::{get_nested, set_nested};

/// Clamp an integer field so workspace cannot increase it beyond baseline.
pub(super) fn clamp_max_int(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let baseline_val = get_nested(baseline, path).and_then(toml::Value::as_integer);
    let ws_val = get_nested(workspace, path).and_then(toml::Value::as_integer);

    if let (Some(base_v), Some(ws_v)) = (baseline_val, ws_val)
        && ws_v > base_v
    {
        warn!(
            "Workspace config tried to increase {field_name} from {base_v} to {ws_v}; \
             clamping to {base_v}"
        );
        set_nested(merged, path, toml::Value::Integer(base_v));
    }
}

/// Ensure a boolean field can only go from `false` to `true` at the
/// workspace layer.
pub(super) fn enforce_bool_only_true(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let baseline_val = get_nested(baseline, path).and_then(toml::Value::as_bool);
    let ws_val = get_nested(workspace, path).and_then(toml::Value::as_bool);

    if let (Some(true), Some(false)) = (baseline_val, ws_val) {
        warn!(
            "Workspace config tried to disable {field_name}; \
             forcing to true (workspace can only enable, not disable)"
        );
        set_nested(merged, path, toml::Value::Boolean(true));
    }
}

/// Enforce that a string field representing an ordered mode can only become
/// stricter. Modes are ordered from strictest (index 0) to most permissive.
/// Unknown workspace values revert to the baseline.
pub(super) fn enforce_mode_tighten(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
    ordered_modes: &[&str],
) {
    let baseline_str = get_nested(baseline, path).and_then(toml::Value::as_str);
    let ws_str = get_nested(workspace, path).and_then(toml::Value::as_str);

    if let (Some(base_s), Some(ws_s)) = (baseline_str, ws_str) {
        let base_idx = ordered_modes.iter().position(|m| *m == base_s);
        let ws_idx = ordered_modes.iter().position(|m| *m == ws_s);

        let escalates = match (base_idx, ws_idx) {
            (Some(b_idx), Some(w_idx)) => w_idx > b_idx,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if escalates {
            warn!(
                "Workspace config tried to escalate {field_name} from \"{base_s}\" to \
                 \"{ws_s}\"; reverting to \"{base_s}\""
            );
            set_nested(merged, path, toml::Value::String(base_s.to_owned()));
        }
    }
}

/// A workspace may move a path field only to the baseline path itself or a
/// directory below it.
pub(super) fn enforce_path_within(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let baseline_str = get_nested(baseline, path).and_then(toml::Value::as_str);
    let ws_str = get_nested(workspace, path).and_then(toml::Value::as_str);

    if let (Some(base_s), Some(ws_s)) = (baseline_str, ws_str)
        && !is_within(ws_s, base_s)
    {
        warn!(
            "Workspace config tried to move {field_name} from \"{base_s}\" to \"{ws_s}\"; \
             reverting (workspace can only narrow it)"
        );
        set_nested(merged, path, toml::Value::String(base_s.to_owned()));
    }
}

fn is_within(candidate: &str, base: &str) -> bool {
    if candidate.split('/').any(|s| s == "..") {
        return false;
    }
    let base = base.trim_end_matches('/');
    let candidate = candidate.trim_end_matches('/');
    candidate == base
        || candidate
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}
