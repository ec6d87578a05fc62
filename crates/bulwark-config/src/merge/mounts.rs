use tracing::warn;

use super::path::{get_nested, set_nested};

/// Keep only workspace mounts that the baseline already grants, with
/// `readonly` never relaxed.
///
/// The workspace `mounts` array replaces the baseline one during the merge,
/// so dropping a mount is allowed; adding one or re-targeting one is not.
pub(super) fn sanitize_workspace_mounts(merged: &mut toml::Value, baseline: &toml::Value, workspace: &toml::Value) {
    const PATH: &[&str] = &["sandbox", "mounts"];

    if get_nested(workspace, PATH).is_none() {
        return;
    }
    let baseline_mounts = get_nested(baseline, PATH)
        .and_then(toml::Value::as_array)
        .cloned()
        .unwrap_or_default();
    let merged_mounts = get_nested(merged, PATH)
        .and_then(toml::Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut kept = Vec::with_capacity(merged_mounts.len());
    for mut mount in merged_mounts {
        let source = field_str(&mount, "source").map(str::to_owned);
        let target = field_str(&mount, "target").map(str::to_owned);
        let Some(granted) = baseline_mounts
            .iter()
            .find(|m| field_str(m, "source") == source.as_deref() && field_str(m, "target") == target.as_deref())
        else {
            warn!(
                source = source.as_deref().unwrap_or("<missing>"),
                target = target.as_deref().unwrap_or("<missing>"),
                "Workspace config tried to add a mount; dropping it"
            );
            continue;
        };

        if field_bool(granted, "readonly") && !field_bool(&mount, "readonly") {
            warn!(
                target = target.as_deref().unwrap_or("<missing>"),
                "Workspace config tried to make a read-only mount writable; keeping it read-only"
            );
            if let Some(table) = mount.as_table_mut() {
                table.insert("readonly".to_owned(), toml::Value::Boolean(true));
            }
        }
        kept.push(mount);
    }

    set_nested(merged, PATH, toml::Value::Array(kept));
}

fn field_str<'a>(mount: &'a toml::Value, key: &str) -> Option<&'a str> {
    mount.get(key).and_then(toml::Value::as_str)
}

fn field_bool(mount: &toml::Value, key: &str) -> bool {
    mount.get(key).and_then(toml::Value::as_bool).unwrap_or(false)
}
