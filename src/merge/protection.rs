use crate::errors::{BridgeError, Warning};
use crate::grid::{GridControl, ProtectionCommand};
use crate::model::{Resource, SheetId};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

const PROTECTION_MARKERS: [&str; 2] = ["PERMISSION", "PROTECTION"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionReport {
    pub applied: usize,
    /// Rules whose sheet did not make it into the destination.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleScope {
    Worksheet,
    Range,
}

fn is_protection_resource(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    PROTECTION_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Resource payloads arrive either as JSON text or already parsed.
fn parse_resource_data(data: &Value) -> Result<Value, String> {
    match data {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|err| format!("resource data is not JSON: {err}"))
        }
        other => Ok(other.clone()),
    }
}

fn looks_like_rule(map: &serde_json::Map<String, Value>) -> bool {
    ["subUnitId", "permissionId", "unitType"]
        .iter()
        .any(|key| map.contains_key(*key))
}

/// Flattens the resource payload into `(keyed sheet id, rule)` pairs.
fn collect_rules(data: &Value) -> Vec<(Option<String>, Value)> {
    match data {
        Value::Object(map) if looks_like_rule(map) => vec![(None, data.clone())],
        Value::Object(map) => map
            .iter()
            .flat_map(|(key, value)| match value {
                Value::Array(items) => items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| (Some(key.clone()), item.clone()))
                    .collect::<Vec<_>>(),
                Value::Object(_) => vec![(Some(key.clone()), value.clone())],
                _ => Vec::new(),
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| (None, item.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Rewrites every nested sheet reference to its new id and stamps the destination unit id.
///
/// List entries pointing at a source sheet that did not append are dropped. Returns `false`
/// when such a reference sits outside any list and cannot be dropped.
fn rewrite_identities(
    value: &mut Value,
    sheet_map: &IndexMap<SheetId, SheetId>,
    source_ids: &HashSet<&str>,
    unit_id: &str,
) -> bool {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                match key.as_str() {
                    "subUnitId" => {
                        let Some(old) = nested.as_str() else {
                            continue;
                        };
                        match sheet_map.get(&SheetId::from(old)) {
                            Some(new_id) => *nested = Value::String(new_id.to_string()),
                            None if source_ids.contains(old) => return false,
                            None => {}
                        }
                    }
                    "unitId" => *nested = Value::String(unit_id.to_string()),
                    _ => {
                        if !rewrite_identities(nested, sheet_map, source_ids, unit_id) {
                            return false;
                        }
                    }
                }
            }
            true
        }
        Value::Array(items) => {
            items.retain_mut(|item| rewrite_identities(item, sheet_map, source_ids, unit_id));
            true
        }
        _ => true,
    }
}

fn non_empty_ranges(rule: &Value) -> bool {
    rule.get("ranges")
        .and_then(Value::as_array)
        .is_some_and(|ranges| !ranges.is_empty())
}

fn rule_scope(rule: &Value, resource_name: &str) -> RuleScope {
    match rule.get("unitType") {
        Some(Value::String(kind)) if kind.eq_ignore_ascii_case("range") => RuleScope::Range,
        Some(Value::String(kind)) if kind.eq_ignore_ascii_case("worksheet") => RuleScope::Worksheet,
        Some(Value::Number(n)) if n.as_u64() == Some(3) => RuleScope::Range,
        Some(Value::Number(n)) if n.as_u64() == Some(2) => RuleScope::Worksheet,
        _ if resource_name.to_ascii_uppercase().contains("RANGE") => RuleScope::Range,
        _ if rule.get("ranges").is_some() => RuleScope::Range,
        _ => RuleScope::Worksheet,
    }
}

fn build_command(
    rule: Value,
    scope: RuleScope,
    sheet_id: SheetId,
) -> Result<ProtectionCommand, String> {
    match scope {
        RuleScope::Worksheet => Ok(ProtectionCommand::LockSheet { sheet_id, rule }),
        RuleScope::Range => {
            let permission_id = rule
                .get("permissionId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| "range rule has no permissionId".to_string())?
                .to_string();
            Ok(ProtectionCommand::LockRange {
                sheet_id,
                permission_id,
                rule,
            })
        }
    }
}

/// Reattaches protection rules from `resources` to the appended sheets.
///
/// `source_ids` names every sheet of the source workbook, appended or not.
pub(super) async fn reattach(
    grid: &dyn GridControl,
    resources: &[Resource],
    sheet_map: &IndexMap<SheetId, SheetId>,
    source_ids: &HashSet<&str>,
    unit_id: &str,
) -> (ProtectionReport, Vec<Warning>) {
    let mut report = ProtectionReport::default();
    let mut warnings = Vec::new();
    let mut fail = |report: &mut ProtectionReport, sheet_id: &str, reason: String| {
        let err = BridgeError::ProtectionApplyFailed {
            sheet_id: sheet_id.to_string(),
            reason,
        };
        tracing::warn!(error = %err, "protection rule not applied");
        report.failed += 1;
        warnings.push(err.to_warning());
    };

    for resource in resources.iter().filter(|r| is_protection_resource(&r.name)) {
        let data = match parse_resource_data(&resource.data) {
            Ok(data) => data,
            Err(reason) => {
                fail(&mut report, "*", format!("{}: {reason}", resource.name));
                continue;
            }
        };

        for (keyed_id, mut rule) in collect_rules(&data) {
            let Some(old_id) = rule
                .get("subUnitId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or(keyed_id)
            else {
                report.skipped += 1;
                continue;
            };
            let Some(new_id) = sheet_map.get(&SheetId::from(old_id.as_str())).cloned() else {
                tracing::debug!(sheet = %old_id, resource = %resource.name, "sheet not appended; rule skipped");
                report.skipped += 1;
                continue;
            };

            let scope = rule_scope(&rule, &resource.name);
            let had_ranges = non_empty_ranges(&rule);
            if !rewrite_identities(&mut rule, sheet_map, source_ids, unit_id)
                || (had_ranges && !non_empty_ranges(&rule))
            {
                tracing::debug!(sheet = %old_id, resource = %resource.name, "rule references a sheet that was not appended; skipped");
                report.skipped += 1;
                continue;
            }
            if let Value::Object(map) = &mut rule {
                map.insert("subUnitId".to_string(), Value::String(new_id.to_string()));
            }
            let command = match build_command(rule, scope, new_id.clone()) {
                Ok(command) => command,
                Err(reason) => {
                    fail(&mut report, new_id.as_str(), reason);
                    continue;
                }
            };
            match grid.apply_protection(command).await {
                Ok(()) => {
                    tracing::debug!(sheet = %new_id, "protection rule applied");
                    report.applied += 1;
                }
                Err(err) => fail(&mut report, new_id.as_str(), format!("{err:#}")),
            }
        }
    }

    (report, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn markers_match_case_insensitively() {
        assert!(is_protection_resource("SHEET_RANGE_PROTECTION_PLUGIN"));
        assert!(is_protection_resource("sheet_permission_store"));
        assert!(!is_protection_resource("SHEET_FILTER_PLUGIN"));
    }

    #[test]
    fn nested_ids_are_rewritten() {
        let mut map = IndexMap::new();
        map.insert(SheetId::from("old"), SheetId::from("new"));
        let sources = HashSet::from(["old", "lost"]);
        let mut rule = json!({
            "unitId": "source-book",
            "subUnitId": "old",
            "ranges": [{"subUnitId": "old", "startRow": 0}, {"subUnitId": "lost", "startRow": 4}],
            "meta": {"unitId": "x", "subUnitId": "elsewhere"}
        });
        assert!(rewrite_identities(&mut rule, &map, &sources, "dest"));
        assert_eq!(
            rule,
            json!({
                "unitId": "dest",
                "subUnitId": "new",
                "ranges": [{"subUnitId": "new", "startRow": 0}],
                "meta": {"unitId": "dest", "subUnitId": "elsewhere"}
            })
        );
    }

    #[test]
    fn unlisted_reference_to_a_lost_sheet_rejects_the_rule() {
        let mut map = IndexMap::new();
        map.insert(SheetId::from("old"), SheetId::from("new"));
        let sources = HashSet::from(["old", "lost"]);
        let mut rule = json!({"subUnitId": "old", "linked": {"subUnitId": "lost"}});
        assert!(!rewrite_identities(&mut rule, &map, &sources, "dest"));
    }

    #[test]
    fn rules_collected_from_every_layout() {
        let keyed = json!({"s1": [{"permissionId": "p"}], "s2": {"name": "lock"}});
        let rules = collect_rules(&keyed);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].0.as_deref(), Some("s1"));

        let flat = json!([{"subUnitId": "s1"}, 3]);
        assert_eq!(collect_rules(&flat).len(), 1);
        assert_eq!(collect_rules(&json!({"subUnitId": "s1"})).len(), 1);
    }

    #[test]
    fn scope_from_unit_type_or_resource_name() {
        assert_eq!(rule_scope(&json!({"unitType": 3}), "X"), RuleScope::Range);
        assert_eq!(rule_scope(&json!({"unitType": "worksheet"}), "RANGE"), RuleScope::Worksheet);
        assert_eq!(rule_scope(&json!({}), "SHEET_RANGE_PROTECTION_PLUGIN"), RuleScope::Range);
        assert_eq!(rule_scope(&json!({}), "SHEET_WORKSHEET_PROTECTION_PLUGIN"), RuleScope::Worksheet);
    }
}
