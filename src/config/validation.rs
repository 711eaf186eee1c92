//! Non-fatal checks on a junction file
//!
//! The raw text is parsed once as an untyped `toml::Value` so misspelt keys,
//! which serde would silently skip, can be reported with the closest known
//! key in the same section. Range checks run on the typed config afterwards.
//! Nothing here rejects a file; fatal rules live in `JunctionConfig::validate`.

use super::JunctionConfig;
use std::collections::HashSet;

/// Unknown key or out-of-range value worth an operator's attention.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of a junction file.
///
/// Entries of `[[approach]]` are walked with the `approach` prefix, so
/// `approach.name` covers the name of every approach. Free-form tables
/// (`approach.source`) are not descended into.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [junction]
        "junction",
        "junction.id",
        "junction.name",
        "junction.sub_location_id",
        // [cycle]
        "cycle",
        "cycle.phases",
        "cycle.durations_ms",
        "cycle.transition_ms",
        "cycle.standby_ms",
        "cycle.standby_flash_ms",
        // [density]
        "density",
        "density.green_multiplier",
        "density.red_multiplier",
        "density.min",
        "density.max",
        "density.min_phase_ms",
        "density.min_pedestrian_ms",
        "density.adaptive",
        // [relay]
        "relay",
        "relay.backend",
        "relay.address",
        "relay.port",
        "relay.username",
        "relay.password",
        "relay.base_url",
        "relay.response_retries",
        "relay.response_timeout_ms",
        "relay.connect_timeout_ms",
        "relay.request_timeout_ms",
        // [relay.channels]
        "relay.channels",
        "relay.channels.red",
        "relay.channels.green",
        "relay.channels.yellow",
        "relay.channels.red_ped",
        "relay.channels.green_ped",
        // [tracker]
        "tracker",
        "tracker.max_distance",
        "tracker.max_frames_not_seen",
        "tracker.max_id",
        "tracker.min_hull_area",
        "tracker.exit_line_y",
        "tracker.boundary_cushion_px",
        // [worker]
        "worker",
        "worker.idle_sleep_ms",
        "worker.sense_interval_ms",
        // [[approach]]
        "approach",
        "approach.name",
        "approach.source",
        "approach.lane_length_px",
        "approach.lane_width_px",
        "approach.calibration",
    ];
    keys.iter().copied().collect()
}

/// Tables whose contents are checked by serde alone.
const OPAQUE_TABLES: &[&str] = &["approach.source"];

/// Walk a TOML value tree and return every dotted key path.
///
/// Arrays of tables contribute their keys under the array's own name.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if OPAQUE_TABLES.contains(&path.as_str()) {
                continue;
            }
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        keys.extend(walk_toml_keys(item, &path));
                    }
                }
                _ => {}
            }
        }
    }
    keys.sort();
    keys.dedup();
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within 3 edits, compared on the last path segment
/// among keys sharing the same parent.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let (parent, leaf) = unknown.rsplit_once('.').unwrap_or(("", unknown));
    known
        .iter()
        .filter_map(|k| {
            let (kp, kl) = k.rsplit_once('.').unwrap_or(("", k));
            (kp == parent).then(|| (levenshtein(leaf, kl), *k))
        })
        .filter(|(d, _)| *d <= 3)
        .min_by_key(|(d, k)| (*d, *k))
        .map(|(_, k)| k.to_string())
}

/// Warn about every key in `raw_toml` the junction schema does not know.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Soft Range Checks
// ============================================================================

/// Values that are legal but probably not what the site intended.
pub fn validate_ranges(config: &JunctionConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let d = &config.density;

    for (p, ms) in config.cycle.durations_ms.iter().enumerate() {
        if *ms < d.min_phase_ms {
            warnings.push(ValidationWarning {
                field: format!("cycle.durations_ms[{p}]"),
                message: format!(
                    "phase {p} hold {ms} ms is below density.min_phase_ms ({} ms), adaptive planning will raise it",
                    d.min_phase_ms
                ),
                suggestion: None,
            });
        }
    }

    let full: u64 = config.cycle.durations_ms.iter().sum();
    if d.adaptive && d.min_pedestrian_ms > full {
        warnings.push(ValidationWarning {
            field: "density.min_pedestrian_ms".to_string(),
            message: format!(
                "min_pedestrian_ms ({}) exceeds the whole cycle ({full} ms)",
                d.min_pedestrian_ms
            ),
            suggestion: None,
        });
    }

    if config.cycle.transition_ms < 3_000 {
        warnings.push(ValidationWarning {
            field: "cycle.transition_ms".to_string(),
            message: format!(
                "transition_ms = {} is shorter than a typical 3 s yellow",
                config.cycle.transition_ms
            ),
            suggestion: None,
        });
    }

    if config.tracker.max_frames_not_seen > 30 {
        warnings.push(ValidationWarning {
            field: "tracker.max_frames_not_seen".to_string(),
            message: format!(
                "max_frames_not_seen = {} keeps departed vehicles alive for several seconds",
                config.tracker.max_frames_not_seen
            ),
            suggestion: None,
        });
    }

    if let Some(y) = config.tracker.exit_line_y {
        for a in &config.approaches {
            if y < 0.0 || y > a.lane_length_px {
                warnings.push(ValidationWarning {
                    field: "tracker.exit_line_y".to_string(),
                    message: format!(
                        "exit_line_y = {y} lies outside approach '{}' (0-{} px)",
                        a.name, a.lane_length_px
                    ),
                    suggestion: None,
                });
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("relay", "relay"), 0);
        assert_eq!(levenshtein("transiton_ms", "transition_ms"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [relay]
            backend = "telnet"
            [relay.channels]
            red = [0, 3]
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"relay".to_string()));
        assert!(keys.contains(&"relay.channels".to_string()));
        assert!(keys.contains(&"relay.channels.red".to_string()));
    }

    #[test]
    fn test_walk_toml_keys_array_of_tables() {
        let toml: toml::Value = r#"
            [[approach]]
            name = "north"
            source = { type = "replay", path = "north.jsonl" }
            [[approach]]
            name = "south"
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert_eq!(keys, vec!["approach", "approach.name", "approach.source"]);
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[cycle]
phases = [["GREEN_PHASE"]]
durations_ms = [1000]
transiton_ms = 4000
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "cycle.transiton_ms");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("cycle.transition_ms"));
    }

    #[test]
    fn test_typo_inside_approach() {
        let toml_str = r#"
[[approach]]
name = "north"
lane_widht_px = 100.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion.as_deref(), Some("approach.lane_width_px"));
    }

    #[test]
    fn test_unrelated_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("[relay]\nfirmware_blob = \"x\"\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }

    #[test]
    fn test_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[junction]
id = "J-1"

[density]
green_multiplier = 8.0

[relay.channels]
green_ped = [13]

[tracker]
exit_line_y = 400.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_malformed_toml_yields_no_warnings() {
        assert!(validate_unknown_keys("[cycle\nphases =").is_empty());
    }
}
