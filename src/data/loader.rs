use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value as YamlValue};

use super::model::{Dataset, Record, Value};
use crate::config::scalar::scalar_text;

// ---------------------------------------------------------------------------
// Perflog reader
// ---------------------------------------------------------------------------

/// Fields every perflog must carry. Entries starting with `*` match any
/// column with that suffix.
const REQUIRED_LOG_FIELDS: [&str; 4] = ["job_completion_time", "*_value", "*_unit", "display_name"];

/// Fields holding a `{'key': value, ...}` mapping, expanded into one column
/// per key.
const DICT_LOG_FIELDS: [&str; 2] = ["extra_resources", "env_vars"];

/// Parse a pipe-delimited performance log into a [`Dataset`].
///
/// Layout: a header row, then one record per line:
/// ```text
/// job_completion_time|display_name|flops_value|flops_unit
/// 2024-01-01T10:00:00|Stream %tasks=4 %cpus=2|12.5|Gflops/s
/// ```
/// `display_name` is replaced by a `test_name` column followed by one column
/// per `%param=value` pair, inserted where `display_name` was. The
/// `extra_resources` and `env_vars` mappings are replaced the same way, one
/// column per key, nested keys joined with `.`.
pub fn read_perflog<R: Read>(reader: R) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(false)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading perflog headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<&str> = REQUIRED_LOG_FIELDS
        .iter()
        .copied()
        .filter(|field| !headers.iter().any(|h| field_matches(field, h)))
        .collect();
    if !missing.is_empty() {
        bail!("Perflog missing one or more required fields: {missing:?}");
    }
    let display_idx = headers
        .iter()
        .position(|h| h == "display_name")
        .context("perflog missing 'display_name' column")?;

    // Header index → columns that replace it, in first-seen order.
    let mut expanded: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("perflog row {row_no}"))?;

        let mut row = Record::new();
        for (col_idx, value) in record.iter().enumerate() {
            let header = &headers[col_idx];
            let entries = if col_idx == display_idx {
                let (test_name, params) = display_name_info(value);
                row.insert("test_name".to_string(), Value::Str(test_name));
                params
            } else if DICT_LOG_FIELDS.contains(&header.as_str()) {
                dict_field_info(value).with_context(|| format!("parsing '{header}' in perflog row {row_no}"))?
            } else {
                row.insert(header.clone(), guess_value_type(value));
                continue;
            };
            let names = expanded.entry(col_idx).or_default();
            for (key, val) in entries {
                if !names.contains(&key) {
                    names.push(key.clone());
                }
                row.insert(key, guess_value_type(&val));
            }
        }
        rows.push(row);
    }

    let mut columns: Vec<String> = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        if idx == display_idx {
            columns.push("test_name".to_string());
        }
        match expanded.get(&idx) {
            Some(names) => columns.extend(names.iter().cloned()),
            None if idx == display_idx || DICT_LOG_FIELDS.contains(&header.as_str()) => {}
            None => columns.push(header.clone()),
        }
    }

    log::info!("Read perflog with {} rows and columns {:?}", rows.len(), columns);
    Ok(Dataset::from_rows(columns, rows))
}

fn field_matches(field: &str, header: &str) -> bool {
    match field.strip_prefix('*') {
        Some(suffix) => header
            .strip_suffix(suffix)
            .is_some_and(|stem| !stem.is_empty() && stem.chars().all(|c| c.is_alphanumeric() || c == '_')),
        None => header == field,
    }
}

/// Split `"Name %p1=a %p2=b"` into the test name and its parameters, in
/// the order written.
pub fn display_name_info(display_name: &str) -> (String, Vec<(String, String)>) {
    let mut parts = display_name.split(" %");
    let test_name = parts.next().unwrap_or_default().trim().to_string();
    let params = parts
        .filter_map(|p| {
            let (key, value) = p.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect();
    (test_name, params)
}

/// Entries of a `{'key': value}` field. The text is read as a YAML flow
/// mapping; nested mappings are flattened to `outer.inner` keys.
fn dict_field_info(text: &str) -> Result<Vec<(String, String)>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mapping: Mapping = serde_yaml::from_str(text).context("expected a mapping")?;
    let mut entries = Vec::new();
    flatten_mapping("", &mapping, &mut entries);
    Ok(entries)
}

fn flatten_mapping(prefix: &str, mapping: &Mapping, entries: &mut Vec<(String, String)>) {
    for (key, value) in mapping {
        let key = scalar_text(key).unwrap_or_else(|| format!("{key:?}"));
        let key = if prefix.is_empty() { key } else { format!("{prefix}.{key}") };
        match value {
            YamlValue::Mapping(inner) => flatten_mapping(&key, inner, entries),
            YamlValue::Null => entries.push((key, String::new())),
            other => {
                let text = scalar_text(other).unwrap_or_else(|| format!("{other:?}"));
                entries.push((key, text));
            }
        }
    }
}

fn guess_value_type(s: &str) -> Value {
    let s = s.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Str(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::NativeType;

    const LOG: &str = "\
job_completion_time|display_name|system|flops_value|flops_unit
2024-01-01T10:00:00|StreamTest %tasks=2 %cpus=1|archer2|10.5|Gflops/s
2024-01-01T11:00:00|StreamTest %tasks=4 %cpus=1|archer2|19.0|Gflops/s
";

    #[test]
    fn display_name_is_split_into_parameters() {
        let (name, params) = display_name_info("TestName %param1=one %param2=two %param3=three");
        assert_eq!(name, "TestName");
        assert_eq!(params.len(), 3);
        assert_eq!(params[1], ("param2".to_string(), "two".to_string()));

        let (_, params) = display_name_info("TestName");
        assert!(params.is_empty());
    }

    #[test]
    fn perflog_rows_become_typed_columns() {
        let ds = read_perflog(LOG.as_bytes()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(
            ds.column_names,
            vec!["job_completion_time", "test_name", "tasks", "cpus", "system", "flops_value", "flops_unit"]
        );
        assert_eq!(ds.dtype("tasks"), Some(NativeType::Int64));
        assert_eq!(ds.dtype("flops_value"), Some(NativeType::Float64));
        assert_eq!(ds.value(1, "test_name"), &Value::Str("StreamTest".into()));
    }

    #[test]
    fn mapping_fields_are_expanded_in_place() {
        let log = "\
job_completion_time|display_name|extra_resources|env_vars|flops_value|flops_unit
2024-01-01|T %tasks=2|{'memory': {'size': '2GB'}}|{'OMP_NUM_THREADS': '4', 'OMP_PLACES': 'cores'}|1.5|GB/s
2024-01-02|T %tasks=4|{}|{'OMP_NUM_THREADS': 8}|2.5|GB/s
";
        let ds = read_perflog(log.as_bytes()).unwrap();
        assert_eq!(
            ds.column_names,
            vec![
                "job_completion_time",
                "test_name",
                "tasks",
                "memory.size",
                "OMP_NUM_THREADS",
                "OMP_PLACES",
                "flops_value",
                "flops_unit"
            ]
        );
        assert_eq!(ds.value(0, "OMP_NUM_THREADS"), &Value::Int(4));
        assert_eq!(ds.value(1, "OMP_NUM_THREADS"), &Value::Int(8));
        assert_eq!(ds.value(0, "memory.size"), &Value::Str("2GB".into()));
        assert_eq!(ds.value(1, "memory.size"), &Value::Null);
        assert_eq!(ds.value(1, "OMP_PLACES"), &Value::Null);
        assert!(!ds.has_column("env_vars"));
    }

    #[test]
    fn malformed_mapping_field_is_reported() {
        let log = "job_completion_time|display_name|env_vars|flops_value|flops_unit\n2024-01-01|T|[1, 2]|1|GB/s\n";
        let err = read_perflog(log.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("env_vars"), "{err:#}");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let log = "job_completion_time|display_name|flops_unit\n2024-01-01|T|GB/s\n";
        let err = read_perflog(log.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("*_value"));
    }
}
