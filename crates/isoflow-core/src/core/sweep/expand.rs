use super::{SweepError, SweepOptions, SweepSpec};
use crate::core::models::record::ParameterRecord;
use crate::core::models::value::ParamValue;
use serde_json::{Map, Value};
use tracing::debug;

/// Expands a sweep into every parameter combination it describes.
///
/// Parameters are crossed in the insertion order of the spec with the last
/// parameter varying fastest; the defaults are appended to every record in
/// their own insertion order. The result depends only on `spec` and `options`.
pub fn expand(spec: &SweepSpec, options: &SweepOptions) -> Result<Vec<ParameterRecord>, SweepError> {
    if let Some(name) = spec
        .defaults
        .keys()
        .find(|name| spec.parameters.contains_key(*name))
    {
        return Err(SweepError::KeyCollision { name: name.clone() });
    }

    let mut axes: Vec<(&str, Vec<ParamValue>)> = Vec::with_capacity(spec.parameters.len());
    for (name, value) in &spec.parameters {
        let values = if *name == options.range_parameter {
            range_values(name, value, &spec.parameters, &options.count_field)?
        } else {
            list_values(name, value)?
        };
        axes.push((name.as_str(), values));
    }

    let defaults = spec
        .defaults
        .iter()
        .map(|(name, value)| {
            ParamValue::from_json(value)
                .map(|v| (name.clone(), v))
                .map_err(|e| SweepError::malformed(name.as_str(), e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total: usize = axes.iter().map(|(_, values)| values.len()).product();
    debug!(
        "Expanding {} parameter axes into {} records",
        axes.len(),
        total
    );

    let mut records = Vec::with_capacity(total);
    let mut cursor = vec![0usize; axes.len()];
    for _ in 0..total {
        let mut record = ParameterRecord::new();
        for ((name, values), &i) in axes.iter().zip(&cursor) {
            record.insert(*name, values[i].clone());
        }
        for (name, value) in &defaults {
            record.insert(name.clone(), value.clone());
        }
        records.push(record);

        for (slot, (_, values)) in cursor.iter_mut().zip(&axes).rev() {
            *slot += 1;
            if *slot < values.len() {
                break;
            }
            *slot = 0;
        }
    }
    Ok(records)
}

fn list_values(name: &str, value: &Value) -> Result<Vec<ParamValue>, SweepError> {
    let items: Vec<&Value> = match value {
        Value::Array(items) if items.is_empty() => {
            return Err(SweepError::malformed(name, "list of values is empty"));
        }
        // An array of arrays is a list of triples; a bare 3-integer array stays a
        // list of three integers, matching how every other list is read.
        Value::Array(items) => items.iter().collect(),
        scalar => vec![scalar],
    };
    items
        .into_iter()
        .map(|item| {
            ParamValue::from_json(item).map_err(|e| SweepError::malformed(name, e.to_string()))
        })
        .collect()
}

fn range_values(
    name: &str,
    value: &Value,
    parameters: &Map<String, Value>,
    count_field: &str,
) -> Result<Vec<ParamValue>, SweepError> {
    let (min, max, count) = match value {
        Value::Array(bounds) if bounds.len() == 2 => {
            let count = parameters.get(count_field).ok_or_else(|| {
                SweepError::malformed(
                    name,
                    format!("two bounds given but '{}' is missing", count_field),
                )
            })?;
            (
                number(name, &bounds[0])?,
                number(name, &bounds[1])?,
                count_value(count_field, count)?,
            )
        }
        Value::Array(bounds) => {
            return Err(SweepError::malformed(
                name,
                format!(
                    "a range list takes exactly 2 bounds, found {}; use {{min, max, count}} for a counted range or {{values: [...]}} for explicit points",
                    bounds.len()
                ),
            ));
        }
        Value::Object(fields) if fields.contains_key("values") => {
            return list_values(name, &fields["values"]);
        }
        Value::Object(fields) => {
            let get = |key: &str| {
                fields.get(key).ok_or_else(|| {
                    SweepError::malformed(name, format!("range object is missing '{}'", key))
                })
            };
            (
                number(name, get("min")?)?,
                number(name, get("max")?)?,
                count_value(name, get("count")?)?,
            )
        }
        scalar => return list_values(name, scalar),
    };
    Ok(linear_points(min, max, count)
        .into_iter()
        .map(ParamValue::Float)
        .collect())
}

fn number(name: &str, value: &Value) -> Result<f64, SweepError> {
    value
        .as_f64()
        .ok_or_else(|| SweepError::malformed(name, format!("bound {} is not numeric", value)))
}

fn count_value(name: &str, value: &Value) -> Result<usize, SweepError> {
    let count = value
        .as_u64()
        .ok_or_else(|| SweepError::malformed(name, format!("count {} is not an integer", value)))?;
    if count < 2 {
        return Err(SweepError::malformed(
            name,
            format!("count must be at least 2, got {}", count),
        ));
    }
    usize::try_from(count).map_err(|_| SweepError::malformed(name, "count is too large"))
}

fn linear_points(min: f64, max: f64, count: usize) -> Vec<f64> {
    let step = (max - min) / (count - 1) as f64;
    let mut points: Vec<f64> = (0..count).map(|i| min + step * i as f64).collect();
    if let Some(last) = points.last_mut() {
        *last = max;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> SweepSpec {
        SweepSpec::from_value(value).unwrap()
    }

    fn names(record: &ParameterRecord) -> Vec<&str> {
        record.names().collect()
    }

    #[test]
    fn record_count_is_product_of_list_sizes() {
        let s = spec(json!({
            "parameters": {
                "structure": ["A", "B", "C"],
                "molecule_name": ["CO2", "N2"],
                "temperature": 298,
                "charge_method": ["EQeq", "None"]
            },
            "defaults": {"cycles": 100, "forcefield": "GenericMOFs"}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        assert_eq!(records.len(), 3 * 2 * 2);
        for record in &records {
            assert_eq!(
                names(record),
                [
                    "structure",
                    "molecule_name",
                    "temperature",
                    "charge_method",
                    "cycles",
                    "forcefield"
                ]
            );
            assert_eq!(record.get("cycles"), Some(&ParamValue::Int(100)));
        }
    }

    #[test]
    fn last_parameter_varies_fastest() {
        let s = spec(json!({
            "parameters": {"a": [1, 2], "b": ["x", "y"]},
            "defaults": {}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        let pairs: Vec<_> = records
            .iter()
            .map(|r| (r.get("a").unwrap().to_string(), r.text("b").unwrap().to_string()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("1".to_string(), "x".to_string()),
                ("1".to_string(), "y".to_string()),
                ("2".to_string(), "x".to_string()),
                ("2".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn expansion_is_deterministic() {
        let s = spec(json!({
            "parameters": {"gas": ["CO2", "CH4"], "pressure": [10, 1000], "npoints": 4},
            "defaults": {"unit_cells": [2, 2, 2]}
        }));
        let first = expand(&s, &SweepOptions::default()).unwrap();
        let second = expand(&s, &SweepOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn range_object_yields_evenly_spaced_points_with_exact_endpoints() {
        let s = spec(json!({
            "parameters": {"pressure": {"min": 10, "max": 1000000, "count": 5}},
            "defaults": {}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        let values: Vec<f64> = records
            .iter()
            .map(|r| r.get("pressure").unwrap().as_f64().unwrap())
            .collect();
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], 10.0);
        assert_eq!(values[4], 1000000.0);
        let step = (1000000.0 - 10.0) / 4.0;
        for pair in values.windows(2) {
            assert!((pair[1] - pair[0] - step).abs() < 1e-6);
        }
    }

    #[test]
    fn range_with_count_field_keeps_count_as_bookkeeping() {
        let s = spec(json!({
            "parameters": {"pressure": [1e4, 1e6], "npoints": 3, "molecule_name": "CO2"},
            "defaults": {}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.get("npoints") == Some(&ParamValue::Int(3))));
        assert_eq!(records[1].get("pressure"), Some(&ParamValue::Float(505000.0)));
    }

    #[test]
    fn scalar_range_parameter_is_a_single_point() {
        let s = spec(json!({
            "parameters": {"pressure": 1000, "molecule_name": ["CO2", "N2"]},
            "defaults": {}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.get("pressure") == Some(&ParamValue::Int(1000))));
    }

    #[test]
    fn three_element_range_list_is_not_guessed() {
        let s = spec(json!({
            "parameters": {"pressure": [10, 100, 1000]},
            "defaults": {}
        }));
        let err = expand(&s, &SweepOptions::default()).unwrap_err();
        assert!(matches!(err, SweepError::MalformedSpec { ref field, .. } if field == "pressure"));
    }

    #[test]
    fn range_count_below_two_is_malformed() {
        let s = spec(json!({
            "parameters": {"pressure": {"min": 1, "max": 2, "count": 1}},
            "defaults": {}
        }));
        let err = expand(&s, &SweepOptions::default()).unwrap_err();
        assert!(matches!(err, SweepError::MalformedSpec { ref field, .. } if field == "pressure"));
    }

    #[test]
    fn explicit_values_bypass_range_interpretation() {
        let s = spec(json!({
            "parameters": {"pressure": {"values": [10, 100, 1000]}},
            "defaults": {}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        let values: Vec<_> = records.iter().map(|r| r.get("pressure").cloned().unwrap()).collect();
        assert_eq!(
            values,
            [ParamValue::Int(10), ParamValue::Int(100), ParamValue::Int(1000)]
        );
    }

    #[test]
    fn wrong_bound_count_is_malformed() {
        let s = spec(json!({
            "parameters": {"pressure": [1, 2, 3, 4]},
            "defaults": {}
        }));
        assert!(matches!(
            expand(&s, &SweepOptions::default()),
            Err(SweepError::MalformedSpec { .. })
        ));
    }

    #[test]
    fn two_bounds_without_count_field_is_malformed() {
        let s = spec(json!({
            "parameters": {"pressure": [1, 2]},
            "defaults": {}
        }));
        assert!(matches!(
            expand(&s, &SweepOptions::default()),
            Err(SweepError::MalformedSpec { .. })
        ));
    }

    #[test]
    fn empty_list_is_malformed_and_names_field() {
        let s = spec(json!({
            "parameters": {"structure": []},
            "defaults": {}
        }));
        let err = expand(&s, &SweepOptions::default()).unwrap_err();
        assert!(err.to_string().contains("structure"));
    }

    #[test]
    fn default_colliding_with_parameter_is_rejected() {
        let s = spec(json!({
            "parameters": {"temperature": [298, 308]},
            "defaults": {"temperature": 298}
        }));
        assert!(matches!(
            expand(&s, &SweepOptions::default()),
            Err(SweepError::KeyCollision { ref name }) if name == "temperature"
        ));
    }

    #[test]
    fn list_of_triples_is_swept_and_triple_default_is_kept() {
        let s = spec(json!({
            "parameters": {"unit_cells": [[1, 1, 1], [2, 2, 2]]},
            "defaults": {"grid": [3, 3, 3]}
        }));
        let records = expand(&s, &SweepOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("unit_cells"), Some(&ParamValue::Triple([2, 2, 2])));
        assert_eq!(records[0].get("grid"), Some(&ParamValue::Triple([3, 3, 3])));
    }

    #[test]
    fn custom_range_parameter_is_honoured() {
        let s = spec(json!({
            "parameters": {"temperature": [200, 300], "samples": 2, "pressure": [1, 2]},
            "defaults": {}
        }));
        let options = SweepOptions {
            range_parameter: "temperature".into(),
            count_field: "samples".into(),
        };
        let records = expand(&s, &options).unwrap();
        // temperature range (2) x samples (1) x pressure list (2)
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].get("pressure"), Some(&ParamValue::Int(1)));
    }
}
