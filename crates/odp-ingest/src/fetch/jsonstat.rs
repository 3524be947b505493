//! JSON-stat 2.0 dataset flattening
//!
//! The cube is walked in row-major order (last dimension varies fastest).
//! Each output row holds one category label per dimension, in the dataset's
//! `id` order, followed by a `value` column. Cells whose value is null or
//! absent are skipped.

use std::collections::HashMap;

use odp_common::{Cell, Table};
use serde::Deserialize;
use serde_json::Value;

use super::error::DecodeError;

/// Name of the observation column
pub const VALUE_COLUMN: &str = "value";

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    class: Option<String>,
    id: Vec<String>,
    size: Vec<usize>,
    dimension: HashMap<String, Dimension>,
    value: Values,
}

#[derive(Debug, Deserialize)]
struct Dimension {
    #[serde(default)]
    label: Option<String>,
    category: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(default)]
    index: Option<CategoryIndex>,
    #[serde(default)]
    label: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CategoryIndex {
    Ordered(Vec<String>),
    Positions(HashMap<String, usize>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Values {
    Dense(Vec<Value>),
    Sparse(HashMap<String, Value>),
}

/// Category labels of one dimension, in index order
struct Axis {
    name: String,
    labels: Vec<String>,
}

impl Dimension {
    fn into_axis(self, id: &str, size: usize) -> Result<Axis, DecodeError> {
        let codes = match self.category.index {
            Some(CategoryIndex::Ordered(codes)) => codes,
            Some(CategoryIndex::Positions(positions)) => {
                let mut codes = vec![None; positions.len()];
                for (code, position) in positions {
                    let slot = codes.get_mut(position).ok_or_else(|| {
                        DecodeError::new(format!(
                            "dimension '{id}' has category index {position} out of range"
                        ))
                    })?;
                    *slot = Some(code);
                }
                codes
                    .into_iter()
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| DecodeError::new(format!("dimension '{id}' has gaps in its category index")))?
            },
            None if self.category.label.len() == 1 => self.category.label.keys().cloned().collect(),
            None => {
                return Err(DecodeError::new(format!(
                    "dimension '{id}' has no category index"
                )))
            },
        };

        if codes.len() != size {
            return Err(DecodeError::new(format!(
                "dimension '{id}' declares size {size} but has {} categories",
                codes.len()
            )));
        }

        let labels = codes
            .into_iter()
            .map(|code| self.category.label.get(&code).cloned().unwrap_or(code))
            .collect();

        Ok(Axis {
            name: self.label.unwrap_or_else(|| id.to_string()),
            labels,
        })
    }
}

fn value_cell(value: &Value) -> Option<Cell> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => Cell::Real(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => Some(Cell::Str(s.clone())),
        Value::Bool(b) => Some(Cell::Str(b.to_string())),
        other => Some(Cell::Str(other.to_string())),
    }
}

/// Flatten a JSON-stat 2.0 dataset into a table
pub fn decode(value: Value) -> Result<Table, DecodeError> {
    let dataset: Dataset = serde_json::from_value(value)
        .map_err(|e| DecodeError::new(format!("not a JSON-stat dataset: {e}")))?;

    if let Some(class) = dataset.class.as_deref() {
        if class != "dataset" {
            return Err(DecodeError::new(format!(
                "unsupported JSON-stat class '{class}'"
            )));
        }
    }
    if dataset.id.len() != dataset.size.len() {
        return Err(DecodeError::new("'id' and 'size' differ in length"));
    }

    let Dataset {
        id,
        size,
        mut dimension,
        value,
        ..
    } = dataset;

    let axes = id
        .iter()
        .zip(&size)
        .map(|(dim_id, &dim_size)| {
            dimension
                .remove(dim_id)
                .ok_or_else(|| DecodeError::new(format!("dimension '{dim_id}' is missing")))?
                .into_axis(dim_id, dim_size)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total: usize = size.iter().product();
    let mut headers: Vec<String> = axes.iter().map(|a| a.name.clone()).collect();
    headers.push(VALUE_COLUMN.to_string());
    let mut table = Table::empty(headers);

    let observation = |flat: usize| -> Option<Cell> {
        match &value {
            Values::Dense(values) => values.get(flat).and_then(value_cell),
            Values::Sparse(values) => values.get(&flat.to_string()).and_then(value_cell),
        }
    };

    if let Values::Dense(values) = &value {
        if values.len() != total {
            return Err(DecodeError::new(format!(
                "expected {total} values, found {}",
                values.len()
            )));
        }
    }

    let mut coords = vec![0usize; axes.len()];
    for flat in 0..total {
        let mut rem = flat;
        for d in (0..axes.len()).rev() {
            coords[d] = rem % size[d];
            rem /= size[d];
        }

        let Some(cell) = observation(flat) else {
            continue;
        };

        let mut row: Vec<Cell> = axes
            .iter()
            .zip(&coords)
            .map(|(axis, &i)| Cell::Str(axis.labels[i].clone()))
            .collect();
        row.push(cell);
        table.push_row(row)?;
    }

    Ok(table)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cube(values: Value) -> Value {
        json!({
            "version": "2.0",
            "class": "dataset",
            "id": ["Region", "Tid"],
            "size": [2, 2],
            "dimension": {
                "Region": {
                    "label": "region",
                    "category": {
                        "index": {"4001": 0, "4003": 1},
                        "label": {"4001": "Porsgrunn", "4003": "Skien"}
                    }
                },
                "Tid": {
                    "label": "år",
                    "category": {
                        "index": ["2023", "2024"]
                    }
                }
            },
            "value": values
        })
    }

    #[test]
    fn test_row_major_flattening() {
        let table = decode(cube(json!([1, 2, 3.5, 4]))).unwrap();
        assert_eq!(table.headers(), vec!["region", "år", "value"]);
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.row(1).unwrap(),
            vec![&Cell::from("Porsgrunn"), &Cell::from("2024"), &Cell::Int(2)]
        );
        assert_eq!(
            table.row(2).unwrap(),
            vec![&Cell::from("Skien"), &Cell::from("2023"), &Cell::Real(3.5)]
        );
    }

    #[test]
    fn test_null_values_are_skipped() {
        let table = decode(cube(json!([1, null, null, 4]))).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1).unwrap()[0], &Cell::from("Skien"));
    }

    #[test]
    fn test_sparse_values() {
        let table = decode(cube(json!({"3": 9}))).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.row(0).unwrap(),
            vec![&Cell::from("Skien"), &Cell::from("2024"), &Cell::Int(9)]
        );
    }

    #[test]
    fn test_value_count_mismatch() {
        let err = decode(cube(json!([1, 2, 3]))).unwrap_err();
        assert!(err.0.contains("expected 4 values"));
    }

    #[test]
    fn test_rejects_collections() {
        let err = decode(json!({"class": "collection", "id": [], "size": [], "dimension": {}, "value": []}))
            .unwrap_err();
        assert!(err.0.contains("collection"));
    }
}
