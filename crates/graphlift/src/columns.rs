use crate::output::FeatureMatrix;
use crate::Error;

/// A typed column of one requested field, filled in document order by a
/// single shard worker and concatenated with sibling shards at merge time.
///
/// Dimensionality is fixed by the first array value observed; until then the
/// column stays `Pending` and missing values are only counted, to be
/// backfilled as zeros once the shape is known.
#[derive(Debug)]
pub enum ColumnData {
    Pending { rows: usize, capacity: usize },
    Scalar(Vec<f64>),
    Rows { dim: usize, data: Vec<f64> },
}

impl ColumnData {
    /// A fresh column, hinted with the shard's expected document count.
    pub fn with_capacity(capacity: usize) -> Self {
        ColumnData::Pending { rows: 0, capacity }
    }

    pub fn rows(&self) -> usize {
        match self {
            ColumnData::Pending { rows, .. } => *rows,
            ColumnData::Scalar(values) => values.len(),
            ColumnData::Rows { dim, data } => data.len() / dim.max(&1),
        }
    }

    /// Append one document's value for this column.
    pub fn push_value(
        &mut self,
        collection: &str,
        field: &str,
        value: Option<&serde_json::Value>,
    ) -> crate::Result<()> {
        match value {
            None | Some(serde_json::Value::Null) => {
                self.push_missing();
                Ok(())
            }
            Some(serde_json::Value::Number(number)) => {
                let number = number.as_f64().ok_or_else(|| Error::TypeError {
                    collection: collection.to_string(),
                    field: field.to_string(),
                    expected: "numeric",
                })?;
                self.push_number(collection, field, number)
            }
            Some(serde_json::Value::Array(values)) => {
                let mut row = Vec::with_capacity(values.len());
                for value in values {
                    match value.as_f64() {
                        Some(number) => row.push(number),
                        None => {
                            return Err(Error::TypeError {
                                collection: collection.to_string(),
                                field: field.to_string(),
                                expected: "numeric array",
                            })
                        }
                    }
                }
                self.push_row(collection, field, &row)
            }
            Some(_) => Err(Error::TypeError {
                collection: collection.to_string(),
                field: field.to_string(),
                expected: "numeric",
            }),
        }
    }

    fn push_missing(&mut self) {
        match self {
            ColumnData::Pending { rows, .. } => *rows += 1,
            ColumnData::Scalar(values) => values.push(0.0),
            ColumnData::Rows { dim, data } => data.resize(data.len() + *dim, 0.0),
        }
    }

    fn push_number(&mut self, collection: &str, field: &str, number: f64) -> crate::Result<()> {
        match self {
            ColumnData::Pending { rows, capacity } => {
                let mut values = Vec::with_capacity((*capacity).max(*rows + 1));
                values.resize(*rows, 0.0);
                values.push(number);
                *self = ColumnData::Scalar(values);
                Ok(())
            }
            ColumnData::Scalar(values) => {
                values.push(number);
                Ok(())
            }
            ColumnData::Rows { dim, .. } => Err(Error::ShapeMismatch {
                collection: collection.to_string(),
                field: field.to_string(),
                expected: *dim,
                actual: 1,
            }),
        }
    }

    fn push_row(&mut self, collection: &str, field: &str, row: &[f64]) -> crate::Result<()> {
        // A zero-length row carries no dimension information; count it as
        // missing so a later row may still fix the width.
        if row.is_empty() {
            self.push_missing();
            return Ok(());
        }
        match self {
            ColumnData::Pending { rows, capacity } => {
                let dim = row.len();
                let mut data = Vec::with_capacity((*capacity).max(*rows + 1) * dim);
                data.resize(*rows * dim, 0.0);
                data.extend_from_slice(row);
                *self = ColumnData::Rows { dim, data };
                Ok(())
            }
            ColumnData::Scalar(_) => Err(Error::ShapeMismatch {
                collection: collection.to_string(),
                field: field.to_string(),
                expected: 1,
                actual: row.len(),
            }),
            ColumnData::Rows { dim, data } => {
                if row.len() != *dim {
                    return Err(Error::ShapeMismatch {
                        collection: collection.to_string(),
                        field: field.to_string(),
                        expected: *dim,
                        actual: row.len(),
                    });
                }
                data.extend_from_slice(row);
                Ok(())
            }
        }
    }

    /// Concatenate a later shard's segment onto this one. Shards that saw
    /// only missing values adopt whichever shape the other side fixed.
    pub fn append(&mut self, other: ColumnData, collection: &str, field: &str) -> crate::Result<()> {
        match (&mut *self, other) {
            (ColumnData::Pending { rows, .. }, ColumnData::Pending { rows: more, .. }) => {
                *rows += more;
                Ok(())
            }
            (ColumnData::Pending { rows, .. }, ColumnData::Scalar(tail)) => {
                let mut values = vec![0.0; *rows];
                values.extend(tail);
                *self = ColumnData::Scalar(values);
                Ok(())
            }
            (ColumnData::Pending { rows, .. }, ColumnData::Rows { dim, data: tail }) => {
                let mut data = vec![0.0; *rows * dim];
                data.extend(tail);
                *self = ColumnData::Rows { dim, data };
                Ok(())
            }
            (ColumnData::Scalar(values), ColumnData::Pending { rows, .. }) => {
                values.resize(values.len() + rows, 0.0);
                Ok(())
            }
            (ColumnData::Scalar(values), ColumnData::Scalar(tail)) => {
                values.extend(tail);
                Ok(())
            }
            (ColumnData::Scalar(_), ColumnData::Rows { dim, .. }) => Err(Error::ShapeMismatch {
                collection: collection.to_string(),
                field: field.to_string(),
                expected: 1,
                actual: dim,
            }),
            (ColumnData::Rows { dim, data }, ColumnData::Pending { rows, .. }) => {
                data.resize(data.len() + rows * *dim, 0.0);
                Ok(())
            }
            (ColumnData::Rows { dim, .. }, ColumnData::Scalar(_)) => Err(Error::ShapeMismatch {
                collection: collection.to_string(),
                field: field.to_string(),
                expected: *dim,
                actual: 1,
            }),
            (
                ColumnData::Rows { dim, data },
                ColumnData::Rows {
                    dim: other_dim,
                    data: tail,
                },
            ) => {
                if other_dim != *dim {
                    return Err(Error::ShapeMismatch {
                        collection: collection.to_string(),
                        field: field.to_string(),
                        expected: *dim,
                        actual: other_dim,
                    });
                }
                data.extend(tail);
                Ok(())
            }
        }
    }

    pub fn into_matrix(self) -> FeatureMatrix {
        match self {
            ColumnData::Pending { rows, .. } => FeatureMatrix::new(rows, 1, vec![0.0; rows]),
            ColumnData::Scalar(values) => FeatureMatrix::new(values.len(), 1, values),
            ColumnData::Rows { dim, data } => {
                let rows = data.len() / dim.max(1);
                FeatureMatrix::new(rows, dim, data)
            }
        }
    }
}
