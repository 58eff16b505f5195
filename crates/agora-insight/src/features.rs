//! Feature matrix for clustering: text embeddings plus a time column.

use crate::error::{InsightError, Result};

/// Z-score a single column. A constant column becomes all zeros.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    values
        .iter()
        .map(|v| if std > 0.0 { (v - mean) / std } else { 0.0 })
        .collect()
}

/// Standardise every column of `rows` in place (population variance).
pub fn standardize(rows: &mut [Vec<f64>]) {
    let Some(width) = rows.first().map(Vec::len) else {
        return;
    };
    for col in 0..width {
        let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
        for (row, z) in rows.iter_mut().zip(zscore(&column)) {
            row[col] = z;
        }
    }
}

/// Join embeddings with the z-scored timestamps (seconds) as a last column.
pub fn combine(embeddings: &[Vec<f32>], timestamps: &[i64]) -> Result<Vec<Vec<f64>>> {
    if embeddings.len() != timestamps.len() {
        return Err(InsightError::Features(format!(
            "{} embeddings for {} messages",
            embeddings.len(),
            timestamps.len()
        )));
    }
    let width = embeddings.first().map_or(0, Vec::len);
    if let Some(bad) = embeddings.iter().find(|e| e.len() != width) {
        return Err(InsightError::Features(format!(
            "embedding dimension {} differs from {}",
            bad.len(),
            width
        )));
    }

    let seconds: Vec<f64> = timestamps.iter().map(|t| *t as f64).collect();
    let time = zscore(&seconds);
    Ok(embeddings
        .iter()
        .zip(time)
        .map(|(embedding, t)| {
            let mut row: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
            row.push(t);
            row
        })
        .collect())
}
