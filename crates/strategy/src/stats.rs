/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`); `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}
