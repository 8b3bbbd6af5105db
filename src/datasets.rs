//! The sine dataset and a utility for plotting the fit against it
//!
//! By convention the target curve is plotted in blue and the prediction in red.

use std::error::Error;

use plotters::{
    chart::ChartBuilder,
    prelude::{BitMapBackend, IntoDrawingArea, LineSeries},
    style::{BLUE, RED, WHITE},
};

use crate::tensor::Tensor;

/// Number of samples, `arange(-10, 10, 0.1)`
pub const N_SAMPLES: usize = 200;
pub const X_START: f32 = -10.0;
pub const X_STEP: f32 = 0.1;

/// `y = sin(x)` sampled on an evenly spaced grid, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct SineDataset {
    x: Vec<f32>,
    y: Vec<f32>,
}

impl SineDataset {
    pub fn new() -> Self {
        let x: Vec<f32> = (0..N_SAMPLES)
            .map(|i| X_START + i as f32 * X_STEP)
            .collect();
        let y = x.iter().map(|v| v.sin()).collect();
        Self { x, y }
    }

    pub fn x(&self) -> &[f32] {
        &self.x
    }

    pub fn y(&self) -> &[f32] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The inputs as an `(n, 1)` tensor
    pub fn inputs(&self) -> Tensor {
        Tensor::column(&self.x)
    }

    /// The targets as an `(n, 1)` tensor
    pub fn targets(&self) -> Tensor {
        Tensor::column(&self.y)
    }
}

impl Default for SineDataset {
    fn default() -> Self {
        Self::new()
    }
}

/// Smallest and largest finite value across the given series, padded by 10%
pub fn y_range<'a>(series: impl IntoIterator<Item = &'a [f32]>) -> (f32, f32) {
    let (lo, hi) = series
        .into_iter()
        .flat_map(|s| s.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return (-1.0, 1.0);
    }
    let pad = ((hi - lo) * 0.1).max(0.1);
    (lo - pad, hi + pad)
}

/// Plots the target curve and the current prediction of the model
pub fn plot_fit(
    dataset: &SineDataset,
    prediction: &[f32],
    step: usize,
    file_name: &str,
) -> Result<(), Box<dyn Error>> {
    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let (y_min, y_max) = y_range([dataset.y(), prediction]);
    let x_min = dataset.x().first().copied().unwrap_or(X_START);
    let x_max = dataset.x().last().copied().unwrap_or(-X_START);

    let mut chart = ChartBuilder::on(&root_area)
        .caption(format!("Sine fit, step {}", step), ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart.configure_mesh().draw()?;

    chart.draw_series(LineSeries::new(
        dataset.x().iter().copied().zip(dataset.y().iter().copied()),
        &BLUE,
    ))?;

    chart.draw_series(LineSeries::new(
        dataset
            .x()
            .iter()
            .copied()
            .zip(prediction.iter().copied())
            .filter(|(_, y)| y.is_finite()),
        &RED,
    ))?;

    root_area.present()?;
    log::info!("Fit plot has been saved to '{}'.", file_name);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;

    #[test]
    fn test_dataset_shape() {
        let dataset = SineDataset::new();
        assert_eq!(dataset.len(), N_SAMPLES);
        assert_eq!(dataset.x().len(), dataset.y().len());
        assert_eq!(dataset.inputs().shape(), (200, 1));
        assert_eq!(dataset.targets().shape(), (200, 1));
    }

    #[test]
    fn test_dataset_values() {
        let dataset = SineDataset::new();
        assert_eq!(dataset.x()[0], -10.0);
        assert_eq_float!(dataset.x()[N_SAMPLES - 1], 9.9);
        for (x, y) in dataset.x().iter().zip(dataset.y()) {
            assert_eq!(*y, x.sin());
        }
        // evenly spaced
        for w in dataset.x().windows(2) {
            assert_eq_float!(w[1] - w[0], X_STEP);
        }
    }

    #[test]
    fn test_y_range() {
        let a = [-1.0, 0.5];
        let b = [2.0, f32::NAN];
        let (lo, hi) = y_range([a.as_slice(), b.as_slice()]);
        assert_eq_float!(lo, -1.3);
        assert_eq_float!(hi, 2.3);

        assert_eq!(y_range([[f32::NAN].as_slice()]), (-1.0, 1.0));
    }
}
