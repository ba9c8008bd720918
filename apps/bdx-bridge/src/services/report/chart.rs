use chrono::NaiveDate;

use crate::error::RenderError;
use crate::services::reshape::TrendRow;

/// Rectangle in page millimetres, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PlotArea {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }
}

/// Trend rows projected into a plot area.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartGeometry {
    pub area: PlotArea,
    pub points: Vec<(f32, f32)>,
    pub value_min: f64,
    pub value_max: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

impl ChartGeometry {
    pub fn fit(trend: &[TrendRow], area: PlotArea) -> Result<Self, RenderError> {
        let first_date = trend
            .iter()
            .map(|row| row.date)
            .min()
            .ok_or(RenderError::EmptyTrend)?;
        let last_date = trend
            .iter()
            .map(|row| row.date)
            .max()
            .ok_or(RenderError::EmptyTrend)?;

        let (mut value_min, mut value_max) = trend
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
                (lo.min(row.value), hi.max(row.value))
            });
        // Flat series: open a band around the single value so it plots mid-height.
        if (value_max - value_min).abs() < f64::EPSILON {
            let pad = (value_max.abs() * 0.1).max(1.0);
            value_min -= pad;
            value_max += pad;
        }

        let span_days = (last_date - first_date).num_days();
        let points = trend
            .iter()
            .map(|row| {
                let x_frac = if span_days == 0 {
                    0.5
                } else {
                    (row.date - first_date).num_days() as f64 / span_days as f64
                };
                let y_frac = (row.value - value_min) / (value_max - value_min);
                (
                    area.x + (x_frac as f32) * area.width,
                    area.y + (y_frac as f32) * area.height,
                )
            })
            .collect();

        Ok(Self {
            area,
            points,
            value_min,
            value_max,
            first_date,
            last_date,
        })
    }

    /// Evenly spaced `(y, value)` ticks from the bottom to the top of the plot area.
    pub fn value_ticks(&self, count: usize) -> Vec<(f32, f64)> {
        if count < 2 {
            return vec![(self.area.y, self.value_min)];
        }
        (0..count)
            .map(|i| {
                let frac = i as f64 / (count - 1) as f64;
                (
                    self.area.y + (frac as f32) * self.area.height,
                    self.value_min + frac * (self.value_max - self.value_min),
                )
            })
            .collect()
    }
}
