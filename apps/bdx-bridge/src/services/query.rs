use serde::{Deserialize, Serialize};

use crate::error::InvalidQueryError;
use crate::time::TimeWindow;

pub const DEFAULT_PROPERTY: &str = "value";

/// One queryable series: a property of a component in the BDX hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(rename = "componentPathId")]
    pub component_id: i64,
    #[serde(rename = "propertyName")]
    pub property_name: String,
}

impl PropertyDescriptor {
    pub fn new(component_id: i64, property_name: impl Into<String>) -> Self {
        Self {
            component_id,
            property_name: property_name.into(),
        }
    }

    /// Column label used in logs, e.g. `1234_value`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.component_id, self.property_name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationLevel {
    #[default]
    Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendQuery {
    pub properties: Vec<PropertyDescriptor>,
    pub window: TimeWindow,
    pub aggregation: AggregationLevel,
}

impl TrendQuery {
    pub fn build(component_ids: &[i64], properties: &[String], window: TimeWindow) -> Self {
        Self {
            properties: build_property_descriptors(component_ids, properties),
            window,
            aggregation: AggregationLevel::Point,
        }
    }
}

pub fn parse_component_ids(raw: &str) -> Result<Vec<i64>, InvalidQueryError> {
    if raw.trim().is_empty() {
        return Err(InvalidQueryError::MissingComponentIds);
    }
    raw.split(',')
        .map(str::trim)
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| InvalidQueryError::InvalidComponentId(part.to_string()))
        })
        .collect()
}

pub fn parse_properties(raw: Option<&str>) -> Vec<String> {
    let properties: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect();
    if properties.is_empty() {
        return vec![DEFAULT_PROPERTY.to_string()];
    }
    properties
}

/// Cartesian product, component-major: every property of the first component, then
/// every property of the second, and so on.
pub fn build_property_descriptors(
    component_ids: &[i64],
    properties: &[String],
) -> Vec<PropertyDescriptor> {
    component_ids
        .iter()
        .flat_map(|component_id| {
            properties
                .iter()
                .map(move |property| PropertyDescriptor::new(*component_id, property.clone()))
        })
        .collect()
}
