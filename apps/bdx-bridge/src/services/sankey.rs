//! Synthetic operating-room KPI dataset rendered as a Plotly Sankey diagram
//! (Building → Air Handler → Operating Room). Standalone; never touches BDX.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

pub const DEFAULT_SEED: u64 = 42;
pub const FIGURE_TITLE: &str = "Weekly KPIs - Operating Rooms";
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const RUNTIME_MIN_HOURS: f64 = 50.0;
const RUNTIME_MAX_HOURS: f64 = 168.0;
const AIR_CHANGES_LOW: f64 = 20.0;
const AIR_CHANGES_HIGH: f64 = 22.0;

const BUILDINGS: &[(&str, &[&str])] = &[
    ("General Hospital", &["GH_AHU1", "GH_AHU2", "GH_AHU3"]),
    ("City Medical Center", &["CMC_AHU1", "CMC_AHU2", "CMC_AHU3"]),
    ("Westside Clinic", &["WC_AHU1", "WC_AHU2"]),
    ("Eastview Hospital", &["EVH_AHU1", "EVH_AHU2", "EVH_AHU3"]),
];

/// Plasma colormap anchors at 0, 0.25, 0.5, 0.75, 1.
const PLASMA: [[u8; 3]; 5] = [
    [0x0d, 0x08, 0x87],
    [0x7e, 0x03, 0xa8],
    [0xcc, 0x47, 0x78],
    [0xf8, 0x95, 0x40],
    [0xf0, 0xf9, 0x21],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    AirChanges,
    Runtime,
    Cost,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::AirChanges,
        Metric::Runtime,
        Metric::Cost,
        Metric::Temperature,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::AirChanges => "AirChanges",
            Metric::Runtime => "Runtime",
            Metric::Cost => "Cost",
            Metric::Temperature => "Temperature",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomRecord {
    pub building: String,
    pub air_handler: String,
    pub operating_room: String,
    pub air_changes: f64,
    pub runtime: f64,
    pub cost: f64,
    pub temperature: f64,
}

impl RoomRecord {
    fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AirChanges => self.air_changes,
            Metric::Runtime => self.runtime,
            Metric::Cost => self.cost,
            Metric::Temperature => self.temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Air handlers per building, in building order.
    pub air_handlers: Vec<(String, Vec<String>)>,
    pub rooms: Vec<RoomRecord>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Generates the synthetic dataset. The same seed always yields the same data.
pub fn generate_dataset(seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);

    let air_handlers: Vec<(String, Vec<String>)> = BUILDINGS
        .iter()
        .map(|(building, candidates)| {
            let count = rng.gen_range(1..=candidates.len());
            let chosen = candidates
                .choose_multiple(&mut rng, count)
                .map(|ahu| ahu.to_string())
                .collect();
            (building.to_string(), chosen)
        })
        .collect();

    let mut room_names: HashMap<String, Vec<String>> = HashMap::new();
    for (_, ahus) in &air_handlers {
        for ahu in ahus {
            let count = rng.gen_range(2..=6);
            room_names.insert(
                ahu.clone(),
                (1..=count).map(|i| format!("{ahu}_OR{i}")).collect(),
            );
        }
    }

    let mut rooms = Vec::new();
    let mut high_outliers = 0;
    let mut low_outliers = 0;
    for (building, ahus) in &air_handlers {
        for ahu in ahus {
            for room in room_names.get(ahu).into_iter().flatten() {
                let air_changes = if high_outliers < 3 && building == "General Hospital" {
                    high_outliers += 1;
                    round2(rng.gen_range(23.0..28.0))
                } else if low_outliers < 1 && building == "City Medical Center" {
                    low_outliers += 1;
                    round2(rng.gen_range(17.0..19.0))
                } else {
                    round2(rng.gen_range(AIR_CHANGES_LOW..AIR_CHANGES_HIGH))
                };
                let runtime = round2(rng.gen_range(RUNTIME_MIN_HOURS..RUNTIME_MAX_HOURS));
                let cost = round2(runtime * air_changes * rng.gen_range(0.5..1.5));
                let temperature = round2(rng.gen_range(60.0..80.0));
                rooms.push(RoomRecord {
                    building: building.clone(),
                    air_handler: ahu.clone(),
                    operating_room: room.clone(),
                    air_changes,
                    runtime,
                    cost,
                    temperature,
                });
            }
        }
    }

    Dataset {
        air_handlers,
        rooms,
    }
}

/// Samples the plasma colormap at `t` (clamped to `[0, 1]`) as `#rrggbb`.
pub fn plasma_hex(t: f64) -> String {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (PLASMA.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(PLASMA.len() - 2);
    let frac = scaled - lower as f64;
    let channel = |i: usize| {
        let a = f64::from(PLASMA[lower][i]);
        let b = f64::from(PLASMA[lower + 1][i]);
        (a + (b - a) * frac).round() as u8
    };
    format!("#{:02x}{:02x}{:02x}", channel(0), channel(1), channel(2))
}

fn air_changes_color(value: f64) -> &'static str {
    if value < AIR_CHANGES_LOW {
        "lightcoral"
    } else if value > AIR_CHANGES_HIGH {
        "firebrick"
    } else {
        "gray"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SankeyLink {
    pub source: usize,
    pub target: usize,
    pub values: HashMap<Metric, f64>,
    pub colors: HashMap<Metric, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SankeyDiagram {
    pub labels: Vec<String>,
    pub links: Vec<SankeyLink>,
}

fn uniform_colors(color: &str) -> HashMap<Metric, String> {
    Metric::ALL
        .iter()
        .map(|metric| (*metric, color.to_string()))
        .collect()
}

/// Orders nodes building-first and builds Building→AHU aggregate links followed by
/// AHU→OR links.
pub fn build_diagram(dataset: &Dataset) -> SankeyDiagram {
    let mut labels: Vec<String> = Vec::new();
    for (building, ahus) in &dataset.air_handlers {
        labels.push(building.clone());
        for ahu in ahus {
            labels.push(ahu.clone());
            labels.extend(
                dataset
                    .rooms
                    .iter()
                    .filter(|room| &room.air_handler == ahu)
                    .map(|room| room.operating_room.clone()),
            );
        }
    }
    let node_index: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.as_str(), i))
        .collect();

    let mut links = Vec::new();
    let mut ahu_pairs: Vec<(&str, &str)> = dataset
        .air_handlers
        .iter()
        .flat_map(|(building, ahus)| {
            ahus.iter()
                .map(move |ahu| (building.as_str(), ahu.as_str()))
        })
        .collect();
    // Aggregate links are ordered by (building, air handler) name.
    ahu_pairs.sort_unstable();
    for (building, ahu) in ahu_pairs {
        let rooms: Vec<&RoomRecord> = dataset
            .rooms
            .iter()
            .filter(|room| room.building == building && room.air_handler == ahu)
            .collect();
        if rooms.is_empty() {
            continue;
        }
        let sum = |metric: Metric| rooms.iter().map(|room| room.metric(metric)).sum::<f64>();
        let mut values = HashMap::new();
        values.insert(Metric::AirChanges, sum(Metric::AirChanges));
        values.insert(Metric::Runtime, sum(Metric::Runtime));
        values.insert(Metric::Cost, sum(Metric::Cost));
        values.insert(
            Metric::Temperature,
            sum(Metric::Temperature) / rooms.len() as f64,
        );
        links.push(SankeyLink {
            source: node_index[building],
            target: node_index[ahu],
            values,
            colors: uniform_colors("gray"),
        });
    }

    let (cost_min, cost_max) = dataset
        .rooms
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), room| {
            (lo.min(room.cost), hi.max(room.cost))
        });
    let cost_span = cost_max - cost_min;

    for room in &dataset.rooms {
        let values = Metric::ALL
            .iter()
            .map(|metric| (*metric, room.metric(*metric)))
            .collect();
        let runtime_norm =
            (room.runtime - RUNTIME_MIN_HOURS) / (RUNTIME_MAX_HOURS - RUNTIME_MIN_HOURS);
        let cost_norm = if cost_span > 0.0 {
            (room.cost - cost_min) / cost_span
        } else {
            0.0
        };
        let mut colors = uniform_colors("gray");
        colors.insert(
            Metric::AirChanges,
            air_changes_color(room.air_changes).to_string(),
        );
        colors.insert(Metric::Runtime, plasma_hex(runtime_norm));
        colors.insert(Metric::Cost, plasma_hex(cost_norm));
        links.push(SankeyLink {
            source: node_index[room.air_handler.as_str()],
            target: node_index[room.operating_room.as_str()],
            values,
            colors,
        });
    }

    SankeyDiagram { labels, links }
}

/// Plotly figure: one Sankey trace per metric with a dropdown toggling visibility.
pub fn plotly_figure(diagram: &SankeyDiagram) -> JsonValue {
    let sources: Vec<usize> = diagram.links.iter().map(|link| link.source).collect();
    let targets: Vec<usize> = diagram.links.iter().map(|link| link.target).collect();

    let traces: Vec<JsonValue> = Metric::ALL
        .iter()
        .map(|metric| {
            let values: Vec<f64> = diagram
                .links
                .iter()
                .map(|link| link.values.get(metric).copied().unwrap_or_default())
                .collect();
            let colors: Vec<&str> = diagram
                .links
                .iter()
                .map(|link| link.colors.get(metric).map(String::as_str).unwrap_or("gray"))
                .collect();
            json!({
                "type": "sankey",
                "name": metric.name(),
                "visible": *metric == Metric::AirChanges,
                "node": {
                    "pad": 15,
                    "thickness": 20,
                    "line": {"color": "black", "width": 0.5},
                    "label": diagram.labels,
                },
                "link": {
                    "source": sources,
                    "target": targets,
                    "value": values,
                    "color": colors,
                },
            })
        })
        .collect();

    let buttons: Vec<JsonValue> = Metric::ALL
        .iter()
        .map(|metric| {
            let visible: Vec<bool> = Metric::ALL.iter().map(|m| m == metric).collect();
            json!({
                "label": metric.name(),
                "method": "update",
                "args": [{"visible": visible}],
            })
        })
        .collect();

    json!({
        "data": traces,
        "layout": {
            "title": {"text": FIGURE_TITLE},
            "font": {"size": 10},
            "updatemenus": [{
                "buttons": buttons,
                "direction": "down",
                "showactive": true,
                "x": 0.5,
                "xanchor": "center",
                "y": 1.15,
                "yanchor": "top",
            }],
        },
    })
}

/// Standalone HTML page that loads Plotly from its CDN and draws `figure`.
pub fn render_html(figure: &JsonValue) -> String {
    // Keep the inline JSON from closing the surrounding <script> element.
    let payload = figure.to_string().replace("</", "<\\/");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{FIGURE_TITLE}</title>
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="sankey" style="width:100%;height:100vh;"></div>
<script>
const figure = {payload};
Plotly.newPlot("sankey", figure.data, figure.layout);
</script>
</body>
</html>
"#
    )
}
