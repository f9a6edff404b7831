//! Renders the dashboard HTML.
//!
//! The chart is a Vega-Lite spec: a prefix scatterplot on top, with a course
//! scatterplot and a letter-grade bar chart beneath it. Chart data is loaded
//! by the browser from the public table URLs; no rows are embedded.

use anyhow::Result;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

use crate::aggregators::grade::LetterGrade;
use crate::aggregators::types::{ALL_SEMESTERS, PrefixScatterRow};
use crate::config::{BAR_FILE, COURSE_SCATTER_FILE, PREFIX_SCATTER_FILE, Settings};
use crate::error::PipelineError;
use crate::loader::Semester;
use crate::output::{read_table, write_atomic};

pub const DASHBOARD_TITLE: &str = "Historical Course Grades";
const FONT: &str = "Trebuchet MS";

/// Bar colors from green (A) to red (F).
static GRADE_COLORS: &[(LetterGrade, &str)] = &[
    (LetterGrade::A, "#4caf50"),
    (LetterGrade::AMinus, "#8bc34a"),
    (LetterGrade::BPlus, "#cddc39"),
    (LetterGrade::B, "#ffeb3b"),
    (LetterGrade::BMinus, "#ffc107"),
    (LetterGrade::CPlus, "#ffa000"),
    (LetterGrade::C, "#f57c00"),
    (LetterGrade::CMinus, "#ff5722"),
    (LetterGrade::DPlus, "#ff5252"),
    (LetterGrade::D, "#e64a19"),
    (LetterGrade::DMinus, "#f44336"),
    (LetterGrade::F, "#d32f2f"),
    (LetterGrade::Other, "#9e9e9e"),
];

/// Remote URLs of the three summary tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSources {
    pub prefix_scatter: String,
    pub course_scatter: String,
    pub bar: String,
}

impl DataSources {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            prefix_scatter: settings.public_url(PREFIX_SCATTER_FILE),
            course_scatter: settings.public_url(COURSE_SCATTER_FILE),
            bar: settings.public_url(BAR_FILE),
        }
    }
}

/// Dropdown contents derived from the prefix table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controls {
    /// `All` followed by semesters, newest first.
    pub semesters: Vec<String>,
    /// Sorted, deduplicated.
    pub prefixes: Vec<String>,
}

impl Controls {
    pub fn from_rows(rows: &[PrefixScatterRow]) -> Self {
        let mut semesters: Vec<Semester> = rows
            .iter()
            .filter_map(|r| Semester::parse(&r.semester))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        semesters.reverse();

        let prefixes = rows
            .iter()
            .map(|r| r.prefix.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            semesters: std::iter::once(ALL_SEMESTERS.to_string())
                .chain(semesters.iter().map(Semester::label))
                .collect(),
            prefixes,
        }
    }
}

fn csv_data(url: &str) -> Value {
    json!({ "url": url, "format": { "type": "csv" } })
}

fn title(text: &str, subtitle: &str, size: u32) -> Value {
    json!({
        "text": [text],
        "font": FONT,
        "fontSize": size,
        "subtitle": [subtitle],
        "subtitleFont": FONT,
        "subtitleFontSize": 15
    })
}

fn semester_filter() -> Value {
    json!({ "filter": "datum.semester == semester" })
}

/// Keeps rows of the clicked prefix or the one picked in the search dropdown.
fn prefix_filter() -> Value {
    json!({
        "filter": {
            "or": [
                { "param": "prefix_pick", "empty": false },
                { "field": "Course Prefix", "equal": { "expr": "prefix_search" } }
            ]
        }
    })
}

fn prefix_highlight() -> Value {
    json!({
        "or": [
            { "param": "prefix_pick", "empty": false },
            { "field": "Course Prefix", "equal": { "expr": "prefix_search" } }
        ]
    })
}

fn prefix_scatter(sources: &DataSources) -> Value {
    let x = json!({ "field": "College", "type": "nominal", "title": "College" });
    let y = json!({ "field": "Average Grade", "type": "quantitative", "title": "Average Grade" });
    let size = json!({
        "field": "Total Students",
        "type": "quantitative",
        "scale": { "range": [10, 1000] }
    });

    json!({
        "title": title("1. Choose a Course Prefix", "Average Grade By Course Prefix", 24),
        "width": 600,
        "data": csv_data(&sources.prefix_scatter),
        "transform": [semester_filter()],
        "layer": [
            {
                "params": [{
                    "name": "prefix_pick",
                    "select": { "type": "point", "fields": ["Course Prefix"] }
                }],
                "mark": "circle",
                "encoding": {
                    "x": x,
                    "y": y,
                    "size": size,
                    "color": {
                        "field": "College",
                        "type": "nominal",
                        "scale": { "scheme": "dark2" }
                    },
                    "opacity": {
                        "condition": { "test": prefix_highlight(), "value": 0.8 },
                        "value": 0.2
                    },
                    "tooltip": [
                        { "field": "Course Prefix", "type": "nominal" },
                        { "field": "Department", "type": "nominal" },
                        { "field": "Total Students", "type": "quantitative" },
                        { "field": "Average Grade", "type": "quantitative" }
                    ]
                }
            },
            {
                "mark": { "type": "point", "color": "black" },
                "encoding": {
                    "x": x,
                    "y": y,
                    "size": size,
                    "opacity": {
                        "condition": { "test": prefix_highlight(), "value": 1 },
                        "value": 0
                    }
                }
            }
        ]
    })
}

fn course_scatter(sources: &DataSources) -> Value {
    let x = json!({
        "field": "Total Students",
        "type": "quantitative",
        "title": "Number of Students",
        "scale": { "type": "log" }
    });
    let y = json!({
        "field": "Average Grade",
        "type": "quantitative",
        "title": "Average Grade",
        "scale": { "domain": [0, 4] }
    });

    json!({
        "title": title(
            "2. Choose a Specific Course Within That Prefix",
            "Grade vs. Number of Students",
            20
        ),
        "data": csv_data(&sources.course_scatter),
        "transform": [prefix_filter(), semester_filter()],
        "layer": [
            {
                "params": [{
                    "name": "course_pick",
                    "select": { "type": "point", "fields": ["Course Name"] }
                }],
                "mark": { "type": "circle", "size": 70 },
                "encoding": {
                    "x": x,
                    "y": y,
                    "color": {
                        "field": "Division",
                        "type": "nominal",
                        "scale": {
                            "domain": ["Lower", "Upper", "Graduate"],
                            "scheme": "tableau10"
                        }
                    },
                    "opacity": {
                        "condition": { "param": "course_pick", "empty": false, "value": 0.8 },
                        "value": 0.2
                    },
                    "tooltip": [
                        { "field": "Course Name", "type": "nominal" },
                        { "field": "Total Students", "type": "quantitative" },
                        { "field": "Average Grade", "type": "quantitative" }
                    ]
                }
            },
            {
                "mark": { "type": "point", "color": "black", "size": 70 },
                "encoding": {
                    "x": x,
                    "y": y,
                    "opacity": {
                        "condition": { "param": "course_pick", "empty": false, "value": 1 },
                        "value": 0
                    }
                }
            }
        ]
    })
}

/// Filters shared by every layer of the histogram: prefix, picked course,
/// semester.
fn course_filters() -> Vec<Value> {
    vec![
        prefix_filter(),
        json!({ "filter": { "param": "course_pick", "empty": false } }),
        semester_filter(),
    ]
}

fn grade_bar_chart(sources: &DataSources) -> Value {
    let order: Vec<&str> = GRADE_COLORS.iter().map(|(g, _)| g.symbol()).collect();
    let colors: Vec<&str> = GRADE_COLORS.iter().map(|(_, c)| *c).collect();
    let mut name_transform = course_filters();
    name_transform.push(json!({ "aggregate": [], "groupby": ["Course Name"] }));

    json!({
        "title": title("3. View Grade Distribution", "Letter Grade Histogram", 20),
        "layer": [
            {
                "data": csv_data(&sources.bar),
                "transform": course_filters(),
                "mark": "bar",
                "encoding": {
                    "x": {
                        "field": "Letter Grade",
                        "type": "ordinal",
                        "title": "Grade Received",
                        "sort": order
                    },
                    "y": {
                        "field": "Total Students",
                        "type": "quantitative",
                        "title": "Number of Students"
                    },
                    "color": {
                        "field": "Letter Grade",
                        "type": "ordinal",
                        "scale": { "domain": order, "range": colors },
                        "legend": null
                    },
                    "tooltip": [
                        { "field": "Total Students", "type": "quantitative" },
                        { "field": "Letter Grade", "type": "ordinal" },
                        { "field": "Grade Points", "type": "quantitative" }
                    ]
                }
            },
            {
                "data": csv_data(&sources.bar),
                "transform": name_transform,
                "mark": { "type": "text", "dy": -135, "size": 18, "font": FONT },
                "encoding": { "text": { "field": "Course Name", "type": "nominal" } }
            },
            {
                "data": csv_data(&sources.course_scatter),
                "transform": course_filters(),
                "mark": { "type": "text", "dy": -118, "size": 13, "font": FONT },
                "encoding": { "text": { "field": "Average Grade", "type": "quantitative" } }
            }
        ]
    })
}

/// Builds the composed Vega-Lite spec.
pub fn build_spec(sources: &DataSources, controls: &Controls) -> Value {
    let prefix_options: Vec<Value> = std::iter::once(Value::Null)
        .chain(controls.prefixes.iter().map(|p| json!(p)))
        .collect();
    let prefix_labels: Vec<&str> = std::iter::once("none")
        .chain(controls.prefixes.iter().map(String::as_str))
        .collect();

    json!({
        "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
        "title": {
            "text": [DASHBOARD_TITLE],
            "font": FONT,
            "fontSize": 36,
            "subtitle": ["An exploratory dashboard for course grade distributions", " "],
            "subtitleFont": FONT,
            "subtitleFontSize": 18
        },
        "params": [
            {
                "name": "semester",
                "value": ALL_SEMESTERS,
                "bind": {
                    "input": "select",
                    "options": controls.semesters,
                    "name": "Filter by Semester: "
                }
            },
            {
                "name": "prefix_search",
                "value": null,
                "bind": {
                    "input": "select",
                    "options": prefix_options,
                    "labels": prefix_labels,
                    "name": "Search for a course prefix: "
                }
            }
        ],
        "vconcat": [
            prefix_scatter(sources),
            {
                "hconcat": [course_scatter(sources), grade_bar_chart(sources)],
                "resolve": { "scale": { "color": "independent" } }
            }
        ],
        "resolve": { "scale": { "color": "independent", "size": "independent" } }
    })
}

/// Wraps a spec in a standalone HTML page that loads vega-embed from a CDN.
pub fn render_html(spec: &Value) -> Result<String> {
    let spec = serde_json::to_string_pretty(spec)?;
    Ok(format!(
        r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
  <script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
  <script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
</head>
<body>
  <div id="vis"></div>
  <script type="text/javascript">
    const spec = {spec};
    vegaEmbed("#vis", spec, {{ "mode": "vega-lite" }}).catch(console.error);
  </script>
</body>
</html>
"##,
        title = DASHBOARD_TITLE,
        spec = spec
    ))
}

/// Reads the processed tables and writes the dashboard HTML.
///
/// # Errors
///
/// Any missing processed table, or an empty prefix table, is a configuration
/// error; an empty chart is never written.
#[tracing::instrument(skip_all, fields(output_dir = %settings.output_dir.display()))]
pub fn create_dashboard(settings: &Settings) -> Result<PathBuf> {
    for file in [PREFIX_SCATTER_FILE, COURSE_SCATTER_FILE, BAR_FILE] {
        let path = settings.processed_path(file);
        if !path.is_file() {
            return Err(PipelineError::MissingTable(path).into());
        }
    }

    let rows: Vec<PrefixScatterRow> = read_table(&settings.processed_path(PREFIX_SCATTER_FILE))?;
    if rows.is_empty() {
        return Err(PipelineError::Config(format!(
            "{} has no rows; nothing to chart",
            settings.processed_path(PREFIX_SCATTER_FILE).display()
        ))
        .into());
    }

    let controls = Controls::from_rows(&rows);
    info!(
        semesters = controls.semesters.len() - 1,
        prefixes = controls.prefixes.len(),
        "Building dashboard"
    );

    let spec = build_spec(&DataSources::from_settings(settings), &controls);
    let html = render_html(&spec)?;

    let path = settings.dashboard_path();
    write_atomic(&path, html.as_bytes())?;
    info!(path = %path.display(), bytes = html.len(), "Dashboard saved");

    Ok(path)
}
