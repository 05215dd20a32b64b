// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTML templates for the web UI

use minijinja::{Environment, Value};
use serde::Serialize;

use crate::Result;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("macros.html", include_str!("../../templates/macros.html")),
    ("home.html", include_str!("../../templates/home.html")),
    ("about.html", include_str!("../../templates/about.html")),
    ("contact.html", include_str!("../../templates/contact.html")),
    ("data.html", include_str!("../../templates/data.html")),
    ("species.html", include_str!("../../templates/species.html")),
    ("host_plants.html", include_str!("../../templates/host_plants.html")),
    ("classify.html", include_str!("../../templates/classify.html")),
    ("tasks.html", include_str!("../../templates/tasks.html")),
    ("care.html", include_str!("../../templates/care.html")),
    ("schedule.html", include_str!("../../templates/schedule.html")),
    ("sales.html", include_str!("../../templates/sales.html")),
    ("pos.html", include_str!("../../templates/pos.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("signup.html", include_str!("../../templates/signup.html")),
];

/// Compiled page templates (HTML autoescaping on)
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(*name, *source)?;
        }
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }
}

/// A message shown above page content
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: &'static str,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: "success", text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self { level: "info", text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { level: "warning", text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: "error", text: text.into() }
    }
}

/// One bar of a distribution chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: String,
    pub width: u32,
}

const BAR_WIDTH: f64 = 300.0;

/// Correct and incorrect detections of one species
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedBar {
    pub label: String,
    pub correct: Bar,
    pub incorrect: Bar,
}

fn scaled(value: f64, top: f64) -> u32 {
    if top > 0.0 {
        (value / top * BAR_WIDTH).round() as u32
    } else {
        0
    }
}

fn bars(items: Vec<(String, f64, String)>) -> Vec<Bar> {
    let top = items.iter().map(|(_, v, _)| *v).fold(0.0, f64::max);
    items
        .into_iter()
        .map(|(label, v, value)| Bar { label, value, width: scaled(v, top) })
        .collect()
}

pub fn count_bars(counts: &[(String, usize)]) -> Vec<Bar> {
    bars(counts.iter().map(|(l, n)| (l.clone(), *n as f64, n.to_string())).collect())
}

pub fn score_bars(scores: &[(String, f64)]) -> Vec<Bar> {
    bars(scores.iter().map(|(l, v)| (l.clone(), *v, format!("{:.2}", v))).collect())
}

/// Pairs of bars sharing one scale across every species
pub fn paired_bars(pairs: &[(String, u64, u64)]) -> Vec<PairedBar> {
    let top = pairs.iter().map(|(_, c, i)| (*c).max(*i) as f64).fold(0.0, f64::max);
    let bar = |label: &str, n: u64| Bar {
        label: label.to_string(),
        value: n.to_string(),
        width: scaled(n as f64, top),
    };
    pairs
        .iter()
        .map(|(species, correct, incorrect)| PairedBar {
            label: species.clone(),
            correct: bar("Correct Detected", *correct),
            incorrect: bar("Incorrect Detected", *incorrect),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_all_templates_compile() {
        let templates = Templates::new().unwrap();
        let ctx = context! { title => "Sign Up", user => None::<String>, notice => None::<Notice> };
        let html = templates.render("signup.html", ctx).unwrap();
        assert!(html.contains("<title>Sign Up - Lepidoptera</title>"));
    }

    #[test]
    fn test_output_is_escaped() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render("signup.html", context! { title => "x", notice => Notice::error("<script>") })
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_bar_widths_scale_to_largest() {
        let bars = count_bars(&[("a".to_string(), 4), ("b".to_string(), 1)]);
        assert_eq!(bars[0].width, 300);
        assert_eq!(bars[1].width, 75);
        assert_eq!(bars[1].value, "1");

        let scores = score_bars(&[("x".to_string(), 0.0)]);
        assert_eq!(scores[0].width, 0);
        assert_eq!(scores[0].value, "0.00");
    }

    #[test]
    fn test_paired_bars_share_one_scale() {
        let pairs = paired_bars(&[("Clipper".to_string(), 40, 10), ("Jay".to_string(), 20, 0)]);
        assert_eq!(pairs[0].correct.width, 300);
        assert_eq!(pairs[0].incorrect.width, 75);
        assert_eq!(pairs[1].correct.width, 150);
        assert_eq!(pairs[1].incorrect.width, 0);
        assert_eq!(pairs[1].incorrect.value, "0");
    }
}
