//! Draws a RenderPlan as a standalone SVG clock face.
//!
//! Wheel = 90% of the square canvas, zone labels just outside it, names
//! along each slice's middle ray, error lines stacked top-left.

use crate::layout::RenderPlan;

pub const FONT_SIZE: f64 = 24.0;

const EVEN_FILL: &str = "rgb(150,150,0)";
const ODD_FILL: &str = "rgb(128,128,0)";
const LABEL_FILL: &str = "rgb(255,0,0)";
const NAME_FILL: &str = "rgb(0,255,0)";
const ERROR_FILL: &str = "rgb(255,0,0)";

pub fn render_svg(plan: &RenderPlan, size: f64) -> String {
    let center = size / 2.0;
    let wheel_radius = size * 0.9 / 2.0;
    let label_radius = wheel_radius + FONT_SIZE;
    let at = |angle: f64, radius: f64| (center + radius * angle.cos(), center + radius * angle.sin());

    let mut out = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}" font-family="Noto Sans, sans-serif" font-size="{FONT_SIZE}">"#
    );
    out.push_str(r#"<rect width="100%" height="100%" fill="black"/>"#);

    for (i, view) in plan.slices.iter().enumerate() {
        let fill = if i % 2 == 0 { EVEN_FILL } else { ODD_FILL };
        let points: Vec<String> = view
            .slice
            .outline()
            .into_iter()
            .map(|(x, y)| format!("{:.2},{:.2}", center + x * wheel_radius, center + y * wheel_radius))
            .collect();
        out.push_str(&format!(
            r#"<polygon points="{}" fill="{fill}" stroke="black" stroke-width="2"/>"#,
            points.join(" ")
        ));

        let (x, y) = at(view.middle_angle, label_radius);
        out.push_str(&text(view.category.as_str(), x, y, view.label_rotation_degrees, LABEL_FILL));
    }

    for marker in &plan.markers {
        let (x, y) = at(marker.angle, wheel_radius * marker.radius);
        out.push_str(&text(&marker.subject.name, x, y, marker.rotation_degrees, NAME_FILL));
    }

    for (i, line) in plan.errors.iter().enumerate() {
        out.push_str(&format!(
            r#"<text x="0" y="{:.2}" fill="{ERROR_FILL}">{}</text>"#,
            FONT_SIZE * (i + 1) as f64,
            escape(line)
        ));
    }

    out.push_str("</svg>");
    out
}

fn text(content: &str, x: f64, y: f64, rotation: f64, fill: &str) -> String {
    format!(
        r#"<text x="{x:.2}" y="{y:.2}" fill="{fill}" text-anchor="middle" dominant-baseline="middle" transform="rotate({rotation:.2} {x:.2} {y:.2})">{}</text>"#,
        escape(content)
    )
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{plan, RadiusBand};
    use crate::source::mock::{demo_sources, MockConnector};
    use std::sync::Arc;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"Tom & "Jerry" <3"#), "Tom &amp; &quot;Jerry&quot; &lt;3");
    }

    #[tokio::test]
    async fn test_demo_clock_contains_every_zone_and_person() {
        let snapshot = crate::aggregator::Aggregator::new(Arc::new(MockConnector::demo()))
            .aggregate(&demo_sources())
            .await;
        let svg = render_svg(&plan(&snapshot, RadiusBand::default()), 800.0);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        // 5 listed zones + "Nonexistent location"
        assert_eq!(svg.matches("<polygon").count(), 6);
        for name in ["Keith", "Jennifer", "Bill", "Jensen", "Janet", "Mars", "Moon"] {
            assert!(svg.contains(&format!(">{name}</text>")), "missing {name}");
        }
        assert!(svg.contains(">Eli: HA error</text>"));
    }
}
