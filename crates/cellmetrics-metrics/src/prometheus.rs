//! Prometheus text exposition format.
//!
//! Renders the latest emissions into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::collections::HashMap;
use std::fmt::Write;

use crate::sink::Emission;

const PREFIX: &str = "cellmetrics_";

/// Render emissions as Prometheus gauges.
///
/// A flat name becomes `cellmetrics_<name>{unit="..."}`. A dotted name
/// such as `Domain.cf-apps` becomes the family `cellmetrics_Domain` with
/// the remainder in a `key` label, so distinct members never collapse onto
/// one sanitized name. Samples are grouped under a single `TYPE` line per
/// family; `-1` values are passed through untouched.
pub fn render_prometheus(emissions: &[Emission]) -> String {
    let mut families: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for e in emissions {
        let (family, key) = match e.name.split_once('.') {
            Some((family, key)) => (metric_name(family), Some(key)),
            None => (metric_name(&e.name), None),
        };
        let unit = escape_label(e.unit.as_str());
        let sample = match key {
            Some(key) => format!(
                "{family}{{key=\"{}\",unit=\"{unit}\"}} {}",
                escape_label(key),
                e.value
            ),
            None => format!("{family}{{unit=\"{unit}\"}} {}", e.value),
        };

        let slot = *index.entry(family.clone()).or_insert_with(|| {
            families.push((family, Vec::new()));
            families.len() - 1
        });
        families[slot].1.push(sample);
    }

    let mut out = String::new();
    for (family, samples) in families {
        let _ = writeln!(out, "# TYPE {family} gauge");
        for sample in samples {
            let _ = writeln!(out, "{sample}");
        }
    }
    out
}

fn metric_name(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{PREFIX}{sanitized}")
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Unit;

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus(&[]), "");
    }

    #[test]
    fn render_gauges_with_units() {
        let output = render_prometheus(&[
            Emission::new("LRPsDesired", 5.0, Unit::Metric),
            Emission::new("StoreSentBandwidthRate", 2048.5, Unit::BytesPerSecond),
            Emission::new("MetricsReportingDuration", 1_500_000.0, Unit::Duration),
        ]);

        assert!(output.contains("# TYPE cellmetrics_LRPsDesired gauge\n"));
        assert!(output.contains("cellmetrics_LRPsDesired{unit=\"Metric\"} 5\n"));
        assert!(output.contains("cellmetrics_StoreSentBandwidthRate{unit=\"B/s\"} 2048.5\n"));
        assert!(output.contains("cellmetrics_MetricsReportingDuration{unit=\"nanos\"} 1500000\n"));
    }

    #[test]
    fn render_preserves_unknown_sentinel() {
        let output = render_prometheus(&[Emission::new("TasksPending", -1.0, Unit::Metric)]);
        assert!(output.contains("cellmetrics_TasksPending{unit=\"Metric\"} -1\n"));
    }

    #[test]
    fn render_dotted_names_as_labelled_family() {
        let output = render_prometheus(&[
            Emission::new("Domain.cf-apps", 1.0, Unit::Metric),
            Emission::new("ServiceRegistrations.Executor", 2.0, Unit::Metric),
        ]);

        assert!(output.contains("# TYPE cellmetrics_Domain gauge\n"));
        assert!(output.contains("cellmetrics_Domain{key=\"cf-apps\",unit=\"Metric\"} 1\n"));
        assert!(output.contains(
            "cellmetrics_ServiceRegistrations{key=\"Executor\",unit=\"Metric\"} 2\n"
        ));
    }

    #[test]
    fn similar_domain_names_stay_distinct() {
        let output = render_prometheus(&[
            Emission::new("Domain.cf-apps", 1.0, Unit::Metric),
            Emission::new("TasksRunning", 0.0, Unit::Metric),
            Emission::new("Domain.cf_apps", 1.0, Unit::Metric),
        ]);

        let samples: Vec<_> = output.lines().filter(|l| !l.starts_with('#')).collect();
        let unique: std::collections::HashSet<_> =
            samples.iter().map(|l| l.rsplit_once(' ').unwrap().0).collect();
        assert_eq!(unique.len(), samples.len(), "duplicate series:\n{output}");

        assert_eq!(
            output,
            "# TYPE cellmetrics_Domain gauge\n\
             cellmetrics_Domain{key=\"cf-apps\",unit=\"Metric\"} 1\n\
             cellmetrics_Domain{key=\"cf_apps\",unit=\"Metric\"} 1\n\
             # TYPE cellmetrics_TasksRunning gauge\n\
             cellmetrics_TasksRunning{unit=\"Metric\"} 0\n"
        );
    }

    #[test]
    fn render_one_type_line_per_family() {
        let output = render_prometheus(&[
            Emission::new("Domain.a", 1.0, Unit::Metric),
            Emission::new("Domain.b", 1.0, Unit::Metric),
            Emission::new("TasksRunning", 0.0, Unit::Metric),
        ]);

        let type_lines: Vec<_> = output.lines().filter(|l| l.starts_with("# TYPE")).collect();
        assert_eq!(type_lines.len(), 2);

        for line in output.lines().filter(|l| !l.starts_with('#')) {
            assert!(line.starts_with(PREFIX), "unprefixed sample: {line}");
            assert!(line.contains("unit=\""), "line should have labels: {line}");
        }
    }

    #[test]
    fn label_values_are_escaped() {
        let output = render_prometheus(&[Emission::new("Domain.a\"b", 1.0, Unit::Metric)]);
        assert!(output.contains("cellmetrics_Domain{key=\"a\\\"b\",unit=\"Metric\"} 1\n"));
    }
}
