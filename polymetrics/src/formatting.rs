//! Renders collected metric families in the text exposition format.

use crate::common::{MetricFamilySamples, Sample};

/// Renders `families` in input order as exposition text.
///
/// Pure function of its input: no I/O, no interior state, byte-identical
/// output for identical input. Every emitted line ends with a newline and
/// nothing follows the final one.
pub fn render(families: &[MetricFamilySamples]) -> String {
    let mut output = String::new();

    for family in families {
        write_help_line(&mut output, &family.name, &family.help);
        write_type_line(&mut output, &family.name, family.kind.as_str());
        for sample in &family.samples {
            write_sample_line(&mut output, &family.label_names, sample);
        }
    }

    output
}

fn write_help_line(buffer: &mut String, name: &str, help: &str) {
    buffer.push_str("# HELP ");
    buffer.push_str(name);
    buffer.push(' ');
    buffer.push_str(&escape_help(help));
    buffer.push('\n');
}

fn write_type_line(buffer: &mut String, name: &str, kind: &str) {
    buffer.push_str("# TYPE ");
    buffer.push_str(name);
    buffer.push(' ');
    buffer.push_str(kind);
    buffer.push('\n');
}

fn write_sample_line(buffer: &mut String, family_labels: &[String], sample: &Sample) {
    buffer.push_str(&sample.name);

    let names = family_labels.iter().chain(sample.label_names.iter());
    let mut pairs = names.zip(sample.label_values.iter()).peekable();
    if pairs.peek().is_some() {
        buffer.push('{');

        let mut first = true;
        for (name, value) in pairs {
            if first {
                first = false;
            } else {
                buffer.push(',');
            }
            buffer.push_str(name);
            buffer.push_str("=\"");
            buffer.push_str(&escape_label_value(value));
            buffer.push('"');
        }

        buffer.push('}');
    }

    buffer.push(' ');
    buffer.push_str(&fmt_value(sample.value));
    buffer.push('\n');
}

/// Renders a sample value in its canonical text form.
///
/// Integral values carry no fractional part, everything else uses the
/// shortest representation that round-trips.
pub(crate) fn fmt_value(value: f64) -> String {
    if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Escapes a label value for interpolation between double quotes.
///
/// Backslash is replaced before newline and quote so already-produced
/// escape sequences never get escaped a second time.
fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}

// Help lines are unquoted, so only backslash and newline need escaping.
fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}
